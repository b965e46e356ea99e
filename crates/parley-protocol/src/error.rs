//! Error types for the protocol layer.
//!
//! Each crate in Parley defines its own error enum. A `ProtocolError`
//! always means a payload or identifier did not have the expected shape,
//! never that the network or the session misbehaved.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Malformed JSON, missing required fields, or wrong data types.
    /// This is the "malformed payload" condition: callers drop the
    /// message and carry on.
    #[cfg(feature = "json")]
    #[error("malformed payload: {0}")]
    Decode(serde_json::Error),

    /// A client id has no `_` separating the user name from its token.
    #[error("client id {0:?} has no user name separator")]
    InvalidIdentity(String),
}
