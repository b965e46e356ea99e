//! Unified error type for Parley.

use parley_protocol::ProtocolError;
use parley_session::SessionError;
use parley_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `parley` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// A transport-level error (connect, publish, closed connection).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, malformed payload, bad identity).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session refused the request (wrong state, bad input).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The client's event loop has stopped.
    #[error("chat client has shut down")]
    Closed,
}

impl ParleyError {
    /// Returns `true` if the request was refused because the session was
    /// in the wrong state for it.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            ParleyError::Session(SessionError::InvalidState { .. })
        )
    }
}
