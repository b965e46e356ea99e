//! Error types for the session layer.

use parley_protocol::ProtocolError;
use parley_transport::TransportError;

use crate::ConnectionState;

/// Errors returned by user intents (connect, disconnect, send).
///
/// These are answers to the caller. Faults the view should display
/// (connection failures and losses, malformed payloads) travel as
/// [`SessionFault`](crate::SessionFault) events instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The intent is not valid in the current lifecycle state.
    /// For example, sending a chat message while disconnected.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    /// A connect request had an empty host or user name, or port 0.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The transport refused a request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A payload could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
