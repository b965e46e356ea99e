/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Binding the listener or completing a WebSocket handshake failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A topic name or topic filter is not well formed.
    #[error("invalid topic {topic:?}: {reason}")]
    InvalidTopic {
        topic: String,
        reason: &'static str,
    },

    /// A broker frame could not be encoded or decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),

    /// The broker was shut down.
    #[error("transport shut down")]
    Shutdown,
}
