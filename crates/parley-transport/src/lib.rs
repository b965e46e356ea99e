//! Publish/subscribe transport layer for Parley.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! a broker client, plus two implementations:
//!
//! - [`MemoryBroker`]: an in-process broker actor (retained messages,
//!   wildcard subscriptions, last will)
//! - `WebSocketBroker` / `WebSocketTransport`: the same broker served
//!   over WebSocket, and the matching client
//!
//! Every request method is non-blocking. Completion, failure and incoming
//! messages arrive later as [`TransportEvent`]s on the [`EventSender`]
//! handed to [`Transport::connect`].
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket bridge via `tokio-tungstenite`

mod error;
mod memory;
mod topic;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{BrokerConfig, BrokerSnapshot, MemoryBroker, MemoryConnection};
pub use topic::{topic_matches, validate_filter, validate_topic};
#[cfg(feature = "websocket")]
pub use websocket::{BrokerRequest, WebSocketBroker, WebSocketConnection, WebSocketTransport};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Broker return codes and socket codes reported with connection faults.
pub mod return_code {
    /// Connection accepted.
    pub const ACCEPTED: i32 = 0;
    /// Unacceptable protocol version.
    pub const UNACCEPTABLE_PROTOCOL: i32 = 1;
    /// Client identifier rejected.
    pub const IDENTIFIER_REJECTED: i32 = 2;
    /// Server unavailable.
    pub const SERVER_UNAVAILABLE: i32 = 3;
    /// Bad user name or password.
    pub const BAD_CREDENTIALS: i32 = 4;
    /// Not authorized.
    pub const NOT_AUTHORIZED: i32 = 5;
    /// The underlying socket failed.
    pub const SOCKET_ERROR: i32 = 7;
    /// The underlying socket closed.
    pub const SOCKET_CLOSED: i32 = 8;
}

/// Returns the human-readable description of a connection return code.
pub fn describe_return_code(code: i32) -> String {
    let text = match code {
        return_code::ACCEPTED => "Connection accepted",
        return_code::UNACCEPTABLE_PROTOCOL => {
            "The Server does not support the level of the MQTT protocol requested by the Client"
        }
        return_code::IDENTIFIER_REJECTED => {
            "The Client identifier is correct UTF-8 but not allowed by the Server"
        }
        return_code::SERVER_UNAVAILABLE => {
            "The Network Connection has been made but the MQTT service is unavailable"
        }
        return_code::BAD_CREDENTIALS => "The data in the user name or password is malformed",
        return_code::NOT_AUTHORIZED => "The Client is not authorized to connect",
        return_code::SOCKET_ERROR => "Socket error",
        return_code::SOCKET_CLOSED => "Socket closed",
        other => return format!("Unknown error: {other}"),
    };
    text.to_string()
}

/// A message published to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publish {
    /// Destination topic. Must not contain wildcards.
    pub topic: String,
    /// Raw payload bytes. Empty is valid (a tombstone when retained).
    pub payload: Vec<u8>,
    /// Whether the broker keeps this as the topic's last known value.
    pub retained: bool,
}

impl Publish {
    /// Creates a non-retained message.
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            retained: false,
        }
    }

    /// Creates a retained message.
    pub fn retained(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            retained: true,
        }
    }
}

/// Parameters for opening a broker connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Broker host name.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Client identifier, unique per live connection.
    pub client_id: String,
    /// Login user name.
    pub username: String,
    /// Login password. May be empty.
    pub password: String,
    /// Message the broker publishes on our behalf if the connection is lost.
    pub will: Option<Publish>,
}

/// An event delivered by the transport to its single consumer.
///
/// `#[serde(tag = "type")]` keeps the JSON form flat, which is also the
/// frame format the WebSocket broker sends to its clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransportEvent {
    /// The connect request succeeded.
    Connected,

    /// The connect request failed. No resources remain held.
    ConnectFailed { code: i32, message: String },

    /// An established (or establishing) connection dropped.
    ConnectionLost { code: i32, message: String },

    /// A message arrived on a subscribed topic.
    MessageArrived {
        topic: String,
        payload: Vec<u8>,
        retained: bool,
    },

    /// A disconnect request completed.
    Disconnected,
}

/// Sending side of the transport event queue.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving side of the transport event queue.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates a new transport event queue.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Opens connections to a broker.
pub trait Transport: Send + 'static {
    /// The connection handle produced by this transport.
    type Connection: Connection;

    /// Requests a new connection.
    ///
    /// Returns immediately. The outcome arrives on `events` as
    /// [`TransportEvent::Connected`] or [`TransportEvent::ConnectFailed`],
    /// and every later event for this connection is delivered there too.
    fn connect(
        &self,
        options: ConnectOptions,
        events: EventSender,
    ) -> Result<Self::Connection, TransportError>;
}

/// A live (or pending) broker connection.
pub trait Connection: Send + 'static {
    /// Requests a subscription. Supports `+` and `#` wildcards.
    fn subscribe(&mut self, filter: &str) -> Result<(), TransportError>;

    /// Requests a publish.
    fn publish(&mut self, message: Publish) -> Result<(), TransportError>;

    /// Requests a graceful disconnect. The will is discarded.
    ///
    /// Completion arrives as [`TransportEvent::Disconnected`].
    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Returns the client identifier this connection was opened with.
    fn client_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_return_code_known_codes() {
        assert_eq!(describe_return_code(0), "Connection accepted");
        assert_eq!(
            describe_return_code(return_code::NOT_AUTHORIZED),
            "The Client is not authorized to connect"
        );
        assert_eq!(describe_return_code(return_code::SOCKET_CLOSED), "Socket closed");
    }

    #[test]
    fn test_describe_return_code_unknown_code_falls_back() {
        assert_eq!(describe_return_code(42), "Unknown error: 42");
        assert_eq!(describe_return_code(-1), "Unknown error: -1");
    }

    #[test]
    fn test_transport_event_json_is_internally_tagged() {
        let event = TransportEvent::ConnectFailed {
            code: 5,
            message: "nope".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ConnectFailed");
        assert_eq!(json["code"], 5);
    }

    #[test]
    fn test_publish_constructors_set_retained_flag() {
        assert!(!Publish::new("chat", vec![]).retained);
        assert!(Publish::retained("users/a_1", vec![]).retained);
    }
}
