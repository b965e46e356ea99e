//! What the session reports to the view layer.
//!
//! The view never touches the session directly. It drains a queue of
//! [`ViewEvent`]s and renders them: login form enabled or not, the
//! participant list, chat lines, and warnings.

use std::fmt;

use parley_protocol::ParticipantIdentity;
use parley_transport::describe_return_code;
use tokio::sync::mpsc;

/// Lifecycle state of a session.
///
/// ```text
/// Disconnected ──connect──→ Connecting ──success──→ Connected
///      ↑  ↑                    │                       │
///      │  └──failure / lost────┘←──────── lost ────────┤
///      │                                          disconnect
///      └────────── complete ──── Disconnecting ←───────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Returns `true` if the login form should accept input.
    pub fn login_enabled(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns `true` if chat messages can be sent.
    pub fn can_send(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// A fault reported to the view.
///
/// None of these is fatal to the process. The worst outcome is a return
/// to [`ConnectionState::Disconnected`]; retrying is up to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFault {
    /// The connect attempt failed.
    ConnectionFailed { code: i32, message: String },
    /// An established or establishing connection dropped.
    ConnectionLost { code: i32, message: String },
    /// A message was dropped because its payload was unreadable.
    /// The session stays connected.
    MalformedPayload { topic: String, reason: String },
}

impl SessionFault {
    /// Builds a `ConnectionFailed`, describing the code if `message` is empty.
    pub fn connection_failed(code: i32, message: String) -> Self {
        Self::ConnectionFailed {
            code,
            message: message_or_description(code, message),
        }
    }

    /// Builds a `ConnectionLost`, describing the code if `message` is empty.
    pub fn connection_lost(code: i32, message: String) -> Self {
        Self::ConnectionLost {
            code,
            message: message_or_description(code, message),
        }
    }

    /// Returns `true` if the session left the connection because of this.
    pub fn is_fatal_to_connection(&self) -> bool {
        !matches!(self, Self::MalformedPayload { .. })
    }
}

fn message_or_description(code: i32, message: String) -> String {
    if message.is_empty() {
        describe_return_code(code)
    } else {
        message
    }
}

impl fmt::Display for SessionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { message, .. } => {
                write!(f, "Connection failure: {message}")
            }
            Self::ConnectionLost { message, .. } => write!(f, "{message}"),
            Self::MalformedPayload { topic, reason } => {
                write!(f, "dropped malformed message on {topic}: {reason}")
            }
        }
    }
}

/// An event for the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// The lifecycle state changed.
    ConnectionStateChanged(ConnectionState),

    /// A participant is present. Add them to the list; self goes first.
    /// Emitted for every announcement, fresh or replayed.
    ParticipantListed {
        identity: ParticipantIdentity,
        is_self: bool,
    },

    /// A participant has just arrived ("alice has joined the chat").
    /// Only for announcements inside the freshness window.
    UserJoined {
        identity: ParticipantIdentity,
        is_self: bool,
    },

    /// A participant left. Remove them from the list.
    UserLeft {
        identity: ParticipantIdentity,
        is_self: bool,
    },

    /// The session went back to disconnected. Empty the list.
    ParticipantsCleared,

    /// A chat line arrived.
    ChatMessageReceived {
        identity: ParticipantIdentity,
        text: String,
        is_self: bool,
    },

    /// Something went wrong. See [`SessionFault`].
    ErrorOccurred(SessionFault),
}

/// Sending side of the view event queue.
pub type ViewSender = mpsc::UnboundedSender<ViewEvent>;

/// Receiving side of the view event queue.
pub type ViewReceiver = mpsc::UnboundedReceiver<ViewEvent>;

/// Creates a new view event queue.
pub fn view_channel() -> (ViewSender, ViewReceiver) {
    mpsc::unbounded_channel()
}
