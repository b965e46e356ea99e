//! # Parley
//!
//! Presence-aware group chat over publish/subscribe.
//!
//! Every participant connects to a shared broker with a unique client id,
//! keeps a retained presence announcement on its own topic while it is
//! around, and talks on a single chat topic. Parley turns that into a
//! stream of [`ViewEvent`](parley_session::ViewEvent)s: who is here, who
//! just joined, who left, what they said, and what went wrong.
//!
//! ## Crates
//!
//! | Crate | Role |
//! |-------|------|
//! | `parley-transport` | pub/sub contract, in-process broker, WebSocket bridge |
//! | `parley-protocol` | client ids, topics, wire payloads |
//! | `parley-session` | state machine, presence, chat relay |
//! | `parley` | this facade: the client event loop |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//!
//! # async fn run() -> Result<(), ParleyError> {
//! let (client, mut view) = ChatClient::new(WebSocketTransport);
//! client
//!     .connect(ConnectRequest::new("localhost", 8080, "alice"))
//!     .await?;
//!
//! while let Some(event) = view.recv().await {
//!     if let ViewEvent::ConnectionStateChanged(ConnectionState::Connected) = event {
//!         client.send("hello everyone").await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{ChatClient, ChatClientBuilder, DEFAULT_CHANNEL_SIZE};
pub use error::ParleyError;

pub use parley_protocol as protocol;
pub use parley_session as session;
pub use parley_transport as transport;

/// Everything needed to run a chat client.
pub mod prelude {
    pub use crate::{ChatClient, ChatClientBuilder, ParleyError};
    pub use parley_protocol::{ParticipantIdentity, TopicScheme};
    pub use parley_session::{
        ConnectRequest, ConnectionState, ManualClock, Participant, SessionFault, SystemClock,
        ViewEvent, ViewReceiver,
    };
    pub use parley_transport::{
        BrokerConfig, MemoryBroker, Transport, WebSocketBroker, WebSocketTransport,
    };
}
