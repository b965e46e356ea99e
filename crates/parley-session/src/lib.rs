//! Session logic for Parley chat clients.
//!
//! This crate holds everything a client decides, independent of how bytes
//! move:
//!
//! 1. **Lifecycle**: the connect / disconnect state machine
//!    ([`SessionMachine`])
//! 2. **Presence**: announcing ourselves, clearing our presence on the way
//!    out, and telling the view who arrived and who left
//!    ([`PresenceManager`])
//! 3. **Chat**: encoding and decoding chat lines ([`ChatRelay`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (above)  ← owns the event loop, feeds intents and transport events in
//!     ↕
//! Session Layer (this crate)  ← state machine, presence, chat
//!     ↕
//! Protocol + Transport (below)  ← wire types, pub/sub connection
//! ```
//!
//! # Event flow
//!
//! The machine never blocks and never waits for the network. Requests go
//! out through a [`parley_transport::Connection`]; the outcomes come back
//! as [`parley_transport::TransportEvent`]s that the owner hands to
//! [`SessionMachine::handle_transport_event`]. Everything the user should
//! see is pushed as a [`ViewEvent`] onto the view queue.

mod chat;
mod clock;
mod config;
mod error;
mod events;
mod machine;
mod presence;

pub use chat::ChatRelay;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConnectRequest, SessionConfig, DEFAULT_FRESHNESS_WINDOW};
pub use error::SessionError;
pub use events::{
    view_channel, ConnectionState, SessionFault, ViewEvent, ViewReceiver, ViewSender,
};
pub use machine::{Session, SessionMachine};
pub use presence::{Participant, PresenceEvent, PresenceManager};
