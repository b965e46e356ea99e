//! Wire protocol for Parley.
//!
//! This crate defines the "language" participants speak through the
//! broker:
//!
//! - **Identity** ([`ParticipantIdentity`]): `<username>_<token>` client ids
//! - **Topics** ([`TopicScheme`], [`TopicKind`]): where presence and chat live
//! - **Payloads** ([`PresenceAnnouncement`], [`ChatMessage`])
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): payloads to/from bytes
//! - **Errors** ([`ProtocolError`])
//!
//! Everything here is pure: no connections, no clocks, no state.

mod codec;
mod error;
mod identity;
mod topic;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use identity::{
    decode_identity, encode_identity, unique_token, ParticipantIdentity, IDENTITY_SEPARATOR,
};
pub use topic::{TopicKind, TopicScheme, CHAT_TOPIC, PRESENCE_TOPIC_PREFIX};
pub use types::{ChatMessage, PresenceAnnouncement};
