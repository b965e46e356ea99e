//! Presence: announcing ourselves, departing, and tracking who is here.
//!
//! Every participant keeps a retained `{"timestamp": ...}` on its own
//! presence topic while connected and clears it with an empty retained
//! payload (a tombstone) when leaving. Because the broker replays retained
//! values to new subscribers, a client that subscribes to `users/#` sees
//! everyone already present, with their *original* timestamps. That is
//! what the freshness window is for: only recent announcements are news.

use std::time::Duration;

use parley_protocol::{
    decode_identity, Codec, JsonCodec, ParticipantIdentity, PresenceAnnouncement,
    ProtocolError, TopicScheme,
};
use parley_transport::Publish;

use crate::ViewEvent;

/// What a presence message means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// The participant is present, announced at `timestamp`.
    Joined {
        identity: ParticipantIdentity,
        timestamp: i64,
    },
    /// The participant's presence was cleared.
    Left(ParticipantIdentity),
}

/// A row in the participant list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub identity: ParticipantIdentity,
    pub is_self: bool,
    /// Timestamp of the announcement that listed them.
    pub announced_at: i64,
}

/// Builds presence payloads and interprets incoming ones.
///
/// Also owns the participant list: the local participant first, peers
/// in the order their announcements arrived.
#[derive(Debug)]
pub struct PresenceManager {
    codec: JsonCodec,
    topics: TopicScheme,
    freshness_window: Duration,
    participants: Vec<Participant>,
}

impl PresenceManager {
    /// Creates a manager with an empty participant list.
    pub fn new(topics: TopicScheme, freshness_window: Duration) -> Self {
        Self {
            codec: JsonCodec,
            topics,
            freshness_window,
            participants: Vec::new(),
        }
    }

    /// The announcement payload for "I am here as of `now_millis`".
    pub fn announcement(&self, now_millis: i64) -> PresenceAnnouncement {
        PresenceAnnouncement {
            timestamp: now_millis,
        }
    }

    /// The retained publish that announces `identity`.
    pub fn announce(
        &self,
        identity: &ParticipantIdentity,
        now_millis: i64,
    ) -> Result<Publish, ProtocolError> {
        let payload = self.codec.encode(&self.announcement(now_millis))?;
        Ok(Publish::retained(
            self.topics.presence_topic_for(identity.client_id()),
            payload,
        ))
    }

    /// The retained tombstone that clears `identity`'s presence.
    pub fn departure(&self, identity: &ParticipantIdentity) -> Publish {
        Publish::retained(self.topics.presence_topic_for(identity.client_id()), Vec::new())
    }

    /// Interprets a message on a presence topic.
    ///
    /// `client_id` is the topic part after `users/`. Empty payload means
    /// the participant left; anything else must be an announcement.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] for a non-empty payload that is
    /// not a valid announcement.
    pub fn interpret(
        &self,
        client_id: &str,
        payload: &[u8],
    ) -> Result<PresenceEvent, ProtocolError> {
        let identity = decode_identity(client_id);
        if payload.is_empty() {
            return Ok(PresenceEvent::Left(identity));
        }
        let announcement: PresenceAnnouncement = self.codec.decode(payload)?;
        Ok(PresenceEvent::Joined {
            identity,
            timestamp: announcement.timestamp,
        })
    }

    /// Returns `true` if an announcement made at `timestamp` is recent
    /// enough to be a new arrival. Timestamps from the future count.
    pub fn is_fresh(&self, timestamp: i64, now_millis: i64) -> bool {
        let window = i64::try_from(self.freshness_window.as_millis()).unwrap_or(i64::MAX);
        now_millis.saturating_sub(timestamp) <= window
    }

    /// Applies a presence event to the participant list and returns what
    /// the view should be told.
    ///
    /// `local_client_id` decides self vs. peer; our own announcement
    /// comes back through the same path as everyone else's.
    pub fn observe(
        &mut self,
        event: PresenceEvent,
        local_client_id: &str,
        now_millis: i64,
    ) -> Vec<ViewEvent> {
        match event {
            PresenceEvent::Joined {
                identity,
                timestamp,
            } => {
                let is_self = identity.client_id() == local_client_id;

                if let Some(existing) = self
                    .participants
                    .iter_mut()
                    .find(|p| p.identity == identity)
                {
                    tracing::debug!(client_id = identity.client_id(), "presence refreshed");
                    existing.announced_at = timestamp;
                    return Vec::new();
                }

                let participant = Participant {
                    identity: identity.clone(),
                    is_self,
                    announced_at: timestamp,
                };
                if is_self {
                    self.participants.insert(0, participant);
                } else {
                    self.participants.push(participant);
                }

                let mut out = vec![ViewEvent::ParticipantListed {
                    identity: identity.clone(),
                    is_self,
                }];
                if self.is_fresh(timestamp, now_millis) {
                    tracing::info!(client_id = identity.client_id(), "participant joined");
                    out.push(ViewEvent::UserJoined { identity, is_self });
                } else {
                    tracing::debug!(
                        client_id = identity.client_id(),
                        age_ms = now_millis.saturating_sub(timestamp),
                        "participant already present"
                    );
                }
                out
            }
            PresenceEvent::Left(identity) => {
                let Some(idx) = self.participants.iter().position(|p| p.identity == identity)
                else {
                    tracing::debug!(
                        client_id = identity.client_id(),
                        "departure for unlisted participant"
                    );
                    return Vec::new();
                };
                let participant = self.participants.remove(idx);
                tracing::info!(client_id = identity.client_id(), "participant left");
                vec![ViewEvent::UserLeft {
                    identity: participant.identity,
                    is_self: participant.is_self,
                }]
            }
        }
    }

    /// Everyone currently present.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Forgets everyone. Used when the session returns to disconnected.
    pub fn clear(&mut self) {
        self.participants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn manager() -> PresenceManager {
        PresenceManager::new(TopicScheme::default(), Duration::from_secs(10))
    }

    fn joined(client_id: &str, timestamp: i64) -> PresenceEvent {
        PresenceEvent::Joined {
            identity: decode_identity(client_id),
            timestamp,
        }
    }

    #[test]
    fn test_announce_is_retained_on_own_presence_topic() {
        let mgr = manager();
        let me = decode_identity("alice_k1");

        let publish = mgr.announce(&me, NOW).unwrap();

        assert_eq!(publish.topic, "users/alice_k1");
        assert!(publish.retained);
        assert_eq!(publish.payload, format!(r#"{{"timestamp":{NOW}}}"#).into_bytes());
    }

    #[test]
    fn test_departure_is_empty_retained_tombstone() {
        let publish = manager().departure(&decode_identity("alice_k1"));
        assert_eq!(publish.topic, "users/alice_k1");
        assert!(publish.retained);
        assert!(publish.payload.is_empty());
    }

    #[test]
    fn test_interpret_empty_payload_is_left() {
        let event = manager().interpret("alice_9f2", b"").unwrap();
        assert_eq!(event, PresenceEvent::Left(decode_identity("alice_9f2")));
    }

    #[test]
    fn test_interpret_announcement_is_joined() {
        let event = manager().interpret("bob_1", br#"{"timestamp":123}"#).unwrap();
        assert_eq!(event, joined("bob_1", 123));
    }

    #[test]
    fn test_interpret_garbage_is_decode_error() {
        let result = manager().interpret("bob_1", b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_is_fresh_boundaries() {
        let mgr = manager();
        assert!(mgr.is_fresh(NOW - 5_000, NOW));
        assert!(mgr.is_fresh(NOW - 10_000, NOW));
        assert!(!mgr.is_fresh(NOW - 10_001, NOW));
        assert!(!mgr.is_fresh(NOW - 20_000, NOW));
        assert!(mgr.is_fresh(NOW + 3_000, NOW), "future timestamps are fresh");
    }

    #[test]
    fn test_observe_fresh_join_lists_and_notifies() {
        let mut mgr = manager();

        let out = mgr.observe(joined("bob_1", NOW - 5_000), "alice_1", NOW);

        let bob = decode_identity("bob_1");
        assert_eq!(
            out,
            vec![
                ViewEvent::ParticipantListed {
                    identity: bob.clone(),
                    is_self: false
                },
                ViewEvent::UserJoined {
                    identity: bob,
                    is_self: false
                },
            ]
        );
    }

    #[test]
    fn test_observe_stale_join_only_lists() {
        let mut mgr = manager();

        let out = mgr.observe(joined("bob_1", NOW - 20_000), "alice_1", NOW);

        assert_eq!(
            out,
            vec![ViewEvent::ParticipantListed {
                identity: decode_identity("bob_1"),
                is_self: false
            }]
        );
        assert_eq!(mgr.participants().len(), 1);
    }

    #[test]
    fn test_observe_self_goes_first() {
        let mut mgr = manager();
        mgr.observe(joined("bob_1", NOW - 60_000), "alice_1", NOW);
        mgr.observe(joined("carol_1", NOW - 60_000), "alice_1", NOW);
        mgr.observe(joined("alice_1", NOW), "alice_1", NOW);

        let names: Vec<&str> = mgr
            .participants()
            .iter()
            .map(|p| p.identity.username())
            .collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert!(mgr.participants()[0].is_self);
    }

    #[test]
    fn test_observe_repeated_announcement_is_silent() {
        let mut mgr = manager();
        mgr.observe(joined("bob_1", NOW), "alice_1", NOW);

        let out = mgr.observe(joined("bob_1", NOW + 1), "alice_1", NOW + 1);

        assert!(out.is_empty());
        assert_eq!(mgr.participants().len(), 1);
        assert_eq!(mgr.participants()[0].announced_at, NOW + 1);
    }

    #[test]
    fn test_observe_left_removes_and_notifies() {
        let mut mgr = manager();
        mgr.observe(joined("bob_1", NOW), "alice_1", NOW);

        let out = mgr.observe(PresenceEvent::Left(decode_identity("bob_1")), "alice_1", NOW);

        assert_eq!(
            out,
            vec![ViewEvent::UserLeft {
                identity: decode_identity("bob_1"),
                is_self: false
            }]
        );
        assert!(mgr.participants().is_empty());
    }

    #[test]
    fn test_observe_left_for_unknown_participant_is_ignored() {
        let mut mgr = manager();

        let out = mgr.observe(PresenceEvent::Left(decode_identity("ghost_1")), "alice_1", NOW);

        assert!(out.is_empty());
    }

    #[test]
    fn test_clear_empties_list() {
        let mut mgr = manager();
        mgr.observe(joined("bob_1", NOW), "alice_1", NOW);
        mgr.clear();
        assert!(mgr.participants().is_empty());
    }
}
