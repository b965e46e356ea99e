//! Chat relay: encoding outgoing lines and decoding incoming ones.

use parley_protocol::{ChatMessage, Codec, JsonCodec, ParticipantIdentity, ProtocolError, TopicScheme};
use parley_transport::Publish;

/// Turns chat text into publishes on the chat topic and back.
#[derive(Debug, Clone)]
pub struct ChatRelay {
    codec: JsonCodec,
    topics: TopicScheme,
}

impl ChatRelay {
    pub fn new(topics: TopicScheme) -> Self {
        Self {
            codec: JsonCodec,
            topics,
        }
    }

    /// The wire message for `text` written by `identity`.
    pub fn message(&self, identity: &ParticipantIdentity, text: &str) -> ChatMessage {
        ChatMessage {
            client_id: identity.client_id().to_string(),
            text_reply: text.to_string(),
        }
    }

    /// The non-retained publish carrying `text` to the chat topic.
    pub fn encode(
        &self,
        identity: &ParticipantIdentity,
        text: &str,
    ) -> Result<Publish, ProtocolError> {
        let payload = self.codec.encode(&self.message(identity, text))?;
        Ok(Publish::new(self.topics.chat_topic(), payload))
    }

    /// Decodes a payload from the chat topic.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the payload is not JSON or
    /// lacks `clientId` or `textReply`.
    pub fn decode(&self, payload: &[u8]) -> Result<ChatMessage, ProtocolError> {
        self.codec.decode(payload)
    }
}

#[cfg(test)]
mod tests {
    use parley_protocol::decode_identity;

    use super::*;

    fn relay() -> ChatRelay {
        ChatRelay::new(TopicScheme::default())
    }

    #[test]
    fn test_encode_targets_chat_topic_unretained() {
        let publish = relay().encode(&decode_identity("bob_1"), "hi").unwrap();

        assert_eq!(publish.topic, "chat");
        assert!(!publish.retained);
        assert_eq!(publish.payload, br#"{"clientId":"bob_1","textReply":"hi"}"#.to_vec());
    }

    #[test]
    fn test_decode_valid_payload() {
        let msg = relay()
            .decode(br#"{"clientId":"bob_1","textReply":"hi"}"#)
            .unwrap();
        assert_eq!(msg.client_id, "bob_1");
        assert_eq!(msg.text_reply, "hi");
    }

    #[test]
    fn test_decode_not_json_is_malformed() {
        assert!(matches!(
            relay().decode(b"not json"),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_missing_field_is_malformed() {
        assert!(relay().decode(br#"{"clientId":"bob_1"}"#).is_err());
        assert!(relay().decode(b"").is_err());
    }

    #[test]
    fn test_encode_keeps_text_verbatim() {
        let relay = relay();
        let text = "line one\n\"quoted\" and ünïcode";
        let publish = relay.encode(&decode_identity("a_1"), text).unwrap();

        let back = relay.decode(&publish.payload).unwrap();

        assert_eq!(back.text_reply, text);
    }
}
