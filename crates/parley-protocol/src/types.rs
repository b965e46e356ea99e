//! Wire payloads for presence and chat.
//!
//! ```text
//! users/<clientId>  {"timestamp": 1700000000000}        retained
//! users/<clientId>  (zero bytes)                         retained tombstone
//! chat              {"clientId": "...", "textReply": "..."}
//! ```

use serde::{Deserialize, Serialize};

/// A participant's retained "I am here" announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceAnnouncement {
    /// Milliseconds since the Unix epoch, captured when announcing.
    pub timestamp: i64,
}

/// A chat line published on the shared chat topic.
///
/// Field names are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Client id of the author.
    pub client_id: String,
    /// Message body. No length limit.
    pub text_reply: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_announcement_wire_format() {
        let json = serde_json::to_string(&PresenceAnnouncement { timestamp: 42 }).unwrap();
        assert_eq!(json, r#"{"timestamp":42}"#);
    }

    #[test]
    fn test_chat_message_uses_camel_case_fields() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"clientId":"bob_1","textReply":"hi"}"#).unwrap();
        assert_eq!(msg.client_id, "bob_1");
        assert_eq!(msg.text_reply, "hi");
    }

    #[test]
    fn test_chat_message_missing_field_is_rejected() {
        assert!(serde_json::from_str::<ChatMessage>(r#"{"clientId":"bob_1"}"#).is_err());
        assert!(serde_json::from_str::<ChatMessage>(r#"{"textReply":"hi"}"#).is_err());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let a: PresenceAnnouncement =
            serde_json::from_str(r#"{"timestamp":7,"status":"away"}"#).unwrap();
        assert_eq!(a.timestamp, 7);
    }
}
