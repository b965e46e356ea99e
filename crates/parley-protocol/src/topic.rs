//! Topic scheme: where presence and chat traffic live on the broker.
//!
//! ```text
//! users/<clientId>   retained presence, one topic per participant
//! users/#            wildcard subscription covering every presence topic
//! chat               ephemeral chat, shared by everyone
//! ```

/// Default prefix of every presence topic.
pub const PRESENCE_TOPIC_PREFIX: &str = "users";

/// Default topic carrying all chat traffic.
pub const CHAT_TOPIC: &str = "chat";

/// What an incoming topic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind<'a> {
    /// A participant's presence topic; carries that participant's client id.
    Presence(&'a str),
    /// The shared chat topic.
    Chat,
    /// Anything else. Ignored, so newer topic namespaces don't break us.
    Unrecognized,
}

/// Maps presence/chat concepts to topic strings and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    presence_prefix: String,
    chat_topic: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new(PRESENCE_TOPIC_PREFIX, CHAT_TOPIC)
    }
}

impl TopicScheme {
    /// Creates a scheme with a custom presence prefix and chat topic.
    pub fn new(presence_prefix: &str, chat_topic: &str) -> Self {
        Self {
            presence_prefix: presence_prefix.to_string(),
            chat_topic: chat_topic.to_string(),
        }
    }

    /// The presence topic for one participant: `users/<clientId>`.
    pub fn presence_topic_for(&self, client_id: &str) -> String {
        format!("{}/{client_id}", self.presence_prefix)
    }

    /// The subscription filter matching every presence topic: `users/#`.
    pub fn presence_wildcard(&self) -> String {
        format!("{}/#", self.presence_prefix)
    }

    /// The shared chat topic.
    pub fn chat_topic(&self) -> &str {
        &self.chat_topic
    }

    /// Classifies an incoming topic.
    ///
    /// Everything after `users/` is the client id, even if it contains
    /// further `/`. An empty client id is unrecognized.
    pub fn classify<'a>(&self, topic: &'a str) -> TopicKind<'a> {
        if let Some(client_id) = topic
            .strip_prefix(self.presence_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        {
            if client_id.is_empty() {
                return TopicKind::Unrecognized;
            }
            return TopicKind::Presence(client_id);
        }
        if topic == self.chat_topic {
            return TopicKind::Chat;
        }
        TopicKind::Unrecognized
    }
}
