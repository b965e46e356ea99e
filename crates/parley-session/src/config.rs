//! Session configuration and connect requests.

use std::time::Duration;

use parley_protocol::TopicScheme;

use crate::SessionError;

/// How recent a presence announcement must be to count as a new arrival.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(10);

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// A join is announced to the view only if the presence timestamp is
    /// at most this old. Older retained announcements update the
    /// participant list silently.
    ///
    /// Default: 10 seconds.
    pub freshness_window: Duration,

    /// Where presence and chat live on the broker.
    pub topics: TopicScheme,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            topics: TopicScheme::default(),
        }
    }
}

/// What the user typed into the login form.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// May be empty.
    pub password: String,
}

impl ConnectRequest {
    /// Creates a request with an empty password.
    pub fn new(host: &str, port: u16, username: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: String::new(),
        }
    }

    /// Sets the password.
    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    /// Checks that host and user name are non-empty and the port is set.
    ///
    /// The user name ends up in a topic name, so it may not contain the
    /// wildcards `+` and `#` or a NUL character.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.host.trim().is_empty() {
            return Err(SessionError::InvalidInput("host is empty".into()));
        }
        if self.port == 0 {
            return Err(SessionError::InvalidInput("port is 0".into()));
        }
        if self.username.is_empty() {
            return Err(SessionError::InvalidInput("username is empty".into()));
        }
        if let Some(c) = self
            .username
            .chars()
            .find(|c| matches!(c, '+' | '#' | '\0'))
        {
            return Err(SessionError::InvalidInput(format!(
                "username must not contain {c:?}"
            )));
        }
        Ok(())
    }
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.freshness_window, Duration::from_secs(10));
        assert_eq!(config.topics.chat_topic(), "chat");
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(ConnectRequest::new("localhost", 8080, "alice").validate().is_ok());
        assert!(matches!(
            ConnectRequest::new("", 8080, "alice").validate(),
            Err(SessionError::InvalidInput(_))
        ));
        assert!(ConnectRequest::new("localhost", 0, "alice").validate().is_err());
        assert!(ConnectRequest::new("localhost", 8080, "").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_topic_wildcards_in_username() {
        for username in ["c++", "#general", "a+b", "nul\0name"] {
            assert!(
                matches!(
                    ConnectRequest::new("localhost", 1883, username).validate(),
                    Err(SessionError::InvalidInput(_))
                ),
                "username {username:?}"
            );
        }
        assert!(ConnectRequest::new("localhost", 1883, "mary_jane/x").validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_password() {
        let req = ConnectRequest::new("h", 1, "u").password("hunter2");
        let printed = format!("{req:?}");
        assert!(!printed.contains("hunter2"));
    }
}
