//! Participant identity: `<username>_<token>` client ids.
//!
//! The client id doubles as the broker connection id and as the suffix of
//! the participant's presence topic, so the user name has to be
//! recoverable from it. It is everything before the *last* `_`, which
//! lets user names contain `_` themselves.

use std::fmt;

use rand::Rng;

use crate::ProtocolError;

/// Separates the user name from the uniqueness token in a client id.
pub const IDENTITY_SEPARATOR: char = '_';

/// Random base-36 characters appended to the timestamp in a token.
const TOKEN_RANDOM_CHARS: usize = 3;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Who a participant is: their client id and the display name inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantIdentity {
    client_id: String,
    username: String,
}

impl ParticipantIdentity {
    /// Creates a fresh identity for `username`, unique for practical
    /// purposes, using `now_millis` as the base of the token.
    pub fn generate(username: &str, now_millis: i64) -> Self {
        let token = unique_token(now_millis);
        Self {
            client_id: encode_identity(username, &token),
            username: username.to_string(),
        }
    }

    /// Decodes a client id, splitting at the last `_`.
    ///
    /// A client id without any `_` decodes to a user name equal to the
    /// whole string and an empty token.
    pub fn parse(client_id: &str) -> Self {
        let username = match client_id.rfind(IDENTITY_SEPARATOR) {
            Some(idx) => &client_id[..idx],
            None => client_id,
        };
        Self {
            client_id: client_id.to_string(),
            username: username.to_string(),
        }
    }

    /// Like [`parse`](Self::parse), but rejects a client id with no `_`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidIdentity`] if there is no separator.
    pub fn parse_strict(client_id: &str) -> Result<Self, ProtocolError> {
        if client_id.contains(IDENTITY_SEPARATOR) {
            Ok(Self::parse(client_id))
        } else {
            Err(ProtocolError::InvalidIdentity(client_id.to_string()))
        }
    }

    /// The full client id, `<username>_<token>`.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The human-readable display name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The uniqueness token after the last `_`, or `""` if there is none.
    pub fn token(&self) -> &str {
        self.client_id
            .get(self.username.len() + 1..)
            .unwrap_or_default()
    }
}

impl fmt::Display for ParticipantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// Joins a user name and token into a client id.
pub fn encode_identity(username: &str, token: &str) -> String {
    format!("{username}{IDENTITY_SEPARATOR}{token}")
}

/// Splits a client id back into a [`ParticipantIdentity`].
pub fn decode_identity(client_id: &str) -> ParticipantIdentity {
    ParticipantIdentity::parse(client_id)
}

/// Builds a compact token: the millisecond timestamp in base 36 followed
/// by a few random base-36 characters, so two identities created in the
/// same millisecond still differ.
pub fn unique_token(now_millis: i64) -> String {
    let mut token = to_base36(now_millis.unsigned_abs());
    let mut rng = rand::rng();
    for _ in 0..TOKEN_RANDOM_CHARS {
        token.push(char::from(BASE36_DIGITS[rng.random_range(0..36)]));
    }
    token
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    // Every byte comes from BASE36_DIGITS, which is ASCII.
    digits.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_identity_splits_at_last_separator() {
        let id = decode_identity("alice_9f2");
        assert_eq!(id.client_id(), "alice_9f2");
        assert_eq!(id.username(), "alice");
        assert_eq!(id.token(), "9f2");
    }

    #[test]
    fn test_decode_identity_username_with_underscores() {
        let id = decode_identity("mary_jane_doe_k3x");
        assert_eq!(id.username(), "mary_jane_doe");
        assert_eq!(id.token(), "k3x");
    }

    #[test]
    fn test_decode_identity_without_separator_uses_whole_string() {
        let id = decode_identity("nobody");
        assert_eq!(id.username(), "nobody");
        assert_eq!(id.token(), "");
    }

    #[test]
    fn test_parse_strict_rejects_missing_separator() {
        assert!(matches!(
            ParticipantIdentity::parse_strict("nobody"),
            Err(ProtocolError::InvalidIdentity(id)) if id == "nobody"
        ));
        assert!(ParticipantIdentity::parse_strict("some_body").is_ok());
    }

    #[test]
    fn test_generate_roundtrips_through_decode() {
        for username in ["alice", "bob_the_builder", "_", "x_", ""] {
            let id = ParticipantIdentity::generate(username, 1_700_000_000_000);
            let decoded = decode_identity(id.client_id());
            assert_eq!(decoded, id, "username {username:?}");
            assert_eq!(decoded.username(), username);
        }
    }

    #[test]
    fn test_unique_token_has_timestamp_prefix_and_no_separator() {
        let token = unique_token(35);
        assert!(token.starts_with('z'));
        assert_eq!(token.len(), 1 + TOKEN_RANDOM_CHARS);
        assert!(!token.contains(IDENTITY_SEPARATOR));
    }

    #[test]
    fn test_generate_same_millisecond_yields_distinct_ids() {
        const NOW: i64 = 1_700_000_000_000;
        let ids: std::collections::HashSet<String> = (0..20)
            .map(|_| ParticipantIdentity::generate("alice", NOW).client_id().to_string())
            .collect();

        // 20 draws from 36^3 suffixes; an all-equal outcome means no randomness.
        assert!(ids.len() > 1, "random suffix did not vary: {ids:?}");
        for id in &ids {
            assert!(id.starts_with("alice_loyw3v28"));
            assert_eq!(decode_identity(id).username(), "alice");
        }
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn test_display_shows_username() {
        assert_eq!(decode_identity("carol_1").to_string(), "carol");
    }
}
