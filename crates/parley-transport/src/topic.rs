//! Topic names, topic filters and wildcard matching.
//!
//! Topics are `/`-separated levels. Filters may use `+` for exactly one
//! level and `#` (last level only) for any number of remaining levels,
//! including none: `users/#` matches `users` and `users/a/b`.

use crate::TransportError;

/// Checks that `topic` is usable as a publish destination.
pub fn validate_topic(topic: &str) -> Result<(), TransportError> {
    if topic.is_empty() {
        return Err(invalid(topic, "topic is empty"));
    }
    if topic.contains(['+', '#']) {
        return Err(invalid(topic, "wildcards are not allowed in topic names"));
    }
    Ok(())
}

/// Checks that `filter` is a well-formed subscription filter.
pub fn validate_filter(filter: &str) -> Result<(), TransportError> {
    if filter.is_empty() {
        return Err(invalid(filter, "filter is empty"));
    }
    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != last) {
            return Err(invalid(filter, "'#' must be the whole last level"));
        }
        if level.contains('+') && *level != "+" {
            return Err(invalid(filter, "'+' must be a whole level"));
        }
    }
    Ok(())
}

/// Returns `true` if `topic` is matched by `filter`.
///
/// Topics starting with `$` are never matched by a leading wildcard.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && filter.starts_with(['+', '#']) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn invalid(topic: &str, reason: &'static str) -> TransportError {
    TransportError::InvalidTopic {
        topic: topic.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matches_exact() {
        assert!(topic_matches("chat", "chat"));
        assert!(!topic_matches("chat", "chat/room"));
        assert!(!topic_matches("chat/room", "chat"));
    }

    #[test]
    fn test_topic_matches_multi_level_wildcard() {
        assert!(topic_matches("users/#", "users/alice_1"));
        assert!(topic_matches("users/#", "users/a/b/c"));
        // '#' also matches the parent level itself.
        assert!(topic_matches("users/#", "users"));
        assert!(!topic_matches("users/#", "chat"));
        assert!(topic_matches("#", "anything/at/all"));
    }

    #[test]
    fn test_topic_matches_single_level_wildcard() {
        assert!(topic_matches("users/+", "users/bob_2"));
        assert!(!topic_matches("users/+", "users/bob_2/extra"));
        assert!(topic_matches("+/+", "a/b"));
        assert!(topic_matches("users/+", "users/"));
    }

    #[test]
    fn test_topic_matches_dollar_topics_hidden_from_leading_wildcards() {
        assert!(!topic_matches("#", "$SYS/uptime"));
        assert!(!topic_matches("+/uptime", "$SYS/uptime"));
        assert!(topic_matches("$SYS/#", "$SYS/uptime"));
    }

    #[test]
    fn test_validate_filter_rejects_misplaced_wildcards() {
        assert!(validate_filter("users/#").is_ok());
        assert!(validate_filter("+/chat/+").is_ok());
        assert!(validate_filter("users/#/more").is_err());
        assert!(validate_filter("users/a#").is_err());
        assert!(validate_filter("us+rs").is_err());
        assert!(validate_filter("").is_err());
    }

    #[test]
    fn test_validate_topic_rejects_wildcards_and_empty() {
        assert!(validate_topic("users/alice_1").is_ok());
        assert!(matches!(
            validate_topic("users/#"),
            Err(TransportError::InvalidTopic { .. })
        ));
        assert!(validate_topic("").is_err());
    }
}
