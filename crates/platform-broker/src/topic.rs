//! Topic matching and channel-private topic names
//!
//! Topics are `.`-delimited segment lists. Patterns support two wildcards:
//! - `*` matches exactly one segment
//! - `#` matches zero or more segments
//!
//! Examples:
//! - `user.*` matches `user.created`, not `user.profile.updated`
//! - `user.#` matches `user`, `user.created`, `user.profile.updated`
//! - `*.created` matches `user.created`, `order.created`

use uuid::Uuid;

/// Segment delimiter.
pub const DELIMITER: char = '.';

/// Matches exactly one segment.
pub const WILDCARD: &str = "*";

/// Matches zero or more segments.
pub const MULTI_WILDCARD: &str = "#";

/// Check if a topic matches a pattern.
pub fn matches(pattern: &str, topic: &str) -> bool {
    let pattern: Vec<&str> = pattern.split(DELIMITER).collect();
    let topic: Vec<&str> = topic.split(DELIMITER).collect();
    segments_match(&pattern, &topic)
}

// Glob-style matching with `#` as the star: on a mismatch, only the most
// recent `#` needs to absorb one more segment, so the cost stays
// O(pattern * topic) however many `#` segments the pattern holds.
fn segments_match(pattern: &[&str], topic: &[&str]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Last `#` seen and the topic position it currently absorbs up to
    let mut backtrack: Option<(usize, usize)> = None;

    while t < topic.len() {
        match pattern.get(p) {
            Some(&MULTI_WILDCARD) => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&segment) if segment == WILDCARD || segment == topic[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, absorbed)) => {
                    backtrack = Some((star, absorbed + 1));
                    p = star + 1;
                    t = absorbed + 1;
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&segment| segment == MULTI_WILDCARD)
}

/// Check whether a pattern contains any wildcard segment.
pub fn is_pattern(topic: &str) -> bool {
    topic
        .split(DELIMITER)
        .any(|s| s == WILDCARD || s == MULTI_WILDCARD)
}

/// Topic carrying a data channel's published values.
pub(crate) fn data_topic(channel_id: &Uuid) -> String {
    format!("data{DELIMITER}{channel_id}")
}

/// Topic a request with `correlation_id` is emitted on.
pub(crate) fn request_topic(channel_id: &Uuid, correlation_id: &Uuid) -> String {
    format!("request{DELIMITER}{channel_id}{DELIMITER}{correlation_id}")
}

/// Pattern a responder registers on: every request of one channel.
pub(crate) fn request_pattern(channel_id: &Uuid) -> String {
    format!("request{DELIMITER}{channel_id}{DELIMITER}{WILDCARD}")
}

/// Topic the reply to `correlation_id` is emitted on.
pub(crate) fn reply_topic(channel_id: &Uuid, correlation_id: &Uuid) -> String {
    format!("reply{DELIMITER}{channel_id}{DELIMITER}{correlation_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matching() {
        // Exact match
        assert!(matches("user.profile.updated", "user.profile.updated"));

        // Single wildcard
        assert!(matches("user.profile.*", "user.profile.updated"));
        assert!(matches("user.*.updated", "user.profile.updated"));
        assert!(matches("*.profile.updated", "user.profile.updated"));

        // Multi-segment wildcard
        assert!(matches("user.#", "user.profile.updated"));
        assert!(matches("#", "user.profile.updated"));
        assert!(matches("user.#.updated", "user.profile.avatar.updated"));
        assert!(matches("user.#", "user"));

        // Non-matches
        assert!(!matches("user.profile.created", "user.profile.updated"));
        assert!(!matches("order.profile.*", "user.profile.updated"));
        assert!(!matches("user.*", "user.profile.updated"));
        assert!(!matches("user.*", "user"));
        assert!(!matches("user.profile", "user.profile.updated"));
    }

    #[test]
    fn test_multi_wildcard_backtracking() {
        assert!(matches("#.x", "x"));
        assert!(matches("#.x", "a.b.x"));
        assert!(matches("a.#.b.#.c", "a.b.b.x.c"));
        assert!(matches("#.*", "a"));
        assert!(matches("#.#", "a.b"));
        assert!(matches("#.*", "a.b.c"));
        assert!(!matches("a.#.b", "a.b.c"));
        assert!(!matches("#.x.y", "x.y.z"));
    }

    #[test]
    fn test_many_multi_wildcards_on_long_topic() {
        let pattern = "#.#.#.#.#.#.#.#.#.#.#.#.x";
        let miss = vec!["seg"; 200].join(".");
        let hit = format!("{miss}.x");

        assert!(!matches(pattern, &miss));
        assert!(matches(pattern, &hit));
        assert!(matches("#.#.#.#.#.#.#.#", &miss));
    }

    #[test]
    fn test_is_pattern() {
        assert!(is_pattern("test.*"));
        assert!(is_pattern("#"));
        assert!(!is_pattern("test.a"));
        assert!(!is_pattern("test.a*"));
    }

    #[test]
    fn test_correlation_id_is_one_segment() {
        let channel = Uuid::now_v7();
        let correlation = Uuid::now_v7();

        let pattern = request_pattern(&channel);
        assert!(matches(&pattern, &request_topic(&channel, &correlation)));
        assert!(!matches(&pattern, &reply_topic(&channel, &correlation)));
        assert!(!matches(
            &pattern,
            &request_topic(&Uuid::now_v7(), &correlation)
        ));
    }

    #[test]
    fn test_private_topics_are_distinct() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        assert_ne!(data_topic(&a), data_topic(&b));
        assert!(!matches(&data_topic(&a), &data_topic(&b)));
    }
}
