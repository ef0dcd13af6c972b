//! Inline tag handling
//!
//! Agents embed side-channel metadata in their text as `[[kind:key=value|...]]`.
//! The emotion tag drives the console's emotion indicator; every tag is
//! hidden from the rendered text.

use regex::Regex;
use std::sync::LazyLock;

/// Emotion shown before any tag has been seen
pub const DEFAULT_EMOTION: &str = "idle";

/// `[[emotion:name=<value>` terminated by `|` or `]]`
static EMOTION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[emotion:name=(.*?)(?:\||\]\])").expect("emotion tag pattern"));

/// Any `[[...]]` span, shortest match
static INLINE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[.*?\]\]").expect("inline tag pattern"));

/// Emotion named by the first emotion tag in `text`.
/// Later tags in the same text are ignored.
pub fn extract_emotion(text: &str) -> Option<&str> {
    EMOTION_TAG
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
}

/// `text` with every inline tag removed and outer whitespace trimmed
pub fn strip_tags(text: &str) -> String {
    INLINE_TAG.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_with_attributes() {
        let text = "Hello [[emotion:name=joy|intensity=0.8]] world";
        assert_eq!(extract_emotion(text), Some("joy"));
        assert_eq!(strip_tags(text), "Hello  world");
    }

    #[test]
    fn test_extract_without_attributes() {
        assert_eq!(extract_emotion("[[emotion:name=calm]] ok"), Some("calm"));
    }

    #[test]
    fn test_first_tag_in_text_wins() {
        let text = "[[emotion:name=joy]] then [[emotion:name=sad|x=1]]";
        assert_eq!(extract_emotion(text), Some("joy"));
        assert_eq!(strip_tags(text), "then");
    }

    #[test]
    fn test_no_or_incomplete_tag() {
        assert_eq!(extract_emotion("plain text"), None);
        assert_eq!(extract_emotion("[[emotion:name=joy"), None);
        assert_eq!(extract_emotion("[[emotion:name=]]"), None);
        assert_eq!(extract_emotion("[[gesture:name=wave]]"), None);
    }

    #[test]
    fn test_strip_multiple_tags() {
        assert_eq!(
            strip_tags("  [[a]]one [[b:c=d]]two[[e]]  "),
            "one two"
        );
        assert_eq!(strip_tags("no tags"), "no tags");
    }

    #[test]
    fn test_strip_is_non_greedy() {
        assert_eq!(strip_tags("x [[a]] keep [[b]] y"), "x  keep  y");
    }
}
