//! Incoming-message recognition
//!
//! User turns arrive in a handful of shapes depending on which channel
//! relayed them. Each shape has its own [`IncomingMatcher`]; the extractor
//! tries them in order and the first match wins.

use regex::Regex;
use std::sync::LazyLock;

/// A recognised incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub channel: Option<String>,
    pub sender: Option<String>,
    pub text: String,
}

impl IncomingMessage {
    /// `sender: text`, or just the text when the sender is unknown.
    pub fn describe(&self) -> String {
        match &self.sender {
            Some(sender) => format!("{}: {}", sender, self.text),
            None => self.text.clone(),
        }
    }
}

/// One strategy for pulling sender and text out of a user turn.
pub trait IncomingMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` when the text is not in this matcher's shape.
    fn try_match(&self, text: &str) -> Option<IncomingMessage>;
}

static SYSTEM_ENVELOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^System:\s*(?:\[[^\]]*\]\s*)?(?P<channel>[A-Za-z][\w-]*)\s+(?:message|DM|direct message)\s+from\s+(?P<sender>[^:\n]+?):\s*(?P<text>.+)$",
    )
    .expect("valid regex")
});

static BRACKETED_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^\[(?P<channel>[A-Za-z][\w-]*)\s+(?P<sender>[^\]\(\n]+?)(?:\s+\(@[^)]*\))?(?:\s+id:\S+)?(?:\s+\d{4}-\d{2}-\d{2}[^\]]*)?\]\s*(?P<text>.+)$",
    )
    .expect("valid regex")
});

static METADATA_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[\[[^\]]*\]\]|\[(?:message_id|msg_id|id|chat_id|channel|thread_id)\s*:[^\]]*\]",
    )
    .expect("valid regex")
});

/// `System: [2026-03-01 12:00 UTC] Telegram message from Ana: text`
pub struct SystemEnvelopeMatcher;

impl IncomingMatcher for SystemEnvelopeMatcher {
    fn name(&self) -> &'static str {
        "system_envelope"
    }

    fn try_match(&self, text: &str) -> Option<IncomingMessage> {
        let caps = SYSTEM_ENVELOPE.captures(text.trim())?;
        Some(IncomingMessage {
            channel: Some(caps["channel"].to_string()),
            sender: Some(caps["sender"].trim().to_string()),
            text: caps["text"].to_string(),
        })
    }
}

/// `[Telegram Ana (@ana) id:123 2026-03-01 12:00 UTC] text`
pub struct BracketedSourceMatcher;

impl IncomingMatcher for BracketedSourceMatcher {
    fn name(&self) -> &'static str {
        "bracketed_source"
    }

    fn try_match(&self, text: &str) -> Option<IncomingMessage> {
        let caps = BRACKETED_SOURCE.captures(text.trim())?;
        Some(IncomingMessage {
            channel: Some(caps["channel"].to_string()),
            sender: Some(caps["sender"].trim().to_string()),
            text: caps["text"].to_string(),
        })
    }
}

/// Untagged text typed straight into the primary session.
pub struct PlainTextMatcher;

impl IncomingMatcher for PlainTextMatcher {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    fn try_match(&self, text: &str) -> Option<IncomingMessage> {
        let text = text.trim();
        // Runtime notices that did not fit the envelope shape
        if text.is_empty() || text.starts_with("System:") {
            return None;
        }
        Some(IncomingMessage {
            channel: None,
            sender: None,
            text: text.to_string(),
        })
    }
}

/// The default strategy order.
pub fn default_matchers() -> Vec<Box<dyn IncomingMatcher>> {
    vec![
        Box::new(SystemEnvelopeMatcher),
        Box::new(BracketedSourceMatcher),
        Box::new(PlainTextMatcher),
    ]
}

/// Remove id and reply markers, then collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let stripped = METADATA_MARKERS.replace_all(text, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Heartbeat polls and other runtime chatter that should never show up as activity.
pub fn is_noise(text: &str, min_chars: usize) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < min_chars {
        return true;
    }
    let upper = trimmed.to_ascii_uppercase();
    upper.contains("HEARTBEAT") || upper == "NO_REPLY" || upper.starts_with("[CRON")
}

/// Run `matchers` in order, clean the winner's text and drop noise.
pub fn match_incoming(
    matchers: &[Box<dyn IncomingMatcher>],
    text: &str,
    min_chars: usize,
) -> Option<IncomingMessage> {
    let mut found = matchers.iter().find_map(|m| {
        let hit = m.try_match(text)?;
        tracing::trace!(matcher = m.name(), "Matched incoming message");
        Some(hit)
    })?;
    found.text = clean_text(&found.text);
    if is_noise(&found.text, min_chars) {
        return None;
    }
    Some(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> Option<IncomingMessage> {
        match_incoming(&default_matchers(), text, 2)
    }

    #[test]
    fn test_system_envelope() {
        let msg = run("System: [2026-03-01 12:00 UTC] Telegram message from Ana: can you check the build?")
            .unwrap();
        assert_eq!(msg.channel.as_deref(), Some("Telegram"));
        assert_eq!(msg.sender.as_deref(), Some("Ana"));
        assert_eq!(msg.text, "can you check the build?");
        assert_eq!(msg.describe(), "Ana: can you check the build?");
    }

    #[test]
    fn test_bracketed_source() {
        let msg = run("[Telegram Ana Lopez (@ana) id:123 2026-03-01 12:00 UTC] hello\n[message_id: 991]")
            .unwrap();
        assert_eq!(msg.channel.as_deref(), Some("Telegram"));
        assert_eq!(msg.sender.as_deref(), Some("Ana Lopez"));
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn test_first_match_wins() {
        // Both the envelope and plain-text matchers could claim this; the envelope comes first
        let msg = run("System: Slack message from Ben: ship it").unwrap();
        assert_eq!(msg.sender.as_deref(), Some("Ben"));
    }

    #[test]
    fn test_plain_text_fallback() {
        let msg = run("  what's the weather   like  ").unwrap();
        assert_eq!(msg.sender, None);
        assert_eq!(msg.text, "what's the weather like");
    }

    #[test]
    fn test_unrecognised_system_notice_is_ignored() {
        assert_eq!(run("System: gateway restarted"), None);
    }

    #[test]
    fn test_clean_text_strips_markers() {
        assert_eq!(
            clean_text("[[reply_to_current]] done [id:55]   thanks [message_id: 7]"),
            "done thanks"
        );
    }

    #[test]
    fn test_noise_is_dropped() {
        assert_eq!(run("Read HEARTBEAT.md if it exists and follow it."), None);
        assert_eq!(run("[Telegram Ana] k"), None);
        assert!(is_noise("NO_REPLY", 2));
        assert!(!is_noise("ok", 2));
    }
}
