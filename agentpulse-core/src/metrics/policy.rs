//! Partial-versus-final reply classification

use crate::config::MetricsConfig;

/// Decides whether a reply is substantial enough to count as a completed task.
///
/// A reply is final when it is at least `min_chars` long and does not end
/// in one of the `partial_markers` (a trailing ellipsis usually means the
/// assistant is still streaming or about to continue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionPolicy {
    pub min_chars: usize,
    pub partial_markers: Vec<String>,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            min_chars: 200,
            partial_markers: vec!["...".to_string(), "…".to_string()],
        }
    }
}

impl CompletionPolicy {
    pub fn from_config(config: &MetricsConfig) -> Self {
        Self {
            min_chars: config.completion_min_chars,
            ..Default::default()
        }
    }

    pub fn is_final(&self, reply: &str) -> bool {
        let reply = reply.trim();
        if reply.chars().count() < self.min_chars {
            return false;
        }
        !self
            .partial_markers
            .iter()
            .any(|marker| reply.ends_with(marker.as_str()))
    }
}
