//! Deduplicator for activity events
//!
//! Consecutive ticks read overlapping transcript tails, and a restart
//! replays recent lines, so the same visible event can be produced more
//! than once. An event is a duplicate of one already admitted when either
//! its id matches, or its category matches and its normalized description
//! matches within `window` of the other's timestamp.

use crate::config::PipelineConfig;
use crate::types::{ActivityCategory, ActivityEvent};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone)]
struct Seen {
    id: String,
    category: ActivityCategory,
    key: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    window: Duration,
    prefix_chars: usize,
    capacity: usize,
    seen: VecDeque<Seen>,
    ids: HashSet<String>,
}

impl Deduplicator {
    pub fn new(window: Duration, prefix_chars: usize, capacity: usize) -> Self {
        Self {
            window,
            prefix_chars,
            capacity: capacity.max(1),
            seen: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        // Remember well past what the activity list can show
        Self::new(
            Duration::seconds(config.dedup_window_secs as i64),
            config.dedup_prefix_chars,
            config.activity_limit * 10,
        )
    }

    /// Case-folded, whitespace-collapsed prefix of a description.
    pub fn normalize(&self, description: &str) -> String {
        description
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
            .chars()
            .take(self.prefix_chars)
            .collect()
    }

    pub fn is_duplicate(&self, event: &ActivityEvent) -> bool {
        if self.ids.contains(&event.id) {
            return true;
        }
        let key = self.normalize(&event.description);
        self.seen.iter().any(|s| {
            s.category == event.category
                && s.key == key
                && (s.timestamp - event.timestamp).num_milliseconds().abs()
                    <= self.window.num_milliseconds()
        })
    }

    /// Remember `event` so later near-copies are rejected.
    pub fn remember(&mut self, event: &ActivityEvent) {
        self.seen.push_back(Seen {
            id: event.id.clone(),
            category: event.category,
            key: self.normalize(&event.description),
            timestamp: event.timestamp,
        });
        self.ids.insert(event.id.clone());

        while self.seen.len() > self.capacity {
            if let Some(old) = self.seen.pop_front() {
                self.ids.remove(&old.id);
            }
        }
    }

    /// Returns true and remembers the event when it is new.
    pub fn admit(&mut self, event: &ActivityEvent) -> bool {
        if self.is_duplicate(event) {
            tracing::trace!(id = %event.id, category = %event.category, "Dropped duplicate activity");
            return false;
        }
        self.remember(event);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityStatus;
    use chrono::TimeZone;

    fn event(category: ActivityCategory, text: &str, secs: i64) -> ActivityEvent {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        ActivityEvent::new(category, text, base + Duration::seconds(secs), ActivityStatus::Success, 200)
    }

    #[test]
    fn test_dedup_window() {
        let mut dedup = Deduplicator::default();
        assert!(dedup.admit(&event(ActivityCategory::Message, "Build passed", 0)));
        assert!(!dedup.admit(&event(ActivityCategory::Message, "Build passed", 5)));
        assert!(dedup.admit(&event(ActivityCategory::Message, "Build passed", 600)));
    }

    #[test]
    fn test_normalization_folds_case_and_whitespace() {
        let mut dedup = Deduplicator::default();
        assert!(dedup.admit(&event(ActivityCategory::Message, "Build   PASSED", 0)));
        assert!(dedup.is_duplicate(&event(ActivityCategory::Message, "build passed", 3)));
    }

    #[test]
    fn test_prefix_comparison() {
        let mut dedup = Deduplicator::new(Duration::seconds(30), 10, 100);
        assert!(dedup.admit(&event(ActivityCategory::Message, "0123456789 tail one", 0)));
        assert!(dedup.is_duplicate(&event(ActivityCategory::Message, "0123456789 tail two", 1)));
    }

    #[test]
    fn test_category_must_match() {
        let mut dedup = Deduplicator::default();
        assert!(dedup.admit(&event(ActivityCategory::Message, "hello", 0)));
        assert!(dedup.admit(&event(ActivityCategory::Incoming, "hello", 0)));
    }

    #[test]
    fn test_identical_id_is_duplicate_regardless_of_window() {
        let mut dedup = Deduplicator::new(Duration::zero(), 80, 100);
        let e = event(ActivityCategory::Cron, "Cron run: digest", 0);
        assert!(dedup.admit(&e));
        assert!(!dedup.admit(&e.clone()));
    }

    #[test]
    fn test_capacity_bounds_memory() {
        let mut dedup = Deduplicator::new(Duration::seconds(30), 80, 3);
        for i in 0..10 {
            dedup.admit(&event(ActivityCategory::Message, &format!("event {}", i), i * 100));
        }
        assert_eq!(dedup.len(), 3);
        // Evicted entries are forgotten
        assert!(!dedup.is_duplicate(&event(ActivityCategory::Message, "event 0", 0)));
    }
}
