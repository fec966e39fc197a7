//! Retained activity history

use crate::dedup::Deduplicator;
use crate::types::ActivityEvent;
use chrono::{DateTime, Duration, Utc};

/// Activity events kept between builds, newest first.
///
/// New events pass through the [`Deduplicator`] before joining. The log
/// keeps enough history for the stats window, and never fewer than `limit`
/// events so the snapshot list stays full.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    dedup: Deduplicator,
    events: Vec<ActivityEvent>,
    limit: usize,
    history_capacity: usize,
    history_window: Duration,
}

impl ActivityLog {
    pub fn new(dedup: Deduplicator, limit: usize, history_window: Duration) -> Self {
        Self {
            dedup,
            events: Vec::new(),
            limit: limit.max(1),
            history_capacity: (limit * 20).max(1),
            history_window,
        }
    }

    /// Admit `candidates`, returning how many were new.
    pub fn extend(&mut self, candidates: Vec<ActivityEvent>, now: DateTime<Utc>) -> usize {
        let mut admitted = 0;
        for event in candidates {
            if self.dedup.admit(&event) {
                self.events.push(event);
                admitted += 1;
            }
        }

        self.events
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        let cutoff = now - self.history_window;
        let keep_at_least = self.limit.min(self.events.len());
        let in_window = self
            .events
            .iter()
            .take_while(|e| e.timestamp >= cutoff)
            .count();
        self.events
            .truncate(in_window.max(keep_at_least).min(self.history_capacity));

        admitted
    }

    /// Everything retained, newest first.
    pub fn history(&self) -> &[ActivityEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityCategory, ActivityStatus};
    use chrono::TimeZone;

    fn event(text: &str, secs: i64) -> ActivityEvent {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        ActivityEvent::new(
            ActivityCategory::Message,
            text,
            base + Duration::seconds(secs),
            ActivityStatus::Success,
            200,
        )
    }

    fn log(limit: usize) -> ActivityLog {
        ActivityLog::new(
            Deduplicator::new(Duration::seconds(30), 80, 1000),
            limit,
            Duration::hours(24),
        )
    }

    #[test]
    fn test_union_sorted_descending_and_bounded() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap();
        let mut log = log(3);
        log.extend(vec![event("a", 10), event("b", 30)], now);
        log.extend(vec![event("c", 20), event("d", 40), event("e", 5)], now);

        let newest: Vec<&str> = log.history()[..3].iter().map(|e| e.description.as_str()).collect();
        assert_eq!(newest, vec!["d", "b", "c"]);
        // Older in-window events stay for stats
        assert_eq!(log.history().len(), 5);
    }

    #[test]
    fn test_overlapping_batches_are_deduplicated() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap();
        let mut log = log(10);
        assert_eq!(log.extend(vec![event("same", 0)], now), 1);
        assert_eq!(log.extend(vec![event("same", 0), event("same", 3)], now), 0);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_history_pruned_to_window_but_keeps_recent() {
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();
        let mut log = log(2);
        log.extend(vec![event("old1", 0), event("old2", 60), event("old3", 120)], now);
        // Everything is days old: only the display list survives
        assert_eq!(log.len(), 2);
        assert_eq!(log.history()[0].description, "old3");
    }
}
