//! Bounded latency series

use crate::types::LatencySample;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// A most-recent-first ring of latency samples with an acceptance window.
///
/// Samples outside `(0, max_ms]` are parsing artifacts and are dropped at
/// insert. When full, inserting evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct LatencySeries {
    samples: VecDeque<LatencySample>,
    capacity: usize,
    max_ms: i64,
}

impl LatencySeries {
    pub fn new(capacity: usize, max_ms: i64) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            max_ms,
        }
    }

    pub fn accepts(&self, value_ms: i64) -> bool {
        value_ms > 0 && value_ms <= self.max_ms
    }

    /// Insert a sample, returning false when it was rejected.
    pub fn record(&mut self, sample: LatencySample) -> bool {
        if !self.accepts(sample.value_ms) {
            tracing::trace!(value_ms = sample.value_ms, "Rejected out-of-range latency");
            return false;
        }
        self.samples.push_front(sample);
        self.samples.truncate(self.capacity);
        true
    }

    /// Mean of samples whose timestamp lies within `window` of `now`; 0 when none do.
    pub fn average(&self, window: Duration, now: DateTime<Utc>) -> i64 {
        let cutoff = now - window;
        let (sum, count) = self
            .samples
            .iter()
            .filter(|s| s.timestamp >= cutoff && s.timestamp <= now)
            .fold((0i64, 0i64), |(sum, count), s| (sum + s.value_ms, count + 1));
        if count == 0 {
            0
        } else {
            sum / count
        }
    }

    /// Merge `persisted` with the current samples, keeping the newest `capacity`.
    pub fn merge(&mut self, persisted: Vec<LatencySample>) {
        let mut all: Vec<LatencySample> = self.samples.drain(..).chain(persisted).collect();
        all.retain(|s| s.value_ms > 0 && s.value_ms <= self.max_ms);
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all.dedup();
        all.truncate(self.capacity);
        self.samples = all.into();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &LatencySample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<LatencySample> {
        self.samples.iter().cloned().collect()
    }
}
