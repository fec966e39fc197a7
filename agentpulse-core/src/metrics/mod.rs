//! Metrics aggregation
//!
//! Two independent latency series are kept:
//! - **response**: incoming message to the first assistant reply
//! - **completion**: incoming message to a reply the [`CompletionPolicy`]
//!   considers final
//!
//! Both are bounded, most-recent-first and filtered at insert. Averages are
//! taken over a trailing window and are 0 when no sample qualifies.

mod policy;
mod series;
mod store;

pub use policy::CompletionPolicy;
pub use series::LatencySeries;
pub use store::MetricsStore;

use crate::config::MetricsConfig;
use crate::error::Result;
use crate::types::{LatencyKind, LatencySample};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    response: LatencySeries,
    completion: LatencySeries,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}

impl MetricsAggregator {
    pub fn new(capacity: usize, response_max_ms: i64, completion_max_ms: i64) -> Self {
        Self {
            response: LatencySeries::new(capacity, response_max_ms),
            completion: LatencySeries::new(capacity, completion_max_ms),
        }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(
            config.capacity,
            config.response_max_ms,
            config.completion_max_ms,
        )
    }

    pub fn record_response_latency(
        &mut self,
        value_ms: i64,
        source: Option<String>,
        at: DateTime<Utc>,
    ) -> bool {
        self.response.record(LatencySample {
            value_ms,
            timestamp: at,
            source,
        })
    }

    pub fn record_completion_latency(
        &mut self,
        value_ms: i64,
        source: Option<String>,
        at: DateTime<Utc>,
    ) -> bool {
        self.completion.record(LatencySample {
            value_ms,
            timestamp: at,
            source,
        })
    }

    pub fn average_response_latency(&self, window: Duration, now: DateTime<Utc>) -> i64 {
        self.response.average(window, now)
    }

    pub fn average_completion_latency(&self, window: Duration, now: DateTime<Utc>) -> i64 {
        self.completion.average(window, now)
    }

    pub fn series(&self, kind: LatencyKind) -> &LatencySeries {
        match kind {
            LatencyKind::Response => &self.response,
            LatencyKind::Completion => &self.completion,
        }
    }

    fn series_mut(&mut self, kind: LatencyKind) -> &mut LatencySeries {
        match kind {
            LatencyKind::Response => &mut self.response,
            LatencyKind::Completion => &mut self.completion,
        }
    }

    /// Write both series to `store`.
    pub fn persist(&self, store: &dyn MetricsStore) -> Result<()> {
        for kind in [LatencyKind::Response, LatencyKind::Completion] {
            store.replace_samples(kind, &self.series(kind).to_vec())?;
        }
        tracing::debug!(
            response = self.response.len(),
            completion = self.completion.len(),
            "Persisted latency series"
        );
        Ok(())
    }

    /// Merge persisted samples into the in-memory series.
    ///
    /// A series that cannot be read is left as it is; the failure is logged
    /// and the aggregator carries on empty for that series.
    pub fn restore(&mut self, store: &dyn MetricsStore) {
        for kind in [LatencyKind::Response, LatencyKind::Completion] {
            match store.load_samples(kind) {
                Ok(samples) => {
                    let loaded = samples.len();
                    self.series_mut(kind).merge(samples);
                    tracing::info!(
                        series = kind.as_str(),
                        loaded,
                        kept = self.series(kind).len(),
                        "Restored latency series"
                    );
                }
                Err(e) => {
                    tracing::warn!(series = kind.as_str(), error = %e, "Failed to restore latency series, starting empty");
                }
            }
        }
    }
}
