//! Persistence seam for the latency series and extractor state

use crate::error::Result;
use crate::types::{LatencyKind, LatencySample};

/// Durable storage for metrics state.
///
/// Implemented by [`crate::db::Database`]; tests may supply their own.
pub trait MetricsStore: Send + Sync {
    /// Samples for one series, in any order.
    fn load_samples(&self, kind: LatencyKind) -> Result<Vec<LatencySample>>;

    /// Replace the stored samples for one series.
    fn replace_samples(&self, kind: LatencyKind, samples: &[LatencySample]) -> Result<()>;

    /// Free-form state keyed by name (extractor cursors, cron run times).
    fn load_value(&self, key: &str) -> Result<Option<String>>;

    fn store_value(&self, key: &str, value: &str) -> Result<()>;
}
