//! Time-decayed status and liveness rules
//!
//! Nothing here is stored between builds: every value is recomputed from
//! timestamps and the current clock.

use crate::config::PipelineConfig;
use crate::types::{CronStatus, StatusState, SubAgentStatus};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusThresholds {
    /// Activity younger than this is `active`
    pub active: Duration,
    /// Activity younger than this is `thinking`
    pub thinking: Duration,
    /// Upper bound on how long an unanswered message keeps the status `active`
    pub pending_timeout: Duration,
}

impl StatusThresholds {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            active: Duration::seconds(config.active_threshold_secs as i64),
            thinking: Duration::seconds(config.thinking_threshold_secs as i64),
            pending_timeout: Duration::seconds(config.pending_timeout_secs as i64),
        }
    }
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Elapsed time since `at`, clamped at zero for timestamps ahead of `now`.
fn age(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - at).max(Duration::zero())
}

/// idle → thinking → active as the last activity gets more recent.
pub fn derive_status(
    last_activity: Option<DateTime<Utc>>,
    pending_since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    thresholds: &StatusThresholds,
) -> StatusState {
    if pending_since.is_some_and(|since| age(since, now) < thresholds.pending_timeout) {
        return StatusState::Active;
    }
    let Some(last) = last_activity else {
        return StatusState::Idle;
    };
    let elapsed = age(last, now);
    if elapsed < thresholds.active {
        StatusState::Active
    } else if elapsed < thresholds.thinking {
        StatusState::Thinking
    } else {
        StatusState::Idle
    }
}

/// A session updated within `liveness` is still running.
pub fn is_live(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>, liveness: Duration) -> bool {
    updated_at.is_some_and(|at| age(at, now) < liveness)
}

pub fn subagent_status(
    updated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    liveness: Duration,
) -> SubAgentStatus {
    if is_live(updated_at, now, liveness) {
        SubAgentStatus::Running
    } else {
        SubAgentStatus::Completed
    }
}

pub fn cron_status(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>, liveness: Duration) -> CronStatus {
    if is_live(updated_at, now, liveness) {
        CronStatus::Running
    } else {
        CronStatus::Scheduled
    }
}
