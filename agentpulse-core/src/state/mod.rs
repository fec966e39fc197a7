//! State Builder
//!
//! Composes sessions, retained activity and latency averages into one
//! immutable [`crate::types::DashboardState`].

mod activity;
mod builder;
mod status;

pub use activity::ActivityLog;
pub use builder::{BuildInput, StateBuilder};
pub use status::{cron_status, derive_status, is_live, subagent_status, StatusThresholds};
