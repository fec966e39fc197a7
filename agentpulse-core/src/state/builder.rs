//! Dashboard snapshot composition

use super::status::{cron_status, derive_status, subagent_status, StatusThresholds};
use crate::config::Config;
use crate::metrics::MetricsAggregator;
use crate::types::{
    ActivityCategory, ActivityEvent, ActivityStatus, AssistantStatus, CronJobView, CronStatus,
    DashboardState, LatencyKind, Session, SessionKind, Stats, SubAgentStatus, SubAgentView,
};
use chrono::{DateTime, Duration, Utc};

/// Everything a build reads. Borrowed, never modified.
#[derive(Debug, Clone, Copy)]
pub struct BuildInput<'a> {
    pub sessions: &'a [Session],
    /// Retained activity, newest first
    pub activity: &'a [ActivityEvent],
    pub metrics: &'a MetricsAggregator,
    /// Newest incoming message still without a reply
    pub pending_since: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    pub demo: bool,
}

/// Builds a [`DashboardState`] as a pure function of its input.
#[derive(Debug, Clone)]
pub struct StateBuilder {
    pub thresholds: StatusThresholds,
    pub liveness: Duration,
    pub activity_limit: usize,
    pub stats_window: Duration,
    pub average_window: Duration,
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl StateBuilder {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thresholds: StatusThresholds::from_config(&config.pipeline),
            liveness: Duration::seconds(config.pipeline.liveness_secs as i64),
            activity_limit: config.pipeline.activity_limit,
            stats_window: Duration::hours(config.pipeline.stats_window_hours as i64),
            average_window: Duration::hours(config.metrics.average_window_hours as i64),
        }
    }

    pub fn build(&self, input: &BuildInput<'_>) -> DashboardState {
        let now = input.now;

        let sub_agents = self.sub_agents(input.sessions, now);
        let cron_jobs = self.cron_jobs(input.sessions, now);

        let mut activity = input.activity.to_vec();
        activity.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        activity.truncate(self.activity_limit);

        let stats = self.stats(input, &sub_agents, &cron_jobs);
        let status = self.status(input);

        DashboardState {
            status,
            sub_agents,
            cron_jobs,
            activity,
            stats,
            demo: input.demo,
        }
    }

    fn status(&self, input: &BuildInput<'_>) -> AssistantStatus {
        let primary = input
            .sessions
            .iter()
            .filter(|s| s.kind == SessionKind::Primary)
            .max_by_key(|s| s.updated_at);

        // Scheduled runs do not make the assistant busy
        let newest_event = input
            .activity
            .iter()
            .filter(|e| e.category != ActivityCategory::Cron)
            .map(|e| e.timestamp)
            .max();
        let last_activity_at = newest_event.max(primary.and_then(|s| s.updated_at));

        AssistantStatus {
            state: derive_status(last_activity_at, input.pending_since, input.now, &self.thresholds),
            last_activity_at,
            model: primary.and_then(|s| s.model.clone()),
            session: primary.map(|s| s.key.clone()),
        }
    }

    fn sub_agents(&self, sessions: &[Session], now: DateTime<Utc>) -> Vec<SubAgentView> {
        let mut views: Vec<SubAgentView> = sessions
            .iter()
            .filter(|s| s.kind == SessionKind::SubAgent)
            .map(|s| SubAgentView {
                key: s.key.clone(),
                label: s.display_name(),
                model: s.model.clone(),
                status: subagent_status(s.updated_at, now, self.liveness),
                started_at: s.created_at,
                updated_at: s.updated_at,
                runtime_ms: match (s.created_at, s.updated_at) {
                    (Some(start), Some(end)) if end >= start => Some((end - start).num_milliseconds()),
                    _ => None,
                },
            })
            .collect();
        views.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.key.cmp(&b.key)));
        views
    }

    fn cron_jobs(&self, sessions: &[Session], now: DateTime<Utc>) -> Vec<CronJobView> {
        let mut views: Vec<CronJobView> = sessions
            .iter()
            .filter(|s| s.kind == SessionKind::Scheduled)
            .map(|s| CronJobView {
                key: s.key.clone(),
                label: s.display_name(),
                model: s.model.clone(),
                status: cron_status(s.updated_at, now, self.liveness),
                last_run_at: s.updated_at,
            })
            .collect();
        views.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.key.cmp(&b.key)));
        views
    }

    fn stats(
        &self,
        input: &BuildInput<'_>,
        sub_agents: &[SubAgentView],
        cron_jobs: &[CronJobView],
    ) -> Stats {
        let cutoff = input.now - self.stats_window;
        let window: Vec<&ActivityEvent> = input
            .activity
            .iter()
            .filter(|e| e.timestamp >= cutoff && e.timestamp <= input.now)
            .collect();

        let is_task = |e: &&&ActivityEvent| {
            matches!(e.category, ActivityCategory::Task | ActivityCategory::Message)
        };

        Stats {
            tasks_today: window.iter().filter(is_task).count(),
            tasks_completed: window
                .iter()
                .filter(is_task)
                .filter(|e| matches!(e.status, ActivityStatus::Success | ActivityStatus::Completed))
                .count(),
            errors_today: window
                .iter()
                .filter(|e| e.status == ActivityStatus::Error)
                .count(),
            messages_today: window
                .iter()
                .filter(|e| e.category == ActivityCategory::Incoming)
                .count(),
            active_subagents: sub_agents
                .iter()
                .filter(|s| s.status == SubAgentStatus::Running)
                .count(),
            total_subagents: sub_agents.len(),
            active_cron_jobs: cron_jobs
                .iter()
                .filter(|c| c.status == CronStatus::Running)
                .count(),
            total_cron_jobs: cron_jobs.len(),
            avg_response_ms: input
                .metrics
                .average_response_latency(self.average_window, input.now),
            avg_completion_ms: input
                .metrics
                .average_completion_latency(self.average_window, input.now),
            response_samples: input.metrics.series(LatencyKind::Response).len(),
            completion_samples: input.metrics.series(LatencyKind::Completion).len(),
        }
    }
}
