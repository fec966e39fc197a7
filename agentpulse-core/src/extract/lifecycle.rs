//! Sub-agent and cron lifecycle events
//!
//! The runtime never announces that a sub-agent finished or that a cron job
//! ran; both are inferred from registry timestamps. The tracker remembers
//! what it already reported so each transition is emitted once.

use crate::types::{ActivityCategory, ActivityEvent, ActivitySource, ActivityStatus, Session, SessionKind};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct LifecycleTracker {
    started: HashSet<String>,
    finished: HashSet<String>,
    cron_runs: HashMap<String, DateTime<Utc>>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `sessions` against what was seen before and emit transition events.
    pub fn observe(
        &mut self,
        sessions: &[Session],
        now: DateTime<Utc>,
        liveness: Duration,
        max_chars: usize,
    ) -> Vec<ActivityEvent> {
        let mut events = Vec::new();

        for session in sessions {
            match session.kind {
                SessionKind::SubAgent => {
                    self.observe_subagent(session, now, liveness, max_chars, &mut events)
                }
                SessionKind::Scheduled => self.observe_cron(session, max_chars, &mut events),
                _ => {}
            }
        }

        events
    }

    fn observe_subagent(
        &mut self,
        session: &Session,
        now: DateTime<Utc>,
        liveness: Duration,
        max_chars: usize,
        events: &mut Vec<ActivityEvent>,
    ) {
        let name = session.display_name();
        let source = ActivitySource {
            kind: Some(SessionKind::SubAgent),
            session: Some(session.key.clone()),
            ..Default::default()
        };

        if self.started.insert(session.key.clone()) {
            let at = session.created_at.or(session.updated_at).unwrap_or(now);
            events.push(
                ActivityEvent::new(
                    ActivityCategory::Subagent,
                    &format!("Sub-agent started: {}", name),
                    at,
                    ActivityStatus::Running,
                    max_chars,
                )
                .with_source(source.clone()),
            );
        }

        let Some(updated) = session.updated_at else {
            return;
        };
        if now - updated < liveness || self.finished.contains(&session.key) {
            return;
        }
        self.finished.insert(session.key.clone());

        let mut event = ActivityEvent::new(
            ActivityCategory::Subagent,
            &format!("Sub-agent finished: {}", name),
            updated,
            ActivityStatus::Completed,
            max_chars,
        )
        .with_source(source);
        if let Some(created) = session.created_at {
            let runtime = (updated - created).num_milliseconds();
            if runtime > 0 {
                event = event.with_duration(runtime);
            }
        }
        events.push(event);
    }

    fn observe_cron(&mut self, session: &Session, max_chars: usize, events: &mut Vec<ActivityEvent>) {
        let Some(updated) = session.updated_at else {
            return;
        };
        let advanced = self
            .cron_runs
            .get(&session.key)
            .map_or(true, |previous| updated > *previous);
        if !advanced {
            return;
        }
        self.cron_runs.insert(session.key.clone(), updated);

        events.push(
            ActivityEvent::new(
                ActivityCategory::Cron,
                &format!("Cron run: {}", session.display_name()),
                updated,
                ActivityStatus::Success,
                max_chars,
            )
            .with_source(ActivitySource {
                kind: Some(SessionKind::Scheduled),
                session: Some(session.key.clone()),
                ..Default::default()
            }),
        );
    }

    /// Last run time seen per cron session, for persistence.
    pub fn cron_runs(&self) -> &HashMap<String, DateTime<Utc>> {
        &self.cron_runs
    }

    pub fn restore_cron_runs(&mut self, runs: HashMap<String, DateTime<Utc>>) {
        for (key, at) in runs {
            let entry = self.cron_runs.entry(key).or_insert(at);
            if at > *entry {
                *entry = at;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(key: &str, kind: SessionKind, created: i64, updated: i64) -> Session {
        Session {
            key: key.to_string(),
            session_id: key.to_string(),
            kind,
            created_at: Some(Utc.timestamp_opt(created, 0).unwrap()),
            updated_at: Some(Utc.timestamp_opt(updated, 0).unwrap()),
            transcript_path: None,
            model: None,
            label: Some("research".to_string()),
        }
    }

    #[test]
    fn test_subagent_start_then_finish_once() {
        let mut tracker = LifecycleTracker::new();
        let liveness = Duration::seconds(120);
        let sub = session("agent:main:subagent:1", SessionKind::SubAgent, 1_000, 1_090);

        let now = Utc.timestamp_opt(1_100, 0).unwrap();
        let events = tracker.observe(&[sub.clone()], now, liveness, 200);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].description, "Sub-agent started: research");
        assert_eq!(events[0].status, ActivityStatus::Running);

        let later = Utc.timestamp_opt(1_300, 0).unwrap();
        let events = tracker.observe(&[sub.clone()], later, liveness, 200);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].description, "Sub-agent finished: research");
        assert_eq!(events[0].status, ActivityStatus::Completed);
        assert_eq!(events[0].duration_ms, Some(90_000));

        assert!(tracker.observe(&[sub], later, liveness, 200).is_empty());
    }

    #[test]
    fn test_cron_run_emitted_per_advance() {
        let mut tracker = LifecycleTracker::new();
        let now = Utc.timestamp_opt(5_000, 0).unwrap();
        let liveness = Duration::seconds(120);

        let first = session("agent:main:cron:digest", SessionKind::Scheduled, 0, 1_000);
        assert_eq!(tracker.observe(&[first.clone()], now, liveness, 200).len(), 1);
        assert!(tracker.observe(&[first], now, liveness, 200).is_empty());

        let second = session("agent:main:cron:digest", SessionKind::Scheduled, 0, 1_600);
        let events = tracker.observe(&[second], now, liveness, 200);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, ActivityCategory::Cron);
        assert_eq!(events[0].status, ActivityStatus::Success);
    }

    #[test]
    fn test_restored_cron_runs_suppress_replay() {
        let mut tracker = LifecycleTracker::new();
        let run = Utc.timestamp_opt(1_000, 0).unwrap();
        tracker.restore_cron_runs(HashMap::from([("agent:main:cron:digest".to_string(), run)]));

        let cron = session("agent:main:cron:digest", SessionKind::Scheduled, 0, 1_000);
        let events = tracker.observe(&[cron], run, Duration::seconds(120), 200);
        assert!(events.is_empty());
    }
}
