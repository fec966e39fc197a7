//! Synthetic session source
//!
//! Produces a small, clock-driven set of sessions and transcript lines so the
//! dashboard has something live to show when no agent runtime is reachable.
//! Output is a pure function of `now`: the same instant always yields the
//! same lines, so re-reads behave like tailing a real append-only file.

use super::SessionSource;
use crate::types::{Session, SessionKind};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

/// Seconds between synthetic exchanges on the main session
const EXCHANGE_PERIOD: i64 = 30;
/// Sub-agents are spawned once per cycle and run for `SUBAGENT_RUNTIME`
const SUBAGENT_CYCLE: i64 = 300;
const SUBAGENT_RUNTIME: i64 = 90;
/// Cron job period
const CRON_PERIOD: i64 = 600;

const PROMPTS: &[(&str, &str, &str)] = &[
    ("Telegram", "Ana", "Can you summarise the open pull requests?"),
    ("Slack", "Ben", "What's on my calendar tomorrow?"),
    ("Telegram", "Ana", "Draft a reply to the landlord about the heating"),
    ("Discord", "Chidi", "Check whether the nightly build passed"),
    ("Slack", "Ben", "Remind me to call the dentist on Friday"),
];

const REPLIES: &[&str] = &[
    "There are three open pull requests. Two are waiting on review and one has failing checks in the integration suite; I left a note on the failing one with the stack trace and a suggested fix.",
    "Tomorrow you have a standup at 9:30, lunch with Dana at 12:00 and the quarterly planning session from 14:00 to 16:00.",
    "Here's a draft: the heating has been intermittent since Monday, could you arrange for someone to take a look this week? I'm home most afternoons.",
    "The nightly build passed. All 412 tests green, artifact published at 03:12.",
    "Done, reminder set for Friday at 10:00.",
];

/// Clock-driven synthetic data source.
#[derive(Debug, Default)]
pub struct DemoSource;

impl DemoSource {
    pub fn new() -> Self {
        Self
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
    }

    fn main_lines(now: DateTime<Utc>, max_lines: usize) -> Vec<String> {
        let now_secs = now.timestamp();
        let current_slot = now_secs.div_euclid(EXCHANGE_PERIOD);
        let first_slot = current_slot - (max_lines as i64 / 2 + 1);
        let mut lines = Vec::new();

        for slot in first_slot..=current_slot {
            let idx = slot.rem_euclid(PROMPTS.len() as i64) as usize;
            let (channel, user, prompt) = PROMPTS[idx];
            let asked_at = slot * EXCHANGE_PERIOD;
            // Reply delay varies between 2 and 13 seconds
            let replied_at = asked_at + 2 + slot.rem_euclid(12);

            if asked_at <= now_secs {
                lines.push(
                    json!({
                        "type": "message",
                        "timestamp": Self::at(asked_at).to_rfc3339(),
                        "message": {
                            "role": "user",
                            "content": [{
                                "type": "text",
                                "text": format!("[{} {} id:{}] {}", channel, user, 1000 + idx, prompt)
                            }]
                        }
                    })
                    .to_string(),
                );
            }
            if replied_at <= now_secs {
                lines.push(
                    json!({
                        "type": "message",
                        "timestamp": Self::at(replied_at).to_rfc3339(),
                        "message": {
                            "role": "assistant",
                            "content": [{"type": "text", "text": REPLIES[idx]}]
                        }
                    })
                    .to_string(),
                );
            }
        }

        let skip = lines.len().saturating_sub(max_lines);
        lines.split_off(skip)
    }

    fn subagent_lines(now: DateTime<Utc>) -> Vec<String> {
        let cycle_start = now.timestamp().div_euclid(SUBAGENT_CYCLE) * SUBAGENT_CYCLE;
        let mut lines = vec![json!({
            "role": "user",
            "timestamp": Self::at(cycle_start).to_rfc3339(),
            "content": "Collect release notes for the last sprint"
        })
        .to_string()];

        let done_at = cycle_start + SUBAGENT_RUNTIME;
        if done_at <= now.timestamp() {
            lines.push(
                json!({
                    "role": "assistant",
                    "timestamp": Self::at(done_at).to_rfc3339(),
                    "content": "Release notes collected: 14 merged changes across 3 repositories."
                })
                .to_string(),
            );
        }
        lines
    }
}

impl SessionSource for DemoSource {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn is_demo(&self) -> bool {
        true
    }

    fn sessions(&self, now: DateTime<Utc>) -> Vec<Session> {
        let now_secs = now.timestamp();
        let last_exchange = now_secs.div_euclid(EXCHANGE_PERIOD) * EXCHANGE_PERIOD;
        let cycle_start = now_secs.div_euclid(SUBAGENT_CYCLE) * SUBAGENT_CYCLE;
        let last_cron = now_secs.div_euclid(CRON_PERIOD) * CRON_PERIOD;

        vec![
            Session {
                key: "agent:main:main".to_string(),
                session_id: "demo-main".to_string(),
                kind: SessionKind::Primary,
                created_at: Some(now - Duration::hours(6)),
                updated_at: Some(Self::at(last_exchange)),
                transcript_path: None,
                model: Some("claude-opus-4-5".to_string()),
                label: None,
            },
            Session {
                key: format!("agent:main:subagent:{}", cycle_start),
                session_id: format!("demo-sub-{}", cycle_start),
                kind: SessionKind::SubAgent,
                created_at: Some(Self::at(cycle_start)),
                updated_at: Some(Self::at((cycle_start + SUBAGENT_RUNTIME).min(now_secs))),
                transcript_path: None,
                model: Some("claude-sonnet-4-5".to_string()),
                label: Some("release-notes".to_string()),
            },
            Session {
                key: "agent:main:cron:daily-digest".to_string(),
                session_id: "demo-cron".to_string(),
                kind: SessionKind::Scheduled,
                created_at: Some(now - Duration::days(3)),
                updated_at: Some(Self::at(last_cron)),
                transcript_path: None,
                model: Some("claude-haiku-4-5".to_string()),
                label: Some("daily-digest".to_string()),
            },
        ]
    }

    fn tail(&self, session: &Session, max_lines: usize, now: DateTime<Utc>) -> Vec<String> {
        match session.kind {
            SessionKind::Primary => Self::main_lines(now, max_lines),
            SessionKind::SubAgent => Self::subagent_lines(now),
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_is_deterministic() {
        let source = DemoSource::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 40).unwrap();
        let sessions = source.sessions(now);
        assert_eq!(sessions.len(), 3);

        let main = &sessions[0];
        assert_eq!(source.tail(main, 20, now), source.tail(main, 20, now));
    }

    #[test]
    fn test_demo_lines_never_from_the_future() {
        let source = DemoSource::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 1).unwrap();
        let main = source.sessions(now).remove(0);

        for line in source.tail(&main, 20, now) {
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            let ts = crate::source::parse_timestamp(&value["timestamp"]).unwrap();
            assert!(ts <= now);
        }
    }

    #[test]
    fn test_demo_respects_max_lines() {
        let source = DemoSource::new();
        let now = Utc::now();
        let main = source.sessions(now).remove(0);
        assert!(source.tail(&main, 4, now).len() <= 4);
    }
}
