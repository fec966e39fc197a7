//! Event Extractor: transcript lines to activity events and latency samples
//!
//! Each session has a [`SessionCursor`] holding the newest timestamp seen on
//! earlier passes. Lines at or before the cursor are skipped, so re-reading
//! an overlapping tail never reports the same latency twice.
//!
//! Per pass, for lines newer than the cursor:
//!
//! 1. A user turn becomes the session's pending message. When one of the
//!    [`IncomingMatcher`]s recognises it, an `incoming` event is emitted.
//! 2. The first assistant turn after a pending message yields a response
//!    latency sample. A reply with text resolves the pending message with a
//!    `message` event (a `task` event for sub-agent and cron sessions) and,
//!    when the [`CompletionPolicy`] deems it final, a completion sample.
//!    Suppressed replies (`NO_REPLY`, `HEARTBEAT_OK`) resolve it silently.
//!    Tool-only turns leave it pending. Latency samples come only from
//!    primary and direct-message sessions.
//! 3. Spawn tool calls emit `subagent` events.
//!
//! Only the most recent pending message is tracked. A run of user turns
//! with no reply in between is measured from the last one.

mod lifecycle;
mod matchers;
mod transcript;

pub use lifecycle::LifecycleTracker;
pub use matchers::{
    clean_text, default_matchers, is_noise, match_incoming, BracketedSourceMatcher,
    IncomingMatcher, IncomingMessage, PlainTextMatcher, SystemEnvelopeMatcher,
};
pub use transcript::decode_line;

use crate::config::Config;
use crate::metrics::CompletionPolicy;
use crate::types::{
    ActivityCategory, ActivityEvent, ActivitySource, ActivityStatus, LatencySample, Role,
    Session, SessionKind, TranscriptEntry,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tool names that start a sub-agent
const SPAWN_TOOLS: &[&str] = &["sessions_spawn", "Task"];

/// Extractor tuning
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub description_max_chars: usize,
    /// Shorter incoming text is treated as noise
    pub min_incoming_chars: usize,
    /// Shorter reply text produces no message event
    pub min_reply_chars: usize,
    pub liveness: Duration,
    pub completion: CompletionPolicy,
    /// Replies that mean "nothing to say"
    pub suppression_markers: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ExtractorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            description_max_chars: config.pipeline.description_max_chars,
            min_incoming_chars: 2,
            min_reply_chars: 3,
            liveness: Duration::seconds(config.pipeline.liveness_secs as i64),
            completion: CompletionPolicy::from_config(&config.metrics),
            suppression_markers: vec!["NO_REPLY".to_string(), "HEARTBEAT_OK".to_string()],
        }
    }

    fn is_suppressed(&self, reply: &str) -> bool {
        let reply = reply.trim();
        self.suppression_markers
            .iter()
            .any(|marker| reply.starts_with(marker.as_str()))
    }
}

/// An incoming message still waiting for its reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingIncoming {
    pub since: DateTime<Utc>,
    pub source: ActivitySource,
    /// A first reply (and so a response sample) has already been seen
    pub responded: bool,
}

/// Per-session resume point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCursor {
    pub high_water: Option<DateTime<Utc>>,
    pub pending: Option<PendingIncoming>,
}

/// Everything one pass over a transcript produced
#[derive(Debug, Default, Clone)]
pub struct Extraction {
    pub events: Vec<ActivityEvent>,
    pub response_samples: Vec<LatencySample>,
    pub completion_samples: Vec<LatencySample>,
    /// Lines that could not be decoded
    pub skipped_lines: usize,
    /// Lines newer than the cursor
    pub lines_processed: usize,
}

impl Extraction {
    pub fn merge(&mut self, other: Extraction) {
        self.events.extend(other.events);
        self.response_samples.extend(other.response_samples);
        self.completion_samples.extend(other.completion_samples);
        self.skipped_lines += other.skipped_lines;
        self.lines_processed += other.lines_processed;
    }
}

/// Extractor state that survives restarts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractorState {
    pub cursors: HashMap<String, SessionCursor>,
    #[serde(default)]
    pub cron_runs: HashMap<String, DateTime<Utc>>,
}

pub struct EventExtractor {
    config: ExtractorConfig,
    matchers: Vec<Box<dyn IncomingMatcher>>,
    cursors: HashMap<String, SessionCursor>,
    lifecycle: LifecycleTracker,
}

impl EventExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self::with_matchers(config, default_matchers())
    }

    /// Use a custom matcher order; the first match wins.
    pub fn with_matchers(config: ExtractorConfig, matchers: Vec<Box<dyn IncomingMatcher>>) -> Self {
        Self {
            config,
            matchers,
            cursors: HashMap::new(),
            lifecycle: LifecycleTracker::new(),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Process transcript `lines` (oldest first) for `session`.
    pub fn extract(&mut self, session: &Session, lines: &[String]) -> Extraction {
        let Self {
            config,
            matchers,
            cursors,
            ..
        } = self;
        let cursor = cursors.entry(session.key.clone()).or_default();
        let resume_after = cursor.high_water;
        let mut out = Extraction::default();
        let mut newest = resume_after;

        for (idx, line) in lines.iter().enumerate() {
            let entry = match decode_line(line) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(reason) => {
                    out.skipped_lines += 1;
                    tracing::debug!(session = %session.key, line = idx, reason = %reason, "Skipping transcript line");
                    continue;
                }
            };

            if resume_after.is_some_and(|hw| entry.timestamp <= hw) {
                continue;
            }
            out.lines_processed += 1;
            newest = newest.max(Some(entry.timestamp));

            match entry.role {
                Role::User => on_user_turn(config, matchers, session, cursor, &entry, &mut out),
                Role::Assistant => on_assistant_turn(config, session, cursor, &entry, &mut out),
                Role::Other => {}
            }
        }

        cursor.high_water = newest;

        if out.lines_processed > 0 {
            tracing::debug!(
                session = %session.key,
                processed = out.lines_processed,
                events = out.events.len(),
                skipped = out.skipped_lines,
                "Extracted transcript tail"
            );
        }
        out
    }

    /// Sub-agent start/finish and cron-run events inferred from the registry.
    pub fn lifecycle_events(&mut self, sessions: &[Session], now: DateTime<Utc>) -> Vec<ActivityEvent> {
        self.lifecycle.observe(
            sessions,
            now,
            self.config.liveness,
            self.config.description_max_chars,
        )
    }

    pub fn cursor(&self, session_key: &str) -> Option<&SessionCursor> {
        self.cursors.get(session_key)
    }

    /// Arrival time of the newest incoming message that has had no reply yet.
    pub fn pending_since(&self) -> Option<DateTime<Utc>> {
        self.cursors
            .values()
            .filter_map(|c| c.pending.as_ref())
            .filter(|p| !p.responded)
            .map(|p| p.since)
            .max()
    }

    pub fn state(&self) -> ExtractorState {
        ExtractorState {
            cursors: self.cursors.clone(),
            cron_runs: self.lifecycle.cron_runs().clone(),
        }
    }

    /// Merge persisted state; a cursor only ever moves forward.
    pub fn restore(&mut self, state: ExtractorState) {
        for (key, restored) in state.cursors {
            let cursor = self.cursors.entry(key).or_default();
            if restored.high_water > cursor.high_water {
                *cursor = restored;
            }
        }
        self.lifecycle.restore_cron_runs(state.cron_runs);
    }
}

fn on_user_turn(
    config: &ExtractorConfig,
    matchers: &[Box<dyn IncomingMatcher>],
    session: &Session,
    cursor: &mut SessionCursor,
    entry: &TranscriptEntry,
    out: &mut Extraction,
) {
    let mut source = ActivitySource {
        kind: Some(session.kind),
        session: Some(session.key.clone()),
        ..Default::default()
    };

    let incoming = match session.kind {
        SessionKind::Primary | SessionKind::DirectMessage => {
            match_incoming(matchers, &entry.text, config.min_incoming_chars)
        }
        // Prompts from the parent session or the scheduler, not from a person
        SessionKind::SubAgent | SessionKind::Scheduled => None,
    };

    let person_facing = matches!(session.kind, SessionKind::Primary | SessionKind::DirectMessage);
    if person_facing && incoming.is_none() {
        // Heartbeat polls and other noise are not awaiting a person's reply
        cursor.pending = None;
        return;
    }

    if let Some(msg) = incoming {
        source.channel = msg.channel.as_ref().map(|c| c.to_lowercase());
        source.user = msg.sender.clone();
        out.events.push(
            ActivityEvent::new(
                ActivityCategory::Incoming,
                &msg.describe(),
                entry.timestamp,
                ActivityStatus::Completed,
                config.description_max_chars,
            )
            .with_source(source.clone()),
        );
    }

    cursor.pending = Some(PendingIncoming {
        since: entry.timestamp,
        source,
        responded: false,
    });
}

fn on_assistant_turn(
    config: &ExtractorConfig,
    session: &Session,
    cursor: &mut SessionCursor,
    entry: &TranscriptEntry,
    out: &mut Extraction,
) {
    let max_chars = config.description_max_chars;
    let session_source = ActivitySource {
        kind: Some(session.kind),
        session: Some(session.key.clone()),
        ..Default::default()
    };

    for call in entry
        .tool_calls
        .iter()
        .filter(|c| SPAWN_TOOLS.contains(&c.name.as_str()))
    {
        out.events.push(
            ActivityEvent::new(
                ActivityCategory::Subagent,
                &format!("Spawned sub-agent: {}", spawn_label(&call.input)),
                entry.timestamp,
                ActivityStatus::Running,
                max_chars,
            )
            .with_source(session_source.clone()),
        );
    }

    let status = if entry.error.is_some() {
        ActivityStatus::Error
    } else {
        ActivityStatus::Success
    };
    let category = match session.kind {
        SessionKind::SubAgent | SessionKind::Scheduled => ActivityCategory::Task,
        SessionKind::Primary | SessionKind::DirectMessage => ActivityCategory::Message,
    };
    let reply = clean_text(&entry.text);
    let suppressed = config.is_suppressed(&reply);
    let has_reply = !suppressed && reply.chars().count() >= config.min_reply_chars;
    let description = if has_reply {
        reply.clone()
    } else {
        entry
            .error
            .as_ref()
            .map(|e| format!("Error: {}", e))
            .unwrap_or_default()
    };

    let Some(pending) = cursor.pending.as_mut() else {
        if has_reply || entry.error.is_some() {
            out.events.push(
                ActivityEvent::new(category, &description, entry.timestamp, status, max_chars)
                    .with_source(session_source),
            );
        }
        return;
    };

    let elapsed_ms = (entry.timestamp - pending.since).num_milliseconds();
    let tag = pending.source.tag();
    // Latency is only measured for messages from people
    let measured = matches!(session.kind, SessionKind::Primary | SessionKind::DirectMessage);
    if measured && !pending.responded && elapsed_ms > 0 {
        out.response_samples.push(LatencySample {
            value_ms: elapsed_ms,
            timestamp: entry.timestamp,
            source: tag.clone(),
        });
    }
    pending.responded = true;

    if suppressed {
        cursor.pending = None;
        return;
    }
    if !has_reply && entry.error.is_none() {
        // Tool-only turn; the real reply is still to come
        return;
    }

    if measured
        && has_reply
        && entry.error.is_none()
        && elapsed_ms > 0
        && config.completion.is_final(&reply)
    {
        out.completion_samples.push(LatencySample {
            value_ms: elapsed_ms,
            timestamp: entry.timestamp,
            source: tag,
        });
    }

    let mut event = ActivityEvent::new(category, &description, entry.timestamp, status, max_chars)
        .with_source(pending.source.clone());
    if elapsed_ms > 0 {
        event = event.with_duration(elapsed_ms);
    }
    out.events.push(event);
    cursor.pending = None;
}

/// Best human name for a spawn call's target.
fn spawn_label(input: &serde_json::Value) -> String {
    ["label", "description", "task", "prompt"]
        .iter()
        .find_map(|field| input.get(field).and_then(|v| v.as_str()))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("sub-agent")
        .to_string()
}
