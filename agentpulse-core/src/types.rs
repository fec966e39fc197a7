//! Core domain types for agentpulse
//!
//! These types describe what the pipeline reads (sessions and transcript
//! entries owned by the external agent runtime) and what it publishes
//! (activity events, latency samples and the dashboard snapshot).
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | A persistent conversational context tracked by the agent runtime |
//! | **Transcript** | Append-only JSONL log of turns within a session |
//! | **Sub-agent** | A session spawned to perform an isolated background task |
//! | **Cron job** | A session triggered on a recurring schedule |
//! | **Latency sample** | One measured duration between an incoming message and a reply |
//! | **Snapshot** | One immutable, complete rendering of the dashboard state |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

// ============================================
// Sessions
// ============================================

/// Kind of conversational thread, as tagged by the agent runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// The assistant's main conversation
    Primary,
    /// A direct-message or group thread with a person
    DirectMessage,
    /// A session run by the scheduler
    Scheduled,
    /// A background session spawned by another session
    SubAgent,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Primary => "primary",
            SessionKind::DirectMessage => "direct_message",
            SessionKind::Scheduled => "scheduled",
            SessionKind::SubAgent => "sub_agent",
        }
    }

    /// Infer the kind from a registry key such as `agent:main:subagent:3f2a`.
    pub fn from_key(key: &str) -> Self {
        let lower = key.to_ascii_lowercase();
        if lower.contains(":subagent:") || lower.contains(":sub-agent:") {
            SessionKind::SubAgent
        } else if lower.contains(":cron:") {
            SessionKind::Scheduled
        } else if lower.ends_with(":main") || lower == "main" {
            SessionKind::Primary
        } else {
            SessionKind::DirectMessage
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "main" => Ok(SessionKind::Primary),
            "direct_message" | "direct" | "dm" | "group" => Ok(SessionKind::DirectMessage),
            "scheduled" | "cron" => Ok(SessionKind::Scheduled),
            "sub_agent" | "subagent" | "sub-agent" => Ok(SessionKind::SubAgent),
            _ => Err(format!("unknown session kind: {}", s)),
        }
    }
}

/// A session entry from the runtime's registry. Read-only for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Registry key (e.g. `agent:main:main`)
    pub key: String,
    /// Runtime session id; also the transcript file stem
    pub session_id: String,
    pub kind: SessionKind,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Transcript JSONL file, if known
    pub transcript_path: Option<PathBuf>,
    /// Current model identifier
    pub model: Option<String>,
    /// Human label given by the runtime
    pub label: Option<String>,
}

impl Session {
    /// Label if present, otherwise the last segment of the key.
    pub fn display_name(&self) -> String {
        if let Some(label) = self.label.as_deref().filter(|l| !l.trim().is_empty()) {
            return label.trim().to_string();
        }
        self.key
            .rsplit(':')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.key)
            .to_string()
    }
}

// ============================================
// Transcript entries
// ============================================

/// Author of a transcript turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Tool results, system notes and anything else
    Other,
}

impl Role {
    pub fn parse(s: &str) -> Self {
        match s {
            "user" | "human" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other,
        }
    }
}

/// A tool invocation found in an assistant turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub input: serde_json::Value,
}

/// One decoded transcript line
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub role: Role,
    /// Concatenated `text` content
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub tool_calls: Vec<ToolCall>,
    /// Error text when the runtime flagged this turn as failed
    pub error: Option<String>,
}

// ============================================
// Activity events
// ============================================

/// What kind of thing an activity event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
    Task,
    Message,
    Subagent,
    System,
    Cron,
    Incoming,
}

impl ActivityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityCategory::Task => "task",
            ActivityCategory::Message => "message",
            ActivityCategory::Subagent => "subagent",
            ActivityCategory::System => "system",
            ActivityCategory::Cron => "cron",
            ActivityCategory::Incoming => "incoming",
        }
    }
}

impl std::fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    Error,
    Pending,
    InProgress,
    Completed,
    Running,
}

/// Where an activity came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SessionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl ActivitySource {
    /// Compact tag used on latency samples (`channel:user`, or whichever is known).
    pub fn tag(&self) -> Option<String> {
        match (&self.channel, &self.user) {
            (Some(c), Some(u)) => Some(format!("{}:{}", c, u)),
            (Some(c), None) => Some(c.clone()),
            (None, Some(u)) => Some(u.clone()),
            (None, None) => self.kind.map(|k| k.as_str().to_string()),
        }
    }
}

/// A user-facing activity record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Derived from category, description and timestamp
    pub id: String,
    pub category: ActivityCategory,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub status: ActivityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ActivitySource>,
}

impl ActivityEvent {
    /// Create an event, truncating `description` to `max_chars`.
    pub fn new(
        category: ActivityCategory,
        description: &str,
        timestamp: DateTime<Utc>,
        status: ActivityStatus,
        max_chars: usize,
    ) -> Self {
        let description = truncate_description(description, max_chars);
        let id = derive_event_id(category, &description, timestamp);
        Self {
            id,
            category,
            description,
            timestamp,
            status,
            duration_ms: None,
            source: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_source(mut self, source: ActivitySource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Stable id for an event: first 16 hex chars of SHA-256 over its content and time.
pub fn derive_event_id(
    category: ActivityCategory,
    description: &str,
    timestamp: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(category.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(description.as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.timestamp_millis().to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Collapse whitespace and cut to `max_chars` characters, marking the cut with `…`.
pub fn truncate_description(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = collapsed.chars().take(keep).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}

// ============================================
// Latency samples
// ============================================

/// Which latency series a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyKind {
    /// Incoming message to first reply
    Response,
    /// Incoming message to a substantial (final) reply
    Completion,
}

impl LatencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyKind::Response => "response",
            LatencyKind::Completion => "completion",
        }
    }
}

impl std::str::FromStr for LatencyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "response" => Ok(LatencyKind::Response),
            "completion" => Ok(LatencyKind::Completion),
            _ => Err(format!("unknown latency kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySample {
    pub value_ms: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

// ============================================
// Dashboard projections
// ============================================

/// Three-state, time-decayed assistant status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Idle,
    Thinking,
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantStatus {
    pub state: StatusState,
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Model of the primary session, if known
    pub model: Option<String>,
    /// Key of the most recently updated primary session
    pub session: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubAgentStatus {
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CronStatus {
    Running,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAgentView {
    pub key: String,
    pub label: String,
    pub model: Option<String>,
    pub status: SubAgentStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// updated_at - started_at, when both are known
    pub runtime_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobView {
    pub key: String,
    pub label: String,
    pub model: Option<String>,
    pub status: CronStatus,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Counters and averages shown in the dashboard header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Replies and tasks within the stats window
    pub tasks_today: usize,
    /// Of those, the ones that finished successfully
    pub tasks_completed: usize,
    pub errors_today: usize,
    /// Incoming messages within the stats window
    pub messages_today: usize,
    pub active_subagents: usize,
    pub total_subagents: usize,
    pub active_cron_jobs: usize,
    pub total_cron_jobs: usize,
    /// Mean response latency over the average window, 0 when no data
    pub avg_response_ms: i64,
    /// Mean completion latency over the average window, 0 when no data
    pub avg_completion_ms: i64,
    pub response_samples: usize,
    pub completion_samples: usize,
}

/// The aggregate snapshot published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub status: AssistantStatus,
    pub sub_agents: Vec<SubAgentView>,
    pub cron_jobs: Vec<CronJobView>,
    /// Most recent first, bounded
    pub activity: Vec<ActivityEvent>,
    pub stats: Stats,
    /// True when built from the synthetic demo source
    pub demo: bool,
}

/// A published state tagged with its emission sequence and sync time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub seq: u64,
    /// Epoch milliseconds; strictly increasing across emissions
    pub synced_at: i64,
    pub state: DashboardState,
}
