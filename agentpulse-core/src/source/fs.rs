//! Filesystem session source
//!
//! Reads session registries (`sessions.json`, discovered with a glob under
//! the runtime root) and tails per-session JSONL transcripts.
//!
//! # Registry format
//!
//! A registry is a JSON object mapping session key to entry. Entry fields
//! are accepted in camelCase or snake_case; every field is optional:
//!
//! ```json
//! {
//!   "agent:main:main": {
//!     "sessionId": "0b6c...",
//!     "updatedAt": 1767225600000,
//!     "model": "claude-opus-4-5",
//!     "sessionFile": "0b6c....jsonl"
//!   }
//! }
//! ```
//!
//! Entries that fail to deserialize are skipped with a warning.

use super::{parse_timestamp, SessionSource};
use crate::config::SourceConfig;
use crate::types::{Session, SessionKind};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

const TAIL_CHUNK: u64 = 8 * 1024;
/// Upper bound on bytes scanned backwards per tail read
const TAIL_MAX_BYTES: u64 = 4 * 1024 * 1024;

/// Session source backed by the agent runtime's state directory.
pub struct FsSource {
    root: PathBuf,
    registry_glob: String,
    read_retries: u32,
    retry_delay: Duration,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRegistryEntry {
    #[serde(alias = "sessionId")]
    session_id: Option<String>,
    kind: Option<String>,
    #[serde(alias = "createdAt")]
    created_at: Option<serde_json::Value>,
    #[serde(alias = "updatedAt")]
    updated_at: Option<serde_json::Value>,
    model: Option<String>,
    label: Option<String>,
    #[serde(alias = "sessionFile", alias = "transcriptPath", alias = "transcript_path")]
    session_file: Option<String>,
}

impl FsSource {
    pub fn new(root: PathBuf) -> Self {
        let defaults = SourceConfig::default();
        Self {
            root,
            registry_glob: defaults.registry_glob,
            read_retries: defaults.read_retries,
            retry_delay: Duration::from_millis(defaults.retry_delay_ms),
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            root: config.resolved_root(),
            registry_glob: config.registry_glob.clone(),
            read_retries: config.read_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registry files matching the configured glob.
    pub fn discover_registries(&self) -> Vec<PathBuf> {
        let pattern = self.root.join(&self.registry_glob);
        let pattern_str = pattern.to_string_lossy();

        match glob::glob(&pattern_str) {
            Ok(entries) => entries.flatten().collect(),
            Err(e) => {
                tracing::warn!(pattern = %pattern_str, error = %e, "Invalid registry glob");
                vec![]
            }
        }
    }

    /// Parse one registry file. Malformed entries are skipped.
    pub fn load_registry(&self, path: &Path) -> Vec<Session> {
        let Some(content) = self.read_with_retries(path, || std::fs::read_to_string(path)) else {
            return vec![];
        };

        let raw: HashMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable session registry");
                return vec![];
            }
        };

        let registry_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut sessions = Vec::with_capacity(raw.len());

        for (key, value) in raw {
            let entry: RawRegistryEntry = match serde_json::from_value(value) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping malformed registry entry");
                    continue;
                }
            };
            sessions.push(entry_to_session(key, entry, registry_dir));
        }

        sessions
    }

    /// Run a read, retrying transient failures. Missing files return `None` immediately.
    fn read_with_retries<T>(&self, path: &Path, op: impl Fn() -> io::Result<T>) -> Option<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Some(value),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "File not found");
                    return None;
                }
                Err(e) if attempt < self.read_retries => {
                    attempt += 1;
                    tracing::debug!(path = %path.display(), attempt, error = %e, "Retrying read");
                    std::thread::sleep(self.retry_delay);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Read failed");
                    return None;
                }
            }
        }
    }
}

fn entry_to_session(key: String, entry: RawRegistryEntry, registry_dir: &Path) -> Session {
    let kind = entry
        .kind
        .as_deref()
        .and_then(|k| k.parse::<SessionKind>().ok())
        .unwrap_or_else(|| SessionKind::from_key(&key));

    let session_id = entry
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| key.rsplit(':').next().unwrap_or(&key).to_string());

    let transcript_path = match entry.session_file {
        Some(file) => {
            let file = PathBuf::from(file);
            if file.is_absolute() {
                file
            } else {
                registry_dir.join(file)
            }
        }
        None => registry_dir.join(format!("{}.jsonl", session_id)),
    };

    Session {
        key,
        session_id,
        kind,
        created_at: entry.created_at.as_ref().and_then(parse_timestamp),
        updated_at: entry.updated_at.as_ref().and_then(parse_timestamp),
        transcript_path: Some(transcript_path),
        model: entry.model,
        label: entry.label,
    }
}

impl SessionSource for FsSource {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn sessions(&self, _now: DateTime<Utc>) -> Vec<Session> {
        let mut by_key: HashMap<String, Session> = HashMap::new();

        for registry in self.discover_registries() {
            for session in self.load_registry(&registry) {
                // Same key in two registries: keep the fresher one
                match by_key.get(&session.key) {
                    Some(existing) if existing.updated_at >= session.updated_at => {}
                    _ => {
                        by_key.insert(session.key.clone(), session);
                    }
                }
            }
        }

        let mut sessions: Vec<Session> = by_key.into_values().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.key.cmp(&b.key)));
        sessions
    }

    fn tail(&self, session: &Session, max_lines: usize, _now: DateTime<Utc>) -> Vec<String> {
        let Some(path) = session.transcript_path.as_deref() else {
            return vec![];
        };
        self.read_with_retries(path, || read_tail_lines(path, max_lines))
            .unwrap_or_default()
    }
}

/// Read the last `max_lines` non-empty lines of a file by scanning backwards.
///
/// At most [`TAIL_MAX_BYTES`] are scanned; when the scan stops mid-file the
/// first (partial) line is dropped. Invalid UTF-8 is replaced, not rejected.
pub fn read_tail_lines(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    if max_lines == 0 {
        return Ok(vec![]);
    }

    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    let mut start = len;
    let mut buf: Vec<u8> = Vec::new();
    let mut newlines = 0usize;

    while start > 0 && newlines <= max_lines && len - start < TAIL_MAX_BYTES {
        let step = TAIL_CHUNK.min(start);
        start -= step;
        file.seek(SeekFrom::Start(start))?;

        let mut chunk = vec![0u8; step as usize];
        file.read_exact(&mut chunk)?;
        newlines += chunk.iter().filter(|&&b| b == b'\n').count();

        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.lines();
    if start > 0 {
        lines.next();
    }

    let lines: Vec<&str> = lines.filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(max_lines);
    Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
}
