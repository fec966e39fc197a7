//! Log Reader: session registries and transcript tails
//!
//! A [`SessionSource`] is the pipeline's only view of the external agent
//! runtime. Both operations fail soft: a missing or unreadable registry or
//! transcript yields an empty result for that cycle, never an error.
//!
//! ## Implementations
//!
//! | Source | Module | Use |
//! |--------|--------|-----|
//! | [`FsSource`] | [`fs`] | Registries and JSONL transcripts on disk |
//! | [`DemoSource`] | [`demo`] | Synthetic data when no runtime is reachable |

mod demo;
mod fs;

pub use demo::DemoSource;
pub use fs::{read_tail_lines, FsSource};

use crate::config::SourceConfig;
use crate::types::Session;
use chrono::{DateTime, TimeZone, Utc};

/// Read-only access to sessions and their transcripts.
pub trait SessionSource: Send {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Whether the backing data exists at all (e.g. the root directory).
    fn is_available(&self) -> bool;

    /// Synthetic sources make the publisher emit on every tick.
    fn is_demo(&self) -> bool {
        false
    }

    /// All sessions currently in the registry. Empty on failure.
    fn sessions(&self, now: DateTime<Utc>) -> Vec<Session>;

    /// The last `max_lines` non-empty lines of a session transcript. Empty on failure.
    fn tail(&self, session: &Session, max_lines: usize, now: DateTime<Utc>) -> Vec<String>;
}

/// Pick the source described by `config`.
///
/// Falls back to the demo source when the real root is missing and
/// `fallback_to_demo` is set.
pub fn from_config(config: &SourceConfig) -> Box<dyn SessionSource> {
    if config.demo {
        tracing::info!("Demo source enabled by configuration");
        return Box::new(DemoSource::new());
    }

    let fs = FsSource::from_config(config);
    if !fs.is_available() && config.fallback_to_demo {
        tracing::warn!(
            root = %fs.root().display(),
            "Source root not found, falling back to demo data"
        );
        return Box::new(DemoSource::new());
    }

    Box::new(fs)
}

/// Parse a timestamp that may be an RFC 3339 string, epoch milliseconds or epoch seconds.
pub fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.trim().parse::<i64>().ok().and_then(from_epoch)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_epoch),
        _ => None,
    }
}

/// Values above 10^11 are treated as milliseconds, smaller ones as seconds.
fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value <= 0 {
        return None;
    }
    if value >= 100_000_000_000 {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2026-03-01T12:00:00Z")), Some(expected));
        assert_eq!(
            parse_timestamp(&json!("2026-03-01T13:00:00+01:00")),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!(expected.timestamp())), Some(expected));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
        assert_eq!(parse_timestamp(&json!(-5)), None);
        assert_eq!(parse_timestamp(&json!({"at": 1})), None);
    }

    #[test]
    fn test_from_config_falls_back_to_demo() {
        let config = SourceConfig {
            root: Some("/definitely/not/here".into()),
            ..Default::default()
        };
        assert!(from_config(&config).is_demo());

        let strict = SourceConfig {
            root: Some("/definitely/not/here".into()),
            fallback_to_demo: false,
            ..Default::default()
        };
        let source = from_config(&strict);
        assert!(!source.is_demo());
        assert!(!source.is_available());
    }
}
