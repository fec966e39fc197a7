//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/agentpulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/agentpulse/` (~/.config/agentpulse/)
//! - Data: `$XDG_DATA_HOME/agentpulse/` (~/.local/share/agentpulse/)
//! - State/Logs: `$XDG_STATE_HOME/agentpulse/` (~/.local/state/agentpulse/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Where session registries and transcripts are read from
    #[serde(default)]
    pub source: SourceConfig,

    /// Tick, dedup, status and liveness tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Latency series tuning
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Delivery server
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session log source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Root of the agent runtime's state directory (defaults to ~/.openclaw)
    pub root: Option<PathBuf>,

    /// Glob, relative to `root`, matching session registry files
    #[serde(default = "default_registry_glob")]
    pub registry_glob: String,

    /// Number of trailing transcript lines read per session per tick
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,

    /// Extra attempts for a failed (non-missing) file read
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,

    /// Delay between read attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Always use the synthetic demo source
    #[serde(default)]
    pub demo: bool,

    /// Use the demo source when `root` does not exist
    #[serde(default = "default_true")]
    pub fallback_to_demo: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: None,
            registry_glob: default_registry_glob(),
            tail_lines: default_tail_lines(),
            read_retries: default_read_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            demo: false,
            fallback_to_demo: true,
        }
    }
}

impl SourceConfig {
    /// Resolved source root: the configured path, or `~/.openclaw`.
    pub fn resolved_root(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| home_dir().join(".openclaw"))
    }
}

fn default_registry_glob() -> String {
    "agents/*/sessions/sessions.json".to_string()
}

fn default_tail_lines() -> usize {
    100
}

fn default_read_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    25
}

fn default_true() -> bool {
    true
}

/// Pipeline tuning
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Publisher tick interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Delay after the last subscriber leaves before the tick loop stops
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Maximum number of activity events in a snapshot
    #[serde(default = "default_activity_limit")]
    pub activity_limit: usize,

    /// Events with the same normalized text closer than this are duplicates
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Number of characters of the normalized description compared by dedup
    #[serde(default = "default_dedup_prefix_chars")]
    pub dedup_prefix_chars: usize,

    /// Maximum length of an activity description
    #[serde(default = "default_description_max_chars")]
    pub description_max_chars: usize,

    /// Activity younger than this makes the assistant `active`
    #[serde(default = "default_active_threshold_secs")]
    pub active_threshold_secs: u64,

    /// Activity younger than this makes the assistant `thinking`
    #[serde(default = "default_thinking_threshold_secs")]
    pub thinking_threshold_secs: u64,

    /// An unanswered incoming message keeps the assistant `active` for at most this long
    #[serde(default = "default_pending_timeout_secs")]
    pub pending_timeout_secs: u64,

    /// Sub-agent/cron sessions updated more recently than this are `running`
    #[serde(default = "default_liveness_secs")]
    pub liveness_secs: u64,

    /// Window used for the "today" style counters in the stats block
    #[serde(default = "default_stats_window_hours")]
    pub stats_window_hours: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            grace_ms: default_grace_ms(),
            activity_limit: default_activity_limit(),
            dedup_window_secs: default_dedup_window_secs(),
            dedup_prefix_chars: default_dedup_prefix_chars(),
            description_max_chars: default_description_max_chars(),
            active_threshold_secs: default_active_threshold_secs(),
            thinking_threshold_secs: default_thinking_threshold_secs(),
            pending_timeout_secs: default_pending_timeout_secs(),
            liveness_secs: default_liveness_secs(),
            stats_window_hours: default_stats_window_hours(),
        }
    }
}

impl PipelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

fn default_tick_ms() -> u64 {
    2000
}

fn default_grace_ms() -> u64 {
    5000
}

fn default_activity_limit() -> usize {
    50
}

fn default_dedup_window_secs() -> u64 {
    30
}

fn default_dedup_prefix_chars() -> usize {
    80
}

fn default_description_max_chars() -> usize {
    200
}

fn default_active_threshold_secs() -> u64 {
    10
}

fn default_thinking_threshold_secs() -> u64 {
    60
}

fn default_pending_timeout_secs() -> u64 {
    300
}

fn default_liveness_secs() -> u64 {
    120
}

fn default_stats_window_hours() -> u64 {
    24
}

/// Latency series configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    /// Samples kept per series
    #[serde(default = "default_metrics_capacity")]
    pub capacity: usize,

    /// Largest accepted response latency in milliseconds
    #[serde(default = "default_response_max_ms")]
    pub response_max_ms: i64,

    /// Largest accepted completion latency in milliseconds
    #[serde(default = "default_completion_max_ms")]
    pub completion_max_ms: i64,

    /// Trailing window for the averages shown in the stats block
    #[serde(default = "default_average_window_hours")]
    pub average_window_hours: u64,

    /// How often the series are written to the database
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,

    /// Replies at least this long count as a completed task
    #[serde(default = "default_completion_min_chars")]
    pub completion_min_chars: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            capacity: default_metrics_capacity(),
            response_max_ms: default_response_max_ms(),
            completion_max_ms: default_completion_max_ms(),
            average_window_hours: default_average_window_hours(),
            persist_interval_secs: default_persist_interval_secs(),
            completion_min_chars: default_completion_min_chars(),
        }
    }
}

fn default_metrics_capacity() -> usize {
    300
}

fn default_response_max_ms() -> i64 {
    5 * 60 * 1000
}

fn default_completion_max_ms() -> i64 {
    10 * 60 * 1000
}

fn default_average_window_hours() -> u64 {
    24
}

fn default_persist_interval_secs() -> u64 {
    60
}

fn default_completion_min_chars() -> usize {
    200
}

/// Delivery server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

fn default_addr() -> String {
    "127.0.0.1:3790".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.tick_ms == 0 {
            return Err(Error::Config(
                "pipeline.tick_ms must be greater than 0".to_string(),
            ));
        }
        if self.pipeline.activity_limit == 0 {
            return Err(Error::Config(
                "pipeline.activity_limit must be greater than 0".to_string(),
            ));
        }
        if self.pipeline.thinking_threshold_secs < self.pipeline.active_threshold_secs {
            return Err(Error::Config(
                "pipeline.thinking_threshold_secs must be >= active_threshold_secs".to_string(),
            ));
        }
        if self.source.tail_lines == 0 {
            return Err(Error::Config(
                "source.tail_lines must be greater than 0".to_string(),
            ));
        }
        if self.metrics.capacity == 0 {
            return Err(Error::Config(
                "metrics.capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/agentpulse/config.toml` (~/.config/agentpulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("agentpulse").join("config.toml")
    }

    /// Returns the data directory path (for the metrics database)
    ///
    /// `$XDG_DATA_HOME/agentpulse/` (~/.local/share/agentpulse/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("agentpulse")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/agentpulse/` (~/.local/state/agentpulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("agentpulse")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/agentpulse/metrics.db` (~/.local/share/agentpulse/metrics.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("metrics.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/agentpulse/agentpulse.log` (~/.local/state/agentpulse/agentpulse.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("agentpulse.log")
    }
}
