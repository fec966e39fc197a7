//! # agentpulse-core
//!
//! Core library for agentpulse - a live dashboard for an AI assistant's
//! sessions, sub-agents, scheduled jobs and activity.
//!
//! This library provides:
//! - Readers for the agent runtime's session registries and transcripts
//! - Event extraction, latency metrics and deduplication
//! - Snapshot building and a change-gated broadcast publisher
//! - SQLite persistence, configuration and logging
//!
//! ## Architecture
//!
//! Data flows one way:
//!
//! ```text
//! source ─▶ extract ─▶ metrics / dedup ─▶ state ─▶ publish ─▶ subscribers
//! ```
//!
//! [`Pipeline`] owns every mutable piece and performs one pass per tick;
//! [`Publisher`] drives it and fans snapshots out.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentpulse_core::{Config, Database, Pipeline};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let mut pipeline = Pipeline::from_config(&config);
//! pipeline.restore(&db);
//! let state = pipeline.refresh(chrono::Utc::now());
//! println!("{}", serde_json::to_string_pretty(&state).unwrap());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use publish::{Publisher, Subscription};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod publish;
pub mod source;
pub mod state;
pub mod types;
