//! Database layer for agentpulse
//!
//! SQLite storage for state that must survive restarts:
//! - Latency series (response and completion)
//! - Extractor cursors, as JSON under a key
//!
//! Schema migrations are tracked with `PRAGMA user_version`.

pub mod repo;
pub mod schema;

pub use repo::Database;
