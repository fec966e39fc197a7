//! Repository over the metrics database

use crate::error::{Error, Result};
use crate::metrics::MetricsStore;
use crate::types::{LatencyKind, LatencySample};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Database handle (single connection)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an existing database without write access.
    ///
    /// No directories are created and no migrations can run; check
    /// [`Database::is_current`] before reading.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.conn.lock().unwrap();
        super::schema::get_schema_version(&conn)
    }

    /// Whether every migration has been applied.
    pub fn is_current(&self) -> Result<bool> {
        Ok(self.schema_version()? >= super::schema::SCHEMA_VERSION)
    }

    // ============================================
    // Latency samples
    // ============================================

    /// Samples in one series, newest first
    pub fn latency_samples(&self, kind: LatencyKind) -> Result<Vec<LatencySample>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT value_ms, ts, source FROM latency_samples
             WHERE series = ?1
             ORDER BY ts DESC, id DESC",
        )?;

        let rows = stmt.query_map([kind.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut samples = Vec::new();
        for row in rows {
            let (value_ms, ts, source) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .map_err(|e| Error::Parse {
                    source_name: "latency_samples".to_string(),
                    message: format!("bad timestamp {:?}: {}", ts, e),
                })?
                .with_timezone(&Utc);
            samples.push(LatencySample {
                value_ms,
                timestamp,
                source,
            });
        }
        Ok(samples)
    }

    /// Replace one series atomically
    pub fn replace_latency_samples(&self, kind: LatencyKind, samples: &[LatencySample]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM latency_samples WHERE series = ?1", [kind.as_str()])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO latency_samples (series, value_ms, ts, source) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for sample in samples {
                stmt.execute(params![
                    kind.as_str(),
                    sample.value_ms,
                    sample.timestamp.to_rfc3339(),
                    sample.source,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ============================================
    // Key/value state
    // ============================================

    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM kv_state WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl MetricsStore for Database {
    fn load_samples(&self, kind: LatencyKind) -> Result<Vec<LatencySample>> {
        self.latency_samples(kind)
    }

    fn replace_samples(&self, kind: LatencyKind, samples: &[LatencySample]) -> Result<()> {
        self.replace_latency_samples(kind, samples)
    }

    fn load_value(&self, key: &str) -> Result<Option<String>> {
        self.get_state(key)
    }

    fn store_value(&self, key: &str, value: &str) -> Result<()> {
        self.set_state(key, value)
    }
}
