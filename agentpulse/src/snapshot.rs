//! agentpulse-snapshot - build one dashboard snapshot and print it as JSON
//!
//! Reads the same sources and metrics database as the server, runs a
//! single pipeline pass and writes the snapshot to stdout. The database is
//! opened read-only and never migrated, so running this next to a live
//! server is safe.

use agentpulse_core::publish::ChangeGate;
use agentpulse_core::{Config, Database, Pipeline};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agentpulse-snapshot")]
#[command(about = "Print one dashboard snapshot as JSON")]
#[command(version)]
struct Args {
    /// Config file (defaults to $XDG_CONFIG_HOME/agentpulse/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Runtime state directory, overriding the config
    #[arg(long)]
    root: Option<PathBuf>,

    /// Use synthetic demo data
    #[arg(long)]
    demo: bool,

    /// Evaluate as if the current time were this RFC 3339 instant
    #[arg(long)]
    now: Option<String>,

    /// Skip the metrics database
    #[arg(long)]
    ephemeral: bool,

    /// Pretty-print the JSON
    #[arg(short, long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    if let Some(root) = args.root {
        config.source.root = Some(root);
    }
    config.source.demo |= args.demo;

    let _log_guard =
        agentpulse_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let now: DateTime<Utc> = match &args.now {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("invalid --now timestamp {:?}", raw))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let mut pipeline = Pipeline::from_config(&config);

    if !args.ephemeral {
        let db_path = Config::database_path();
        if db_path.exists() {
            let db = Database::open_read_only(&db_path).context("failed to open database")?;
            if db.is_current().context("failed to read database schema version")? {
                pipeline.restore(&db);
            } else {
                tracing::info!(path = %db_path.display(), "Metrics database not migrated yet, skipping restore");
            }
        } else {
            tracing::info!(path = %db_path.display(), "No metrics database yet");
        }
    }

    let state = pipeline.refresh(now);
    let snapshot = ChangeGate::new(true).stamp(state, now.timestamp_millis());

    let json = if args.pretty {
        serde_json::to_string_pretty(&snapshot)
    } else {
        serde_json::to_string(&snapshot)
    }
    .context("failed to serialize snapshot")?;
    println!("{}", json);

    Ok(())
}
