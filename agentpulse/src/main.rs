//! agentpulse - live dashboard feed for an AI assistant
//!
//! Serves the dashboard snapshot over HTTP:
//! - `GET /health`      liveness and subscriber count
//! - `GET /api/state`   latest snapshot (built on demand if none yet)
//! - `GET /api/stream`  server-sent events: initial sync, then each change
//! - `GET /ws`          WebSocket with the same semantics as `/api/stream`
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/agentpulse/metrics.db
//! - Logs: $XDG_STATE_HOME/agentpulse/
//! - Config: $XDG_CONFIG_HOME/agentpulse/config.toml

use agentpulse_core::{Config, Database, Pipeline, Publisher, Snapshot};
use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "agentpulse")]
#[command(about = "Serve a live dashboard feed for AI assistant sessions")]
#[command(version)]
struct Args {
    /// Config file (defaults to $XDG_CONFIG_HOME/agentpulse/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config
    #[arg(long)]
    addr: Option<String>,

    /// Runtime state directory, overriding the config
    #[arg(long)]
    root: Option<PathBuf>,

    /// Serve synthetic demo data
    #[arg(long)]
    demo: bool,
}

#[derive(Clone)]
struct AppState {
    publisher: Publisher,
}

struct ApiError(agentpulse_core::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(root) = args.root {
        config.source.root = Some(root);
    }
    config.source.demo |= args.demo;

    let _log_guard =
        agentpulse_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("agentpulse starting");

    let addr: SocketAddr = config
        .server
        .addr
        .parse()
        .with_context(|| format!("invalid listen address {:?}", config.server.addr))?;

    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;
    let store = Arc::new(db);

    let mut pipeline = Pipeline::from_config(&config);
    pipeline.restore(store.as_ref());
    tracing::info!(source = pipeline.source_name(), demo = pipeline.is_demo(), "Pipeline ready");

    let publisher = Publisher::new(pipeline, &config.pipeline);
    let persist_task = spawn_persistence(
        publisher.clone(),
        Arc::clone(&store),
        Duration::from_secs(config.metrics.persist_interval_secs.max(1)),
    );

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/state", get(current_state))
        .route("/api/stream", get(stream_state))
        .route("/ws", get(ws_handler))
        .with_state(AppState {
            publisher: publisher.clone(),
        });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    println!("agentpulse listening on http://{}", addr);
    println!("Logs: {}", agentpulse_core::logging::log_file_path().display());
    tracing::info!(%addr, "Listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown requested");
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    persist_task.abort();
    publisher.shutdown();
    match publisher.persist(store).await {
        Ok(()) => tracing::info!("Metrics persisted on shutdown"),
        Err(e) => tracing::warn!(error = %e, "Failed to persist metrics on shutdown"),
    }

    tracing::info!("agentpulse stopped");
    Ok(())
}

/// Write pipeline state to the database every `period`.
fn spawn_persistence(
    publisher: Publisher,
    store: Arc<Database>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // First tick fires immediately; nothing new to save yet
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = publisher.persist(store.clone()).await {
                tracing::warn!(error = %e, "Failed to persist metrics");
            }
        }
    })
}

async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "subscribers": app.publisher.subscriber_count(),
        "ticking": app.publisher.is_ticking(),
    }))
}

async fn current_state(State(app): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    let snapshot = app.publisher.current().await.map_err(ApiError)?;
    Ok(Json(snapshot.as_ref().clone()))
}

async fn stream_state(
    State(app): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = app.publisher.subscribe().await.map_err(ApiError)?;

    let stream = futures_util::stream::unfold(subscription, |mut sub| async move {
        let snapshot = sub.next().await?;
        let event = Event::default()
            .event("snapshot")
            .id(snapshot.seq.to_string())
            .json_data(snapshot.as_ref())
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        Some((Ok(event), sub))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app.publisher))
}

async fn handle_socket(mut socket: WebSocket, publisher: Publisher) {
    let mut subscription = match publisher.subscribe().await {
        Ok(sub) => sub,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to subscribe WebSocket client");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            snapshot = subscription.next() => {
                let Some(snapshot) = snapshot else { break };
                let text = match serde_json::to_string(snapshot.as_ref()) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to serialize snapshot");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    // Clients have nothing to say; pings are answered by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!(subscriber = %subscription.id(), "WebSocket closed");
}
