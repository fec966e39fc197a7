//! Change-Gated Publisher
//!
//! A tick loop rebuilds the dashboard state every `tick` and broadcasts it
//! only when it changed (always, in demo mode). The loop exists only while
//! someone is subscribed: the first subscriber starts it and it stops a
//! grace period after the last one leaves. New subscribers get the latest
//! snapshot immediately.
//!
//! Builds run on the blocking pool behind a mutex, so a slow build delays
//! the next tick instead of overlapping it.

mod gate;
mod scheduler;

pub use gate::ChangeGate;
pub use scheduler::{SchedulerState, TickAction, TickScheduler};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::metrics::MetricsStore;
use crate::pipeline::Pipeline;
use crate::types::Snapshot;
use chrono::Utc;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Buffered snapshots per subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 16;

struct Inner {
    pipeline: Arc<Mutex<Pipeline>>,
    gate: Mutex<ChangeGate>,
    latest: RwLock<Option<Arc<Snapshot>>>,
    tx: broadcast::Sender<Arc<Snapshot>>,
    scheduler: Mutex<TickScheduler>,
    tick_loop: Mutex<Option<JoinHandle<()>>>,
    tick: Duration,
    grace: Duration,
}

/// Cheap to clone; all clones share one pipeline and one tick loop.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<Inner>,
}

impl Publisher {
    pub fn new(pipeline: Pipeline, config: &PipelineConfig) -> Self {
        let demo = pipeline.is_demo();
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                pipeline: Arc::new(Mutex::new(pipeline)),
                gate: Mutex::new(ChangeGate::new(demo)),
                latest: RwLock::new(None),
                tx,
                scheduler: Mutex::new(TickScheduler::new()),
                tick_loop: Mutex::new(None),
                tick: config.tick_interval(),
                grace: config.grace(),
            }),
        }
    }

    /// Run one tick: build, gate, and broadcast if the gate lets it through.
    pub async fn tick(&self) -> Result<Option<Arc<Snapshot>>> {
        let pipeline = Arc::clone(&self.inner.pipeline);
        let state = tokio::task::spawn_blocking(move || {
            let mut pipeline = pipeline.lock().unwrap();
            pipeline.refresh(Utc::now())
        })
        .await
        .map_err(|e| Error::Publish(format!("build task failed: {}", e)))?;

        let snapshot = {
            let mut gate = self.inner.gate.lock().unwrap();
            gate.offer(state, Utc::now().timestamp_millis())?
        };
        let Some(snapshot) = snapshot else {
            tracing::trace!("Snapshot unchanged, not broadcasting");
            return Ok(None);
        };

        let snapshot = Arc::new(snapshot);
        *self.inner.latest.write().unwrap() = Some(Arc::clone(&snapshot));
        // No receivers is fine; the snapshot is still kept as latest
        let receivers = self.inner.tx.send(Arc::clone(&snapshot)).unwrap_or(0);
        tracing::debug!(seq = snapshot.seq, receivers, "Broadcast snapshot");
        Ok(Some(snapshot))
    }

    /// The current snapshot.
    ///
    /// While the tick loop runs, `latest` is at most one tick old and is
    /// returned as is. Otherwise nothing keeps it fresh, so a build runs
    /// first.
    pub async fn current(&self) -> Result<Arc<Snapshot>> {
        if self.is_ticking() {
            if let Some(latest) = self.latest() {
                return Ok(latest);
            }
        }
        if let Some(snapshot) = self.tick().await? {
            return Ok(snapshot);
        }
        // Unchanged since the last publish, or a concurrent tick got there first
        self.latest()
            .ok_or_else(|| Error::Publish("no snapshot available".to_string()))
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.inner.latest.read().unwrap().clone()
    }

    /// Join the broadcast. The returned subscription carries the initial
    /// snapshot; dropping it leaves.
    pub async fn subscribe(&self) -> Result<Subscription> {
        // Receiver first so nothing published after `initial` is missed
        let rx = self.inner.tx.subscribe();
        let initial = self.current().await?;

        let id = Uuid::new_v4();
        let action = self.inner.scheduler.lock().unwrap().on_subscribe();
        self.apply(action);
        tracing::info!(subscriber = %id, subscribers = self.subscriber_count(), "Subscriber joined");

        Ok(Subscription {
            id,
            last_seq: initial.seq,
            initial: Some(initial),
            rx,
            _guard: SubscriberGuard {
                publisher: Arc::downgrade(&self.inner),
                id,
            },
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.scheduler.lock().unwrap().subscribers()
    }

    /// Whether the tick loop task is alive.
    pub fn is_ticking(&self) -> bool {
        self.inner
            .tick_loop
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Persist pipeline state to `store` on the blocking pool.
    pub async fn persist(&self, store: Arc<dyn MetricsStore>) -> Result<()> {
        let pipeline = Arc::clone(&self.inner.pipeline);
        tokio::task::spawn_blocking(move || {
            let pipeline = pipeline.lock().unwrap();
            pipeline.persist(store.as_ref())
        })
        .await
        .map_err(|e| Error::Publish(format!("persist task failed: {}", e)))?
    }

    /// Stop the tick loop regardless of subscribers.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.tick_loop.lock().unwrap().take() {
            handle.abort();
            tracing::info!("Tick loop stopped for shutdown");
        }
    }

    fn apply(&self, action: TickAction) {
        Inner::apply(&self.inner, action);
    }
}

impl Inner {
    fn apply(this: &Arc<Inner>, action: TickAction) {
        match action {
            TickAction::None => {}
            TickAction::StartLoop => Self::start_loop(this),
            TickAction::ArmGraceTimer(generation) => {
                let weak = Arc::downgrade(this);
                let grace = this.grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Some(inner) = weak.upgrade() {
                        let action = inner.scheduler.lock().unwrap().on_grace_elapsed(generation);
                        Inner::apply(&inner, action);
                    }
                });
            }
            TickAction::StopLoop => {
                if let Some(handle) = this.tick_loop.lock().unwrap().take() {
                    handle.abort();
                    tracing::info!("No subscribers, tick loop stopped");
                }
            }
        }
    }

    fn start_loop(this: &Arc<Inner>) {
        let weak: Weak<Inner> = Arc::downgrade(this);
        let period = this.tick;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let publisher = Publisher { inner };
                if let Err(e) = publisher.tick().await {
                    tracing::warn!(error = %e, "Tick failed");
                }
            }
        });

        let mut slot = this.tick_loop.lock().unwrap();
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
        tracing::info!(tick_ms = period.as_millis() as u64, "Tick loop started");
    }
}

/// Leaves the subscriber set when dropped.
struct SubscriberGuard {
    publisher: Weak<Inner>,
    id: Uuid,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let Some(inner) = self.publisher.upgrade() else {
            return;
        };
        let action = inner.scheduler.lock().unwrap().on_unsubscribe();
        tracing::info!(subscriber = %self.id, "Subscriber left");
        // Grace timers need a runtime; outside one, stop immediately
        if tokio::runtime::Handle::try_current().is_ok() {
            Inner::apply(&inner, action);
        } else if let TickAction::ArmGraceTimer(generation) = action {
            let action = inner.scheduler.lock().unwrap().on_grace_elapsed(generation);
            if action == TickAction::StopLoop {
                if let Some(handle) = inner.tick_loop.lock().unwrap().take() {
                    handle.abort();
                }
            }
        }
    }
}

/// One subscriber's view of the broadcast.
pub struct Subscription {
    id: Uuid,
    initial: Option<Arc<Snapshot>>,
    last_seq: u64,
    rx: broadcast::Receiver<Arc<Snapshot>>,
    _guard: SubscriberGuard,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next snapshot: the initial sync first, then each newer broadcast.
    ///
    /// Snapshots not newer than the last one returned are skipped, and a
    /// lagging receiver resumes at the newest buffered snapshot. Returns
    /// `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) if snapshot.seq > self.last_seq => {
                    self.last_seq = snapshot.seq;
                    return Some(snapshot);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(subscriber = %self.id, skipped, "Subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::source::{DemoSource, SessionSource};
    use crate::types::Session;
    use chrono::{DateTime, TimeZone};

    struct QuietSource;

    impl SessionSource for QuietSource {
        fn name(&self) -> &'static str {
            "quiet"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn sessions(&self, _now: DateTime<Utc>) -> Vec<Session> {
            vec![]
        }

        fn tail(&self, _session: &Session, _max: usize, _now: DateTime<Utc>) -> Vec<String> {
            vec![]
        }
    }

    /// One sub-agent whose label the test can change.
    struct RelabelSource {
        label: Arc<Mutex<String>>,
    }

    impl SessionSource for RelabelSource {
        fn name(&self) -> &'static str {
            "relabel"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn sessions(&self, _now: DateTime<Utc>) -> Vec<Session> {
            let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
            vec![Session {
                key: "agent:main:subagent:1".to_string(),
                session_id: "sub-1".to_string(),
                kind: crate::types::SessionKind::SubAgent,
                created_at: Some(at),
                updated_at: Some(at),
                transcript_path: None,
                model: None,
                label: Some(self.label.lock().unwrap().clone()),
            }]
        }

        fn tail(&self, _session: &Session, _max: usize, _now: DateTime<Utc>) -> Vec<String> {
            vec![]
        }
    }

    fn publisher(source: Box<dyn SessionSource>, tick_ms: u64, grace_ms: u64) -> Publisher {
        let mut config = Config::default();
        config.pipeline.tick_ms = tick_ms;
        config.pipeline.grace_ms = grace_ms;
        Publisher::new(Pipeline::new(&config, source), &config.pipeline)
    }

    #[tokio::test]
    async fn test_unchanged_state_broadcasts_once() {
        let publisher = publisher(Box::new(QuietSource), 1_000, 1_000);
        assert!(publisher.tick().await.unwrap().is_some());
        assert!(publisher.tick().await.unwrap().is_none());
        assert!(publisher.tick().await.unwrap().is_none());
        assert_eq!(publisher.latest().unwrap().seq, 1);
    }

    #[tokio::test]
    async fn test_demo_source_always_broadcasts() {
        let publisher = publisher(Box::new(DemoSource::new()), 1_000, 1_000);
        let a = publisher.tick().await.unwrap().unwrap();
        let b = publisher.tick().await.unwrap().unwrap();
        assert!(b.seq > a.seq);
        assert!(b.synced_at > a.synced_at);
    }

    #[tokio::test]
    async fn test_subscribe_gets_initial_sync_and_starts_loop() {
        let publisher = publisher(Box::new(QuietSource), 60_000, 1_000);
        assert!(!publisher.is_ticking());

        let mut sub = publisher.subscribe().await.unwrap();
        let initial = sub.next().await.unwrap();
        assert_eq!(initial.seq, 1);
        assert_eq!(publisher.subscriber_count(), 1);
        assert!(publisher.is_ticking());

        let second = publisher.subscribe().await.unwrap();
        assert_eq!(publisher.subscriber_count(), 2);
        drop(second);
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_current_rebuilds_without_subscribers() {
        let label = Arc::new(Mutex::new("v1".to_string()));
        let source = RelabelSource {
            label: Arc::clone(&label),
        };
        let publisher = publisher(Box::new(source), 60_000, 1_000);

        let first = publisher.current().await.unwrap();
        assert_eq!(first.state.sub_agents[0].label, "v1");

        *label.lock().unwrap() = "v2".to_string();
        let second = publisher.current().await.unwrap();
        assert!(!publisher.is_ticking());
        assert_eq!(second.state.sub_agents[0].label, "v2");
        assert!(second.seq > first.seq);

        // Nothing changed: the pull returns the same snapshot, not a new seq
        let third = publisher.current().await.unwrap();
        assert_eq!(third.seq, second.seq);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_after_grace() {
        let publisher = publisher(Box::new(QuietSource), 500, 2_000);
        let sub = publisher.subscribe().await.unwrap();
        assert!(publisher.is_ticking());

        drop(sub);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(publisher.is_ticking(), "loop survives within the grace period");

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(!publisher.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_receive_broadcasts() {
        let publisher = publisher(Box::new(DemoSource::new()), 500, 2_000);
        let mut sub = publisher.subscribe().await.unwrap();
        let initial = sub.next().await.unwrap();
        let next = sub.next().await.unwrap();
        assert!(next.seq > initial.seq);
    }
}
