//! Reader → extractor → (aggregator, deduplicator) → builder
//!
//! [`Pipeline`] owns every piece of mutable pipeline state: extractor
//! cursors, the latency series and the retained activity. One call to
//! [`Pipeline::refresh`] is one tick's worth of work.

use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::error::Result;
use crate::extract::{EventExtractor, Extraction, ExtractorConfig, ExtractorState};
use crate::metrics::{MetricsAggregator, MetricsStore};
use crate::source::{self, SessionSource};
use crate::state::{ActivityLog, BuildInput, StateBuilder};
use crate::types::{ActivityEvent, DashboardState};
use chrono::{DateTime, Duration, Utc};

/// Key under which extractor cursors are persisted
pub const EXTRACTOR_STATE_KEY: &str = "extractor_state";

pub struct Pipeline {
    source: Box<dyn SessionSource>,
    extractor: EventExtractor,
    metrics: MetricsAggregator,
    activity: ActivityLog,
    builder: StateBuilder,
    tail_lines: usize,
}

impl Pipeline {
    pub fn new(config: &Config, source: Box<dyn SessionSource>) -> Self {
        let stats_window = Duration::hours(config.pipeline.stats_window_hours as i64);
        Self {
            source,
            extractor: EventExtractor::new(ExtractorConfig::from_config(config)),
            metrics: MetricsAggregator::from_config(&config.metrics),
            activity: ActivityLog::new(
                Deduplicator::from_config(&config.pipeline),
                config.pipeline.activity_limit,
                stats_window,
            ),
            builder: StateBuilder::from_config(config),
            tail_lines: config.source.tail_lines,
        }
    }

    /// Pipeline over the source selected by `config.source`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config, source::from_config(&config.source))
    }

    pub fn is_demo(&self) -> bool {
        self.source.is_demo()
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Read new transcript lines, fold them in, and build a snapshot.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> DashboardState {
        let sessions = self.source.sessions(now);

        let mut extraction = Extraction::default();
        for session in &sessions {
            let lines = self.source.tail(session, self.tail_lines, now);
            extraction.merge(self.extractor.extract(session, &lines));
        }
        let mut events: Vec<ActivityEvent> = extraction.events;
        events.extend(self.extractor.lifecycle_events(&sessions, now));

        // Sessions are visited in registry order; the series expects time order
        extraction.response_samples.sort_by_key(|s| s.timestamp);
        extraction.completion_samples.sort_by_key(|s| s.timestamp);

        let mut accepted = 0usize;
        for sample in extraction.response_samples {
            accepted += self
                .metrics
                .record_response_latency(sample.value_ms, sample.source, sample.timestamp)
                as usize;
        }
        for sample in extraction.completion_samples {
            accepted += self
                .metrics
                .record_completion_latency(sample.value_ms, sample.source, sample.timestamp)
                as usize;
        }

        let admitted = self.activity.extend(events, now);

        if extraction.lines_processed > 0 || admitted > 0 {
            tracing::debug!(
                source = self.source.name(),
                sessions = sessions.len(),
                lines = extraction.lines_processed,
                skipped = extraction.skipped_lines,
                admitted,
                samples = accepted,
                "Pipeline refreshed"
            );
        }

        self.build(&sessions, now)
    }

    /// Build from current state without reading the source.
    pub fn build(&self, sessions: &[crate::types::Session], now: DateTime<Utc>) -> DashboardState {
        self.builder.build(&BuildInput {
            sessions,
            activity: self.activity.history(),
            metrics: &self.metrics,
            pending_since: self.extractor.pending_since(),
            now,
            demo: self.source.is_demo(),
        })
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn extractor(&self) -> &EventExtractor {
        &self.extractor
    }

    /// Write latency series and extractor cursors to `store`.
    pub fn persist(&self, store: &dyn MetricsStore) -> Result<()> {
        self.metrics.persist(store)?;
        let state = serde_json::to_string(&self.extractor.state())?;
        store.store_value(EXTRACTOR_STATE_KEY, &state)?;
        Ok(())
    }

    /// Load persisted state. Anything unreadable is skipped with a warning.
    pub fn restore(&mut self, store: &dyn MetricsStore) {
        self.metrics.restore(store);

        match store.load_value(EXTRACTOR_STATE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<ExtractorState>(&raw) {
                Ok(state) => {
                    tracing::info!(sessions = state.cursors.len(), "Restored extractor cursors");
                    self.extractor.restore(state);
                }
                Err(e) => tracing::warn!(error = %e, "Discarding corrupt extractor state"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to load extractor state"),
        }
    }
}
