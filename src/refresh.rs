use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, RefreshConfig};
use crate::enrich::enrich_batch;
use crate::fallback::fallback_matches;
use crate::provider::{FixtureSource, FixtureWindow};
use crate::state::{EnrichedMatch, Fixture};
use crate::stats::StatsSource;
use crate::store::{MatchStore, Snapshot, order_by_confidence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    ServingStored,
    Refreshing,
    ServingFallback,
}

/// Where the data handed to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    #[serde(rename = "stored")]
    Stored,
    #[serde(rename = "api")]
    Provider,
    #[serde(rename = "fallback")]
    Fallback,
    #[serde(rename = "emergency-fallback")]
    EmergencyFallback,
}

impl DataSource {
    pub fn is_fallback(self) -> bool {
        matches!(self, DataSource::Fallback | DataSource::EmergencyFallback)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub source: DataSource,
    pub phase: Phase,
    /// Whether a refresh cycle ran (false when stored data was still fresh).
    pub refreshed: bool,
    pub matches: usize,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedMeta {
    pub used_fallback_data: bool,
    pub data_source: DataSource,
    pub last_updated: Option<DateTime<Utc>>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchFeed {
    pub matches: Vec<EnrichedMatch>,
    pub meta: FeedMeta,
}

/// Drives fetch → enrich → persist, degrading to stored or synthesized data
/// on failure. At most one cycle runs at a time; callers that arrive while a
/// cycle is in flight receive that cycle's report. After a failed cycle,
/// non-forced refreshes wait one `interval` before reaching the provider
/// again.
pub struct Orchestrator {
    source: Arc<dyn FixtureSource>,
    stats: Arc<dyn StatsSource>,
    store: Arc<MatchStore>,
    cfg: RefreshConfig,
    engine: EngineConfig,
    cycle: tokio::sync::Mutex<()>,
    completed_cycles: AtomicU64,
    last_report: Mutex<Option<RefreshReport>>,
    last_failure: Mutex<Option<DateTime<Utc>>>,
    phase: Mutex<Phase>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn FixtureSource>,
        stats: Arc<dyn StatsSource>,
        store: Arc<MatchStore>,
        cfg: RefreshConfig,
        engine: EngineConfig,
    ) -> Self {
        Self {
            source,
            stats,
            store,
            cfg,
            engine,
            cycle: tokio::sync::Mutex::new(()),
            completed_cycles: AtomicU64::new(0),
            last_report: Mutex::new(None),
            last_failure: Mutex::new(None),
            phase: Mutex::new(Phase::ServingStored),
        }
    }

    pub fn store(&self) -> &Arc<MatchStore> {
        &self.store
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn last_report(&self) -> Option<RefreshReport> {
        self.last_report.lock().clone()
    }

    /// Current stored snapshot; never waits on a running cycle.
    pub fn read(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    /// True when the store is empty or stale and no failed cycle is still
    /// inside its retry window.
    pub fn needs_refresh(&self) -> bool {
        (self.store.is_empty() || self.store.is_stale(self.cfg.interval))
            && !self.backing_off(Utc::now())
    }

    /// Runs a cycle when forced or when the store is empty or stale.
    /// Never fails: every failure is folded into the report.
    pub async fn refresh(&self, force: bool) -> RefreshReport {
        // Read before the freshness check so a cycle finishing in between is
        // seen as a completed cycle below.
        let seen = self.completed_cycles.load(Ordering::Acquire);
        if !force && !self.needs_refresh() {
            return self.skipped_report();
        }

        let _cycle = self.cycle.lock().await;
        if self.completed_cycles.load(Ordering::Acquire) != seen
            && let Some(report) = self.last_report()
        {
            info!(source = ?report.source, "joined in-flight refresh");
            return report;
        }
        if !force && !self.needs_refresh() {
            return self.skipped_report();
        }

        let report = match AssertUnwindSafe(self.run_cycle(force)).catch_unwind().await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => self.emergency(format!("{err:#}")),
            Err(panic) => self.emergency(panic_message(panic.as_ref())),
        };

        *self.last_failure.lock() = report.error.as_ref().map(|_| report.finished_at);
        *self.last_report.lock() = Some(report.clone());
        self.completed_cycles.fetch_add(1, Ordering::AcqRel);
        report
    }

    /// Refresh if needed, then read, filter by league and attach metadata.
    /// The returned list is never empty.
    pub async fn feed(&self, force: bool, league: Option<&str>) -> MatchFeed {
        let report = self.refresh(force).await;
        let snapshot = self.read();

        let mut source = report.source;
        let mut error = report.error;
        // Synthesized sets are not persisted and carry no timestamp.
        let last_updated = snapshot.last_updated;
        let matches = if snapshot.is_empty() {
            if !source.is_fallback() {
                source = DataSource::EmergencyFallback;
                error.get_or_insert_with(|| "store is empty".to_string());
            }
            order_by_confidence(fallback_matches(Utc::now(), &self.engine))
        } else {
            snapshot.matches.clone()
        };

        let matches: Vec<EnrichedMatch> = match league {
            Some(league) => matches
                .into_iter()
                .filter(|m| m.matches_league(league))
                .collect(),
            None => matches,
        };

        MatchFeed {
            meta: FeedMeta {
                used_fallback_data: source.is_fallback(),
                data_source: source,
                last_updated,
                count: matches.len(),
                error,
            },
            matches,
        }
    }

    async fn run_cycle(&self, force: bool) -> Result<RefreshReport> {
        self.set_phase(Phase::Refreshing);
        if force {
            self.source.clear_cache();
        }

        let window = FixtureWindow::lookahead(Utc::now(), self.cfg.lookahead_days);
        info!(force, from = %window.from, to = %window.to, "refresh cycle started");

        let mut fixtures = match self.fetch(window).await {
            Ok(fixtures) => fixtures,
            Err(reason) => return self.fall_back(reason),
        };
        fixtures.truncate(self.cfg.max_matches);

        let matches = match self.enrich(fixtures).await {
            Ok(matches) => matches,
            Err(reason) => return self.fall_back(reason),
        };

        let snapshot = self
            .store
            .save_all(matches)
            .context("persist refreshed matches")?;
        self.set_phase(Phase::ServingStored);
        info!(matches = snapshot.matches.len(), "refresh cycle stored provider data");
        Ok(self.report(DataSource::Provider, true, None))
    }

    async fn fetch(&self, window: FixtureWindow) -> Result<Vec<Fixture>, String> {
        match timeout(self.cfg.fetch_timeout, self.source.fetch_fixtures(window)).await {
            Ok(Ok(fixtures)) if fixtures.is_empty() => {
                Err("provider returned no fixtures".to_string())
            }
            Ok(Ok(fixtures)) => Ok(fixtures),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "provider fetch timed out after {}s",
                self.cfg.fetch_timeout.as_secs_f64()
            )),
        }
    }

    async fn enrich(&self, fixtures: Vec<Fixture>) -> Result<Vec<EnrichedMatch>, String> {
        let stats = Arc::clone(&self.stats);
        let engine = self.engine;
        let now = Utc::now();
        tokio::task::spawn_blocking(move || enrich_batch(&fixtures, stats.as_ref(), now, &engine))
            .await
            .map_err(|err| {
                if err.is_panic() {
                    format!("enrichment panicked: {}", panic_message(err.into_panic().as_ref()))
                } else {
                    format!("enrichment task failed: {err}")
                }
            })
    }

    /// Serve-stale when the store has data; otherwise synthesize and persist
    /// the fallback set.
    fn fall_back(&self, reason: String) -> Result<RefreshReport> {
        if !self.store.is_empty() {
            warn!(%reason, "refresh failed, serving stored data");
            self.set_phase(Phase::ServingStored);
            return Ok(self.report(DataSource::Fallback, true, Some(reason)));
        }

        warn!(%reason, "refresh failed with empty store, serving fallback data");
        self.store
            .save_all(fallback_matches(Utc::now(), &self.engine))
            .context("persist fallback matches")?;
        self.set_phase(Phase::ServingFallback);
        Ok(self.report(DataSource::Fallback, true, Some(reason)))
    }

    fn emergency(&self, reason: String) -> RefreshReport {
        error!(%reason, "refresh cycle aborted, using emergency fallback");
        let phase = if self.store.is_empty() {
            Phase::ServingFallback
        } else {
            Phase::ServingStored
        };
        self.set_phase(phase);
        self.report(DataSource::EmergencyFallback, true, Some(reason))
    }

    fn backing_off(&self, now: DateTime<Utc>) -> bool {
        let Some(failed_at) = *self.last_failure.lock() else {
            return false;
        };
        now.signed_duration_since(failed_at)
            .to_std()
            .map(|elapsed| elapsed < self.cfg.interval)
            .unwrap_or(true)
    }

    /// Report for a call that did not run a cycle. Inside the retry window
    /// the failed cycle's source and error are carried forward.
    fn skipped_report(&self) -> RefreshReport {
        if self.backing_off(Utc::now())
            && let Some(failed) = self.last_report()
        {
            debug!(source = ?failed.source, "refresh skipped, retry window open");
            return RefreshReport {
                refreshed: false,
                phase: self.phase(),
                matches: self.store.len(),
                ..failed
            };
        }
        self.report(DataSource::Stored, false, None)
    }

    fn report(&self, source: DataSource, refreshed: bool, error: Option<String>) -> RefreshReport {
        RefreshReport {
            source,
            phase: self.phase(),
            refreshed,
            matches: self.store.len(),
            error,
            finished_at: Utc::now(),
        }
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
