//! Sync pass orchestration.
//!
//! A pass moves through fixed stages: authorize, list workouts per kind,
//! fan out route fetching, drain into the repository, commit, publish a
//! snapshot. Route fetching and simplification run concurrently under a
//! bounded pipeline; all persistence goes through the single drain loop so
//! the store only ever sees one writer.

use crate::catalog::WorkoutCatalog;
use crate::classify::{RouteBuckets, classify};
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::repository::{WatermarkStore, WorkoutRepository};
use crate::routes::RouteFetcher;
use crate::simplify::simplify;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use futures_util::{StreamExt, stream};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use trailsync_provider::retry::RetryPolicy;
use trailsync_provider::{ActivityKind, HealthDataProvider, LocationSample, WorkoutRecord};

/// Activity kinds the engine syncs.
pub const TRACKED_KINDS: [ActivityKind; 3] = [
    ActivityKind::Walking,
    ActivityKind::Running,
    ActivityKind::Cycling,
];

/// Tunables for one coordinator instance.
#[derive(Clone, Debug)]
pub struct SyncSettings {
    pub tolerance_m: f64,
    pub max_in_flight: usize,
    pub chunk_timeout: Duration,
    /// Backoff applied to workout catalog queries.
    pub retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tolerance_m: 10.0,
            max_in_flight: 8,
            chunk_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&EngineConfig> for SyncSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            tolerance_m: cfg.tolerance_m,
            max_in_flight: cfg.max_in_flight,
            chunk_timeout: cfg.provider_timeout,
            retry: RetryPolicy::default(),
        }
    }
}

/// How a sync pass concluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    AlreadyPopulated,
    Throttled,
}

/// Summary of one sync pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub workouts_discovered: usize,
    pub workouts_persisted: usize,
    pub workouts_skipped: usize,
    pub segments_fetched: usize,
    pub samples_kept: usize,
    pub samples_discarded: usize,
}

impl SyncReport {
    fn empty(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            workouts_discovered: 0,
            workouts_persisted: 0,
            workouts_skipped: 0,
            segments_fetched: 0,
            samples_kept: 0,
            samples_discarded: 0,
        }
    }
}

/// Drives sync passes against one provider and one local store.
pub struct SyncCoordinator {
    provider: Arc<dyn HealthDataProvider>,
    repository: Box<dyn WorkoutRepository>,
    watermarks: Box<dyn WatermarkStore>,
    settings: SyncSettings,
    snapshot_tx: watch::Sender<RouteBuckets>,
    cancel_rx: watch::Receiver<bool>,
}

impl SyncCoordinator {
    pub fn new(
        provider: Arc<dyn HealthDataProvider>,
        repository: Box<dyn WorkoutRepository>,
        watermarks: Box<dyn WatermarkStore>,
        settings: SyncSettings,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(RouteBuckets::default());
        Self {
            provider,
            repository,
            watermarks,
            settings,
            snapshot_tx,
            cancel_rx,
        }
    }

    /// Subscribe to classified route snapshots.
    ///
    /// The receiver holds the latest snapshot published after a completed
    /// pass; before the first completed pass it holds empty buckets.
    pub fn snapshots(&self) -> watch::Receiver<RouteBuckets> {
        self.snapshot_tx.subscribe()
    }

    /// First-run backfill. Refuses to run against a populated store so a
    /// restart cannot silently re-download full history.
    pub async fn initial_sync(&mut self) -> SyncResult<SyncReport> {
        if self.repository.workout_count()? > 0 {
            info!("store already populated, skipping initial sync");
            return Ok(SyncReport::empty(SyncOutcome::AlreadyPopulated));
        }
        self.run_pass(None).await
    }

    /// Periodic catch-up, throttled to at most one pass per `interval`
    /// measured against the persisted watermark. A throttled call performs
    /// zero provider queries.
    pub async fn incremental_sync(&mut self, interval: Duration) -> SyncResult<SyncReport> {
        let since = self.watermarks.load()?;
        if let Some(watermark) = since {
            let elapsed = Utc::now() - watermark;
            // a watermark in the future counts as not yet elapsed
            let due = matches!(elapsed.to_std(), Ok(e) if e >= interval);
            if !due {
                debug!(%watermark, "watermark too fresh, throttling sync pass");
                return Ok(SyncReport::empty(SyncOutcome::Throttled));
            }
        }
        self.run_pass(since).await
    }

    fn ensure_active(&self) -> SyncResult<()> {
        if *self.cancel_rx.borrow() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    async fn run_pass(&mut self, since: Option<DateTime<Utc>>) -> SyncResult<SyncReport> {
        // the watermark candidate: anything arriving after this instant is
        // covered again by the next pass
        let pass_started = Utc::now();
        self.ensure_active()?;

        self.provider.authorize(&TRACKED_KINDS).await?;
        self.ensure_active()?;

        let catalog =
            WorkoutCatalog::new(self.provider.clone()).with_retry(self.settings.retry.clone());
        let per_kind = join_all(TRACKED_KINDS.iter().map(|kind| {
            let catalog = catalog.clone();
            async move { (*kind, catalog.fetch_workouts(*kind, since).await) }
        }))
        .await;

        let mut eligible: Vec<WorkoutRecord> = Vec::new();
        for (kind, outcome) in per_kind {
            match outcome {
                Ok(records) => eligible.extend(records),
                Err(e) => {
                    warn!(
                        kind = kind.as_str(),
                        error = %e,
                        "workout query failed, skipping kind for this pass"
                    );
                }
            }
        }
        self.ensure_active()?;

        let mut report = SyncReport::empty(SyncOutcome::Completed);
        report.workouts_discovered = eligible.len();

        let fetcher = RouteFetcher::new(self.provider.clone(), self.settings.chunk_timeout);
        let tolerance = self.settings.tolerance_m;
        let mut jobs = stream::iter(eligible)
            .map(|record| {
                let fetcher = fetcher.clone();
                async move {
                    let prepared = fetcher.fetch_routes(&record).await.map(|routes| {
                        let raw: usize = routes.iter().map(|r| r.samples.len()).sum();
                        let segments: Vec<Vec<LocationSample>> = routes
                            .iter()
                            .map(|r| simplify(&r.samples, tolerance))
                            .collect();
                        (raw, segments)
                    });
                    (record, prepared)
                }
            })
            .buffer_unordered(self.settings.max_in_flight);

        let mut cancel_rx = self.cancel_rx.clone();
        loop {
            let item = tokio::select! {
                biased;
                changed = cancel_rx.changed() => {
                    // a dropped cancel handle means the host is tearing down
                    if changed.is_err() || *cancel_rx.borrow() {
                        return Err(SyncError::Cancelled);
                    }
                    continue;
                }
                item = jobs.next() => item,
            };
            let Some((record, prepared)) = item else { break };

            match prepared {
                Ok((raw_samples, segments)) => match self.persist_workout(&record, &segments) {
                    Ok(kept) => {
                        report.workouts_persisted += 1;
                        report.segments_fetched += segments.len();
                        report.samples_kept += kept;
                        report.samples_discarded += raw_samples - kept;
                    }
                    Err(e) => {
                        warn!(
                            workout = %record.id,
                            error = %e,
                            "failed to persist workout, skipping"
                        );
                        report.workouts_skipped += 1;
                    }
                },
                Err(e) => {
                    warn!(
                        workout = %record.id,
                        error = %e,
                        "failed to fetch routes, skipping workout"
                    );
                    report.workouts_skipped += 1;
                }
            }
        }
        drop(jobs);
        self.ensure_active()?;

        self.repository.commit()?;
        self.watermarks.store(pass_started)?;

        let snapshot = classify(self.repository.fetch_all_workouts()?);
        debug!(routes = snapshot.total_routes(), "publishing route snapshot");
        self.snapshot_tx.send_replace(snapshot);

        counter!("trailsync_sync_passes_total").increment(1);
        counter!("trailsync_workouts_persisted_total")
            .increment(report.workouts_persisted as u64);
        counter!("trailsync_workouts_skipped_total").increment(report.workouts_skipped as u64);
        counter!("trailsync_samples_kept_total").increment(report.samples_kept as u64);
        counter!("trailsync_samples_discarded_total")
            .increment(report.samples_discarded as u64);

        info!(
            discovered = report.workouts_discovered,
            persisted = report.workouts_persisted,
            skipped = report.workouts_skipped,
            samples_kept = report.samples_kept,
            samples_discarded = report.samples_discarded,
            "sync pass completed"
        );
        Ok(report)
    }

    /// Write one workout's segments inside a rewrite scope. A failure backs
    /// the whole workout out, so the pass commit cannot make a half-written
    /// rewrite durable.
    fn persist_workout(
        &mut self,
        record: &WorkoutRecord,
        segments: &[Vec<LocationSample>],
    ) -> Result<usize, crate::error::StoreError> {
        self.repository.begin_rewrite()?;
        match self.rewrite_workout(record, segments) {
            Ok(kept) => {
                self.repository.finish_rewrite()?;
                Ok(kept)
            }
            Err(e) => {
                if let Err(undo) = self.repository.discard_rewrite() {
                    warn!(workout = %record.id, error = %undo, "failed to back out workout write");
                }
                Err(e)
            }
        }
    }

    fn rewrite_workout(
        &mut self,
        record: &WorkoutRecord,
        segments: &[Vec<LocationSample>],
    ) -> Result<usize, crate::error::StoreError> {
        let handle = self.repository.find_or_create_workout(record)?;
        let mut kept = 0;
        for samples in segments {
            self.repository.append_route_points(&handle, samples)?;
            kept += samples.len();
        }
        Ok(kept)
    }
}
