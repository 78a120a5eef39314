use crate::config::MonitorConfig;
use crate::model::{AlertConfig, HealthStatus, ProbeResult, Target};
use crate::probe::Probe;
use crate::stats::TargetStats;
use crate::store::{StoreError, StoreGateway};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown target: {0}")]
    UnknownTarget(String),
    #[error("target is not active: {0}")]
    InactiveTarget(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepSummary {
    pub probed: usize,
    pub skipped: usize,
}

/// The monitoring engine: owns sweep scheduling, batch dispatch and the
/// fold of probe results into persisted stats. Constructed with injected
/// store and probe so both can be doubled in tests.
pub struct Engine {
    store: Arc<dyn StoreGateway>,
    probe: Arc<dyn Probe>,
    cfg: MonitorConfig,
    alert: AlertConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        probe: Arc<dyn Probe>,
        cfg: MonitorConfig,
        alert: AlertConfig,
    ) -> Self {
        Self {
            store,
            probe,
            cfg,
            alert,
        }
    }

    /// Sweep driver. One warm-up sweep shortly after start, then a full
    /// sweep every `sweep_interval_secs` until the shutdown channel flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Starting monitoring engine...");

        tokio::select! {
            _ = sleep(Duration::from_secs(self.cfg.warmup_delay_secs)) => {}
            _ = shutdown.changed() => return,
        }

        loop {
            match self.run_sweep().await {
                Ok(summary) => {
                    tracing::info!("Sweep complete: {} probed, {} skipped", summary.probed, summary.skipped)
                }
                // Persistence failure abandons the cycle; the next tick is the retry.
                Err(e) => tracing::error!("Sweep abandoned: {}", e),
            }

            tokio::select! {
                _ = sleep(Duration::from_secs(self.cfg.sweep_interval_secs)) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Retention driver, on a much longer cadence than the sweep loop.
    pub async fn run_retention(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = sleep(Duration::from_secs(self.cfg.retention_sweep_interval_secs)) => {}
                _ = shutdown.changed() => return,
            }

            if let Err(e) = self.run_retention_cleanup().await {
                tracing::error!("Retention cleanup failed: {}", e);
            }
        }
    }

    /// One pass over all active targets, probed in fixed-size batches with
    /// a pacing delay between batches. Probe failures are data and never
    /// stop the sweep; a store failure aborts the remainder of the cycle.
    pub async fn run_sweep(&self) -> Result<SweepSummary, EngineError> {
        let targets = self.store.list_active().await?;
        tracing::debug!("Sweeping {} active targets", targets.len());

        let mut summary = SweepSummary::default();
        let mut first = true;
        for batch in targets.chunks(self.cfg.batch_size.max(1)) {
            if !first {
                sleep(Duration::from_millis(self.cfg.batch_delay_ms)).await;
            }
            first = false;

            let outcomes = futures::future::join_all(batch.iter().map(|t| self.check_target(t))).await;
            for outcome in outcomes {
                match outcome? {
                    Some(_) => summary.probed += 1,
                    None => summary.skipped += 1,
                }
            }
        }

        Ok(summary)
    }

    /// One target within a sweep. Skips targets that were removed or
    /// deactivated after the listing, and targets not yet due per their
    /// cadence.
    async fn check_target(&self, listed: &Target) -> Result<Option<ProbeResult>, EngineError> {
        let Some((target, mut stats)) = self.store.get(&listed.id).await? else {
            return Ok(None);
        };
        if !target.active || !is_due(&target, &stats) {
            return Ok(None);
        }

        let result = self.probe.execute(&target).await;
        let previous = stats.current_status;
        stats.record(&result, self.cfg.history_capacity);
        self.store.save(&target.id, &stats).await?;
        self.handle_transition(&target, previous, stats.current_status, &result);

        Ok(Some(result))
    }

    /// On-demand single-target check. Bypasses batching, pacing and the
    /// cadence check; returns the result to the caller. May race a sweep
    /// for the same target, in which case the last writer wins.
    pub async fn check_now(&self, id: &str) -> Result<ProbeResult, EngineError> {
        let Some((target, mut stats)) = self.store.get(id).await? else {
            return Err(EngineError::UnknownTarget(id.to_string()));
        };
        if !target.active {
            return Err(EngineError::InactiveTarget(id.to_string()));
        }

        tracing::debug!("Manual check for {}", target.name);
        let result = self.probe.execute(&target).await;
        let previous = stats.current_status;
        stats.record(&result, self.cfg.history_capacity);
        self.store.save(id, &stats).await?;
        self.handle_transition(&target, previous, stats.current_status, &result);

        Ok(result)
    }

    /// Prunes history entries that fell out of the retention window.
    pub async fn run_retention_cleanup(&self) -> Result<usize, EngineError> {
        let cutoff = Utc::now() - chrono::Duration::days(self.cfg.retention_days);
        let removed = self.store.delete_older_history(cutoff).await?;
        tracing::info!("Retention cleanup removed {} history entries", removed);
        Ok(removed)
    }

    fn handle_transition(
        &self,
        target: &Target,
        previous: HealthStatus,
        current: HealthStatus,
        result: &ProbeResult,
    ) {
        if previous == HealthStatus::Unknown {
            tracing::info!("Initial state for {}: {}", target.name, current);
            return;
        }
        if previous == current {
            return;
        }

        tracing::info!("State changed for {}: {} -> {}", target.name, previous, current);
        if self.alert.enabled {
            let target = target.clone();
            let alert = self.alert.clone();
            let detail = result.reason.map(|r| r.to_string());
            tokio::spawn(async move {
                if let Err(e) =
                    crate::alert::send_alert(&target, current, &alert, detail.as_deref()).await
                {
                    tracing::error!("Failed to dispatch alerts for {}: {}", target.name, e);
                }
            });
        }
    }
}

fn is_due(target: &Target, stats: &TargetStats) -> bool {
    match stats.last_checked_at {
        None => true,
        Some(at) => Utc::now() - at >= chrono::Duration::minutes(target.interval_minutes.max(1) as i64),
    }
}
