//! Background maintenance: retention purge plus periodic health alerts.

use crate::error::Result;
use crate::metrics_defs::{MAINTENANCE_FAILURES, MAINTENANCE_RUNS, PURGED_ANALYSES};
use crate::store::AnalysisStore;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const SCORE_ALERT_THRESHOLD: f64 = 85.0;
const SCORE_ALERT_MIN_SAMPLE: i64 = 10;
const CRITICAL_ALERT_THRESHOLD: i64 = 10;
const LATENCY_DIVERGENCE_RATIO: f64 = 0.5;

fn default_interval_secs() -> u64 {
    21_600
}

fn default_retention_days() -> u32 {
    30
}

fn default_retry_secs() -> u64 {
    1_800
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between maintenance passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Analyses older than this many days are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Seconds before retrying after a failed pass.
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        MaintenanceConfig {
            interval_secs: default_interval_secs(),
            retention_days: default_retention_days(),
            retry_secs: default_retry_secs(),
        }
    }
}

pub struct MaintenanceLoop {
    store: Arc<AnalysisStore>,
    config: MaintenanceConfig,
}

impl MaintenanceLoop {
    pub fn new(store: Arc<AnalysisStore>, config: MaintenanceConfig) -> Self {
        MaintenanceLoop { store, config }
    }

    /// Runs until the shutdown flag flips to true. Each pass is blocking
    /// SQLite work, so it runs on the blocking pool rather than an async
    /// worker.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let worker = MaintenanceLoop {
                store: self.store.clone(),
                config: self.config.clone(),
            };
            let delay = match tokio::task::spawn_blocking(move || worker.tick()).await {
                Ok(Ok(purged)) => {
                    shared::counter!(MAINTENANCE_RUNS).increment(1);
                    tracing::debug!(purged, "maintenance pass complete");
                    Duration::from_secs(self.config.interval_secs)
                }
                Ok(Err(e)) => {
                    shared::counter!(MAINTENANCE_FAILURES).increment(1);
                    tracing::warn!(error = %e, "maintenance pass failed, will retry");
                    Duration::from_secs(self.config.retry_secs)
                }
                Err(e) => {
                    shared::counter!(MAINTENANCE_FAILURES).increment(1);
                    tracing::warn!(error = %e, "maintenance pass panicked, will retry");
                    Duration::from_secs(self.config.retry_secs)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("maintenance loop stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One pass: purge expired rows, then alert on the last 24 hours.
    pub fn tick(&self) -> Result<usize> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(self.config.retention_days));
        let purged = self.store.purge_older_than(cutoff)?;
        if purged > 0 {
            shared::counter!(PURGED_ANALYSES).increment(purged as u64);
            tracing::info!(purged, retention_days = self.config.retention_days, "purged expired analyses");
        }

        let metrics = self
            .store
            .metrics(Some(Utc::now() - ChronoDuration::hours(24)), None)?;
        if metrics.total >= SCORE_ALERT_MIN_SAMPLE
            && metrics.compatibility_score < SCORE_ALERT_THRESHOLD
        {
            tracing::warn!(
                score = metrics.compatibility_score,
                total = metrics.total,
                "compatibility score below alert threshold"
            );
        }
        if metrics.critical_discrepancies > CRITICAL_ALERT_THRESHOLD {
            tracing::error!(
                critical = metrics.critical_discrepancies,
                "critical discrepancy volume above alert threshold"
            );
        }
        let slow = metrics.avg_nightscout_ms.max(metrics.avg_nocturne_ms);
        let fast = metrics.avg_nightscout_ms.min(metrics.avg_nocturne_ms);
        if fast > 0.0 && (slow - fast) / fast > LATENCY_DIVERGENCE_RATIO {
            tracing::warn!(
                avg_nightscout_ms = metrics.avg_nightscout_ms,
                avg_nocturne_ms = metrics.avg_nocturne_ms,
                "backend response times diverging"
            );
        }

        Ok(purged)
    }
}
