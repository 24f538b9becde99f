//! Per-request correlation identifiers.
//!
//! Each mirrored request gets an id of the form `INT-yyyyMMdd-HHmmss-<random>`:
//! the UTC timestamp prefix keeps ids lexicographically sortable, the random
//! suffix makes collisions across workers vanishingly unlikely. The id is bound
//! to the request's logical task tree via `tokio::task_local!`, so everything
//! spawned under `with_correlation` sees it without parameter threading while
//! concurrently in-flight requests stay isolated.

use chrono::Utc;
use std::future::Future;

tokio::task_local! {
    static CURRENT_CORRELATION: String;
}

#[derive(Clone, Debug)]
pub struct CorrelationTracker {
    enabled: bool,
}

impl CorrelationTracker {
    pub fn new(enabled: bool) -> Self {
        CorrelationTracker { enabled }
    }

    /// Produces a fresh correlation id, or the empty string when tracking is
    /// disabled (consumers treat the empty id as "feature off").
    pub fn issue(&self) -> String {
        if !self.enabled {
            return String::new();
        }
        format!(
            "INT-{}-{:016x}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            rand::random::<u64>()
        )
    }
}

/// Runs `fut` with `id` bound as the current correlation id.
pub async fn with_correlation<F: Future>(id: String, fut: F) -> F::Output {
    CURRENT_CORRELATION.scope(id, fut).await
}

/// The correlation id bound to the current logical request, if any.
pub fn current() -> Option<String> {
    CURRENT_CORRELATION.try_with(|id| id.clone()).ok()
}
