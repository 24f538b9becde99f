//! Seam between the forwarder and the persisted analysis store.
//!
//! The forwarder only knows this trait; the concrete SQLite-backed store lives
//! in the analysis crate. Recording is best-effort at the call site: the
//! forwarder logs and swallows `SinkError` so persistence can never fail a
//! request.

use crate::types::{ComparisonResult, Target};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("analysis sink error: {0}")]
pub struct SinkError(pub String);

/// Everything needed to persist one request's dual-dispatch outcome.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub comparison: ComparisonResult,
    pub nightscout_status: Option<u16>,
    pub nocturne_status: Option<u16>,
    /// Wall-clock time spent on the whole dual dispatch.
    pub total_ms: u64,
    pub selected_target: Target,
    pub selection_rationale: String,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait AnalysisSink: Send + Sync {
    /// Persists one analysis record with its discrepancy children atomically,
    /// returning the new record id.
    async fn record(&self, analysis: NewAnalysis) -> Result<i64, SinkError>;
}
