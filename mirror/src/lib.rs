pub mod cache;
pub mod comparator;
pub mod config;
pub mod correlation;
pub mod errors;
pub mod forwarder;
pub mod metrics_defs;
pub mod recorder;
pub mod selector;
mod service;
pub mod snapshot;
pub mod types;

pub use errors::MirrorError;
pub use recorder::{AnalysisSink, NewAnalysis, SinkError};
pub use types::{
    ComparisonResult, Discrepancy, DiscrepancyKind, MatchKind, Severity, Target, TargetResponse,
};

use std::sync::Arc;

/// Serves the mirrored-traffic listener until the listener fails.
pub async fn run(
    config: config::MirrorConfig,
    sink: Option<Arc<dyn AnalysisSink>>,
) -> Result<(), MirrorError> {
    let service = service::MirrorService::new(&config, sink);
    shared::http::run_http_service(&config.listener.host, config.listener.port, service)
        .await
        .map_err(MirrorError::Io)
}
