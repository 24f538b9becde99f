//! Persistence and reporting for mirrored request comparisons.
//!
//! The mirror hands each comparison outcome to an [`store::AnalysisStore`],
//! which keeps them in SQLite. The dashboard API in [`api`] and the reports in
//! [`reports`] read them back; [`maintenance`] enforces retention.

pub mod api;
pub mod error;
pub mod maintenance;
pub mod metrics_defs;
pub mod reports;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use store::AnalysisStore;
