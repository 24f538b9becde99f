//! Persisted and derived record types exposed by the store and the dashboard
//! API.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scalar view of one persisted analysis, as listed by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub id: i64,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub overall_match: String,
    pub status_match: bool,
    pub body_match: bool,
    pub nightscout_status: Option<u16>,
    pub nocturne_status: Option<u16>,
    pub nightscout_ms: u64,
    pub nocturne_ms: u64,
    pub total_ms: u64,
    pub summary: String,
    pub selected_target: String,
    pub selection_rationale: String,
    pub critical_count: i64,
    pub major_count: i64,
    pub minor_count: i64,
    pub nightscout_missing: bool,
    pub nocturne_missing: bool,
    pub error_message: Option<String>,
}

/// One persisted discrepancy child, in recorded order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscrepancyDetail {
    pub kind: String,
    pub severity: String,
    pub field_path: String,
    pub nightscout_value: Option<String>,
    pub nocturne_value: Option<String>,
    pub description: String,
}

/// Full analysis record with its ordered discrepancy children.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisDetail {
    #[serde(flatten)]
    pub summary: AnalysisSummary,
    pub discrepancies: Vec<DiscrepancyDetail>,
}

/// Filters for listing analyses; all fields optional.
#[derive(Debug, Clone, Default)]
pub struct AnalysisFilter {
    pub request_path: Option<String>,
    pub overall_match: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub count: Option<u32>,
    pub skip: Option<u32>,
}

/// Aggregated compatibility view over a time window. Derived on demand, never
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityMetrics {
    pub total: i64,
    pub perfect: i64,
    pub minor_differences: i64,
    pub major_differences: i64,
    pub critical_differences: i64,
    pub nightscout_missing: i64,
    pub nocturne_missing: i64,
    pub both_missing: i64,
    pub comparison_error: i64,
    /// (Perfect + MinorDifferences) / total × 100; 100 for an empty window.
    pub compatibility_score: f64,
    pub avg_nightscout_ms: f64,
    pub avg_nocturne_ms: f64,
    /// Sum of critical discrepancy counts across the window.
    pub critical_discrepancies: i64,
}

impl CompatibilityMetrics {
    pub fn empty() -> Self {
        CompatibilityMetrics {
            total: 0,
            perfect: 0,
            minor_differences: 0,
            major_differences: 0,
            critical_differences: 0,
            nightscout_missing: 0,
            nocturne_missing: 0,
            both_missing: 0,
            comparison_error: 0,
            compatibility_score: 100.0,
            avg_nightscout_ms: 0.0,
            avg_nocturne_ms: 0.0,
            critical_discrepancies: 0,
        }
    }

    pub fn score_of(perfect: i64, minor: i64, total: i64) -> f64 {
        if total == 0 {
            100.0
        } else {
            (perfect + minor) as f64 / total as f64 * 100.0
        }
    }
}

/// `CompatibilityMetrics` for a single request path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointMetrics {
    pub path: String,
    #[serde(flatten)]
    pub metrics: CompatibilityMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounds() {
        assert_eq!(CompatibilityMetrics::score_of(0, 0, 0), 100.0);
        assert_eq!(CompatibilityMetrics::score_of(0, 0, 10), 0.0);
        assert_eq!(CompatibilityMetrics::score_of(10, 0, 10), 100.0);
        let mid = CompatibilityMetrics::score_of(6, 2, 10);
        assert!((0.0..=100.0).contains(&mid));
        assert!((mid - 80.0).abs() < 1e-9);
    }
}
