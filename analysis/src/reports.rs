//! Migration readiness reports derived from stored metrics.

use crate::error::Result;
use crate::store::AnalysisStore;
use crate::types::{CompatibilityMetrics, EndpointMetrics};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Minimum sample before a Go verdict is considered meaningful.
const MIN_SAMPLE: i64 = 100;
const GO_SCORE: f64 = 99.0;
const NO_GO_SCORE: f64 = 95.0;
const WORST_ENDPOINT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Go,
    Caution,
    NoGo,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Go => "Go",
            Verdict::Caution => "Caution",
            Verdict::NoGo => "NoGo",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationAssessment {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub window_from: Option<DateTime<Utc>>,
    pub window_to: Option<DateTime<Utc>>,
    pub metrics: CompatibilityMetrics,
    /// Endpoints below a perfect score, worst first.
    pub worst_endpoints: Vec<EndpointMetrics>,
}

/// Builds the Go / Caution / NoGo assessment over a time window.
pub fn migration_assessment(
    store: &AnalysisStore,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<MigrationAssessment> {
    let metrics = store.metrics(from, to)?;
    let worst_endpoints: Vec<EndpointMetrics> = store
        .endpoint_metrics(from, to)?
        .into_iter()
        .filter(|e| e.metrics.compatibility_score < 100.0)
        .take(WORST_ENDPOINT_LIMIT)
        .collect();

    let mut reasons = Vec::new();
    if metrics.total < MIN_SAMPLE {
        reasons.push(format!(
            "only {} comparisons in window, {} needed for confidence",
            metrics.total, MIN_SAMPLE
        ));
    }
    if metrics.critical_discrepancies > 0 {
        reasons.push(format!(
            "{} critical discrepancies recorded",
            metrics.critical_discrepancies
        ));
    }
    if metrics.nocturne_missing + metrics.both_missing > 0 {
        reasons.push(format!(
            "candidate backend missing on {} requests",
            metrics.nocturne_missing + metrics.both_missing
        ));
    }
    if metrics.compatibility_score < GO_SCORE {
        reasons.push(format!(
            "compatibility score {:.1}% below {:.1}% target",
            metrics.compatibility_score, GO_SCORE
        ));
    }

    let verdict = if metrics.compatibility_score < NO_GO_SCORE
        || metrics.critical_discrepancies > 0
    {
        Verdict::NoGo
    } else if metrics.compatibility_score >= GO_SCORE && metrics.total >= MIN_SAMPLE {
        Verdict::Go
    } else {
        Verdict::Caution
    };
    if verdict == Verdict::Go {
        reasons.push(format!(
            "compatibility score {:.1}% over {} comparisons",
            metrics.compatibility_score, metrics.total
        ));
    }

    Ok(MigrationAssessment {
        verdict,
        reasons,
        generated_at: Utc::now(),
        window_from: from,
        window_to: to,
        metrics,
        worst_endpoints,
    })
}

/// Plaintext rendering for terminals and chat paste.
pub fn text_report(assessment: &MigrationAssessment) -> String {
    let m = &assessment.metrics;
    let mut out = String::new();
    out.push_str("MIGRATION ASSESSMENT\n");
    out.push_str("====================\n");
    out.push_str(&format!(
        "Generated: {}\n",
        assessment
            .generated_at
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    ));
    out.push_str(&format!("Verdict:   {}\n\n", assessment.verdict.as_str()));

    out.push_str(&format!("Comparisons:          {}\n", m.total));
    out.push_str(&format!(
        "Compatibility score:  {:.1}%\n",
        m.compatibility_score
    ));
    out.push_str(&format!("  Perfect:            {}\n", m.perfect));
    out.push_str(&format!("  Minor differences:  {}\n", m.minor_differences));
    out.push_str(&format!("  Major differences:  {}\n", m.major_differences));
    out.push_str(&format!(
        "  Critical:           {}\n",
        m.critical_differences
    ));
    out.push_str(&format!(
        "  Missing legs:       {} nightscout, {} nocturne, {} both\n",
        m.nightscout_missing, m.nocturne_missing, m.both_missing
    ));
    out.push_str(&format!("  Comparison errors:  {}\n", m.comparison_error));
    out.push_str(&format!(
        "Avg latency:          nightscout {:.0}ms, nocturne {:.0}ms\n",
        m.avg_nightscout_ms, m.avg_nocturne_ms
    ));

    if !assessment.reasons.is_empty() {
        out.push_str("\nFindings:\n");
        for reason in &assessment.reasons {
            out.push_str(&format!("  - {reason}\n"));
        }
    }

    if !assessment.worst_endpoints.is_empty() {
        out.push_str("\nWorst endpoints:\n");
        for endpoint in &assessment.worst_endpoints {
            out.push_str(&format!(
                "  {:<40} {:.1}% over {} comparisons\n",
                endpoint.path, endpoint.metrics.compatibility_score, endpoint.metrics.total
            ));
        }
    }
    out
}
