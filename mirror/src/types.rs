//! Core value types shared across the comparison pipeline.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The two mirrored backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Legacy reference implementation; the fixed default side.
    Nightscout,
    /// Candidate replacement under evaluation.
    Nocturne,
}

impl Target {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Target::Nightscout => "Nightscout",
            Target::Nocturne => "Nocturne",
        }
    }

    pub const fn other(&self) -> Target {
        match self {
            Target::Nightscout => Target::Nocturne,
            Target::Nocturne => Target::Nightscout,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Nightscout" => Ok(Target::Nightscout),
            "Nocturne" => Ok(Target::Nocturne),
            other => Err(format!("unknown target: {other}")),
        }
    }
}

/// One backend's answer to a mirrored request.
///
/// Transport failures never surface as errors; they are degraded into a
/// synthetic response with `error` set. A response with `error` present counts
/// as *missing* for comparison purposes even when it carries a synthetic
/// status code.
#[derive(Debug, Clone)]
pub struct TargetResponse {
    pub target: Target,
    /// None when the transport never produced a status (e.g. not configured).
    pub status: Option<u16>,
    pub success: bool,
    pub body: Bytes,
    pub headers: HeaderMap,
    pub content_type: Option<String>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl TargetResponse {
    /// A real response received from the backend.
    pub fn received(
        target: Target,
        status: u16,
        headers: HeaderMap,
        body: Bytes,
        elapsed: Duration,
    ) -> Self {
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        TargetResponse {
            target,
            status: Some(status),
            success: (200..300).contains(&status),
            body,
            headers,
            content_type,
            elapsed_ms: elapsed.as_millis() as u64,
            error: None,
        }
    }

    /// The leg exceeded its configured timeout; degraded to a synthetic 408.
    pub fn timed_out(target: Target, timeout: Duration, elapsed: Duration) -> Self {
        Self::degraded(
            target,
            Some(408),
            format!("{target} did not respond within {}ms", timeout.as_millis()),
            elapsed,
        )
    }

    /// The leg failed at the transport level; degraded to a synthetic 500.
    /// `message` must already be sanitized.
    pub fn failed(target: Target, message: String, elapsed: Duration) -> Self {
        Self::degraded(target, Some(500), message, elapsed)
    }

    /// No base URL is configured for this backend.
    pub fn not_configured(target: Target) -> Self {
        Self::degraded(
            target,
            None,
            format!("{target} backend is not configured"),
            Duration::ZERO,
        )
    }

    /// Placeholder fabricated by the selector when the chosen side never
    /// produced a usable status.
    pub fn placeholder_unavailable(target: Target) -> Self {
        Self::degraded(
            target,
            Some(503),
            format!("{target} produced no response"),
            Duration::ZERO,
        )
    }

    fn degraded(target: Target, status: Option<u16>, message: String, elapsed: Duration) -> Self {
        TargetResponse {
            target,
            status,
            success: false,
            body: Bytes::from(message.clone()),
            headers: HeaderMap::new(),
            content_type: Some("text/plain".to_string()),
            elapsed_ms: elapsed.as_millis() as u64,
            error: Some(message),
        }
    }

    /// True when the backend never answered: timeout, transport failure, or
    /// not configured.
    pub fn is_missing(&self) -> bool {
        self.error.is_some()
    }
}

/// Ordinal severity of a single discrepancy; higher is worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Minor = 0,
    Major = 1,
    Critical = 2,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "Minor",
            Severity::Major => "Major",
            Severity::Critical => "Critical",
        }
    }

    pub fn from_ordinal(n: i64) -> Option<Severity> {
        match n {
            0 => Some(Severity::Minor),
            1 => Some(Severity::Major),
            2 => Some(Severity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscrepancyKind {
    StatusCodeMismatch,
    FieldValueMismatch,
    MissingField,
    ExtraField,
    TypeMismatch,
}

impl DiscrepancyKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyKind::StatusCodeMismatch => "StatusCodeMismatch",
            DiscrepancyKind::FieldValueMismatch => "FieldValueMismatch",
            DiscrepancyKind::MissingField => "MissingField",
            DiscrepancyKind::ExtraField => "ExtraField",
            DiscrepancyKind::TypeMismatch => "TypeMismatch",
        }
    }
}

impl FromStr for DiscrepancyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "StatusCodeMismatch" => Ok(DiscrepancyKind::StatusCodeMismatch),
            "FieldValueMismatch" => Ok(DiscrepancyKind::FieldValueMismatch),
            "MissingField" => Ok(DiscrepancyKind::MissingField),
            "ExtraField" => Ok(DiscrepancyKind::ExtraField),
            "TypeMismatch" => Ok(DiscrepancyKind::TypeMismatch),
            other => Err(format!("unknown discrepancy kind: {other}")),
        }
    }
}

/// One field-level difference between the two responses.
#[derive(Debug, Clone, PartialEq)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub severity: Severity,
    pub field_path: String,
    pub nightscout_value: Option<String>,
    pub nocturne_value: Option<String>,
    pub description: String,
}

/// Overall classification of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Perfect,
    MinorDifferences,
    MajorDifferences,
    CriticalDifferences,
    NightscoutMissing,
    NocturneMissing,
    BothMissing,
    ComparisonError,
}

impl MatchKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Perfect => "Perfect",
            MatchKind::MinorDifferences => "MinorDifferences",
            MatchKind::MajorDifferences => "MajorDifferences",
            MatchKind::CriticalDifferences => "CriticalDifferences",
            MatchKind::NightscoutMissing => "NightscoutMissing",
            MatchKind::NocturneMissing => "NocturneMissing",
            MatchKind::BothMissing => "BothMissing",
            MatchKind::ComparisonError => "ComparisonError",
        }
    }

    pub const fn is_missing_variant(&self) -> bool {
        matches!(
            self,
            MatchKind::NightscoutMissing | MatchKind::NocturneMissing | MatchKind::BothMissing
        )
    }

    /// Classification derived from the worst severity present.
    pub fn from_max_severity(max: Option<Severity>) -> MatchKind {
        match max {
            None => MatchKind::Perfect,
            Some(Severity::Minor) => MatchKind::MinorDifferences,
            Some(Severity::Major) => MatchKind::MajorDifferences,
            Some(Severity::Critical) => MatchKind::CriticalDifferences,
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Perfect" => Ok(MatchKind::Perfect),
            "MinorDifferences" => Ok(MatchKind::MinorDifferences),
            "MajorDifferences" => Ok(MatchKind::MajorDifferences),
            "CriticalDifferences" => Ok(MatchKind::CriticalDifferences),
            "NightscoutMissing" => Ok(MatchKind::NightscoutMissing),
            "NocturneMissing" => Ok(MatchKind::NocturneMissing),
            "BothMissing" => Ok(MatchKind::BothMissing),
            "ComparisonError" => Ok(MatchKind::ComparisonError),
            other => Err(format!("unknown match kind: {other}")),
        }
    }
}

/// Immutable outcome of comparing the two backend responses.
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub correlation_id: String,
    pub compared_at: DateTime<Utc>,
    pub overall: MatchKind,
    pub status_match: bool,
    pub body_match: bool,
    pub discrepancies: Vec<Discrepancy>,
    pub summary: String,
    pub nightscout_ms: u64,
    pub nocturne_ms: u64,
}

impl ComparisonResult {
    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.discrepancies
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Major);
        assert!(Severity::Major > Severity::Minor);
        assert_eq!(Severity::from_ordinal(2), Some(Severity::Critical));
        assert_eq!(Severity::from_ordinal(7), None);
    }

    #[test]
    fn test_match_kind_from_severity() {
        assert_eq!(MatchKind::from_max_severity(None), MatchKind::Perfect);
        assert_eq!(
            MatchKind::from_max_severity(Some(Severity::Minor)),
            MatchKind::MinorDifferences
        );
        assert_eq!(
            MatchKind::from_max_severity(Some(Severity::Critical)),
            MatchKind::CriticalDifferences
        );
    }

    #[test]
    fn test_match_kind_round_trips_through_str() {
        for kind in [
            MatchKind::Perfect,
            MatchKind::MinorDifferences,
            MatchKind::MajorDifferences,
            MatchKind::CriticalDifferences,
            MatchKind::NightscoutMissing,
            MatchKind::NocturneMissing,
            MatchKind::BothMissing,
            MatchKind::ComparisonError,
        ] {
            assert_eq!(kind.as_str().parse::<MatchKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_synthetic_responses_are_missing() {
        let timed_out = TargetResponse::timed_out(
            Target::Nocturne,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        assert!(timed_out.is_missing());
        assert_eq!(timed_out.status, Some(408));
        assert!(!timed_out.success);

        let unconfigured = TargetResponse::not_configured(Target::Nocturne);
        assert!(unconfigured.is_missing());
        assert_eq!(unconfigured.status, None);

        let real = TargetResponse::received(
            Target::Nightscout,
            200,
            HeaderMap::new(),
            Bytes::from_static(b"{}"),
            Duration::from_millis(12),
        );
        assert!(!real.is_missing());
        assert!(real.success);
    }
}
