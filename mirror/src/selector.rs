//! Response selection strategies.
//!
//! `select` is a pure function over the two leg responses, the optional
//! comparison, the configured strategy, and the correlation id. Given identical
//! inputs it always yields the same side, which is what makes the A/B split
//! reproducible and auditable from the dashboard.

use crate::types::{ComparisonResult, MatchKind, Target, TargetResponse};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Configured selection policy.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Strategy {
    /// Always the legacy side.
    Primary,
    /// Always the candidate side.
    Secondary,
    /// Whichever succeeded faster.
    Fastest,
    /// Fastest when responses are equivalent; legacy when they diverge.
    Compare,
    /// Deterministic split: `percentage` percent of correlation ids route to
    /// the candidate side.
    #[serde(rename = "abtest")]
    AbTest { percentage: i32 },
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Compare
    }
}

/// The selector's verdict: which side answers the caller and why.
#[derive(Debug, Clone)]
pub struct Selection {
    pub target: Target,
    pub response: TargetResponse,
    pub rationale: String,
}

/// Picks exactly one response to return to the caller.
///
/// A leg that never answered (timeout, unreachable, not configured) is never
/// chosen while the other side is available, regardless of strategy.
pub fn select(
    strategy: Strategy,
    nightscout: &TargetResponse,
    nocturne: &TargetResponse,
    comparison: Option<&ComparisonResult>,
    correlation_id: &str,
) -> Selection {
    match (nightscout.is_missing(), nocturne.is_missing()) {
        (true, false) => {
            return pick(
                nocturne,
                format!(
                    "Nightscout unavailable ({}), returning Nocturne",
                    missing_reason(nightscout)
                ),
            );
        }
        (false, true) => {
            return pick(
                nightscout,
                format!(
                    "Nocturne unavailable ({}), returning Nightscout",
                    missing_reason(nocturne)
                ),
            );
        }
        (true, true) => {
            return pick(
                nightscout,
                "both backends unavailable, returning Nightscout failure".to_string(),
            );
        }
        (false, false) => {}
    }

    match strategy {
        Strategy::Primary => pick(nightscout, "Primary: Nightscout".to_string()),
        Strategy::Secondary => pick(nocturne, "Secondary: Nocturne".to_string()),
        Strategy::Fastest => fastest(nightscout, nocturne),
        Strategy::Compare => match comparison.map(|c| c.overall) {
            Some(MatchKind::MajorDifferences) | Some(MatchKind::CriticalDifferences) => {
                let summary = comparison.map(|c| c.summary.as_str()).unwrap_or_default();
                pick(
                    nightscout,
                    format!("Compare: responses diverge, returning Nightscout ({summary})"),
                )
            }
            _ => fastest(nightscout, nocturne),
        },
        Strategy::AbTest { percentage } => {
            if percentage <= 0 {
                pick(nightscout, "ABTest: 0%, always Nightscout".to_string())
            } else if percentage >= 100 {
                pick(nocturne, "ABTest: 100%, always Nocturne".to_string())
            } else if correlation_id.is_empty() {
                // Without an id there is nothing to bucket on; hashing the
                // empty string would pin every request to one fixed side.
                pick(
                    nightscout,
                    "ABTest: no correlation id, returning Nightscout".to_string(),
                )
            } else {
                let bucket = ab_bucket(correlation_id);
                let chosen = if i32::from(bucket) < percentage {
                    nocturne
                } else {
                    nightscout
                };
                pick(
                    chosen,
                    format!("ABTest: bucket {bucket} of {percentage}% -> {}", chosen.target),
                )
            }
        }
    }
}

/// Stable bucket in [0, 100) derived from the correlation id.
pub fn ab_bucket(correlation_id: &str) -> u8 {
    let digest = Sha256::digest(correlation_id.as_bytes());
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(raw) % 100) as u8
}

fn fastest(nightscout: &TargetResponse, nocturne: &TargetResponse) -> Selection {
    match (nightscout.success, nocturne.success) {
        (true, true) => {
            let (winner, loser) = if nightscout.elapsed_ms <= nocturne.elapsed_ms {
                (nightscout, nocturne)
            } else {
                (nocturne, nightscout)
            };
            pick(
                winner,
                format!(
                    "Fastest: {} ({}ms vs {}ms)",
                    winner.target, winner.elapsed_ms, loser.elapsed_ms
                ),
            )
        }
        (true, false) => pick(
            nightscout,
            "Fastest: Nightscout (Nocturne unsuccessful)".to_string(),
        ),
        (false, true) => pick(
            nocturne,
            "Fastest: Nocturne (Nightscout unsuccessful)".to_string(),
        ),
        (false, false) => pick(
            nightscout,
            "Fastest: neither succeeded, defaulting to Nightscout".to_string(),
        ),
    }
}

fn pick(response: &TargetResponse, rationale: String) -> Selection {
    let response = if response.status.is_some() {
        response.clone()
    } else {
        TargetResponse::placeholder_unavailable(response.target)
    };
    Selection {
        target: response.target,
        response,
        rationale,
    }
}

fn missing_reason(response: &TargetResponse) -> &str {
    response.error.as_deref().unwrap_or("no response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;
    use std::time::Duration;

    fn response(target: Target, status: u16, elapsed_ms: u64) -> TargetResponse {
        TargetResponse::received(
            target,
            status,
            HeaderMap::new(),
            Bytes::from_static(b"{}"),
            Duration::from_millis(elapsed_ms),
        )
    }

    fn comparison(overall: MatchKind, summary: &str) -> ComparisonResult {
        ComparisonResult {
            correlation_id: "INT-test".to_string(),
            compared_at: chrono::Utc::now(),
            overall,
            status_match: true,
            body_match: overall == MatchKind::Perfect,
            discrepancies: Vec::new(),
            summary: summary.to_string(),
            nightscout_ms: 50,
            nocturne_ms: 120,
        }
    }

    #[test]
    fn test_primary_and_secondary_fixed_sides() {
        let ns = response(Target::Nightscout, 200, 80);
        let noct = response(Target::Nocturne, 200, 20);

        let primary = select(Strategy::Primary, &ns, &noct, None, "id");
        assert_eq!(primary.target, Target::Nightscout);

        let secondary = select(Strategy::Secondary, &ns, &noct, None, "id");
        assert_eq!(secondary.target, Target::Nocturne);
    }

    #[test]
    fn test_fastest_picks_lower_elapsed() {
        let ns = response(Target::Nightscout, 200, 50);
        let noct = response(Target::Nocturne, 200, 120);

        let selection = select(Strategy::Fastest, &ns, &noct, None, "id");
        assert_eq!(selection.target, Target::Nightscout);
        assert_eq!(selection.rationale, "Fastest: Nightscout (50ms vs 120ms)");
    }

    #[test]
    fn test_fastest_prefers_the_successful_side() {
        let ns = response(Target::Nightscout, 500, 10);
        let noct = response(Target::Nocturne, 200, 400);

        let selection = select(Strategy::Fastest, &ns, &noct, None, "id");
        assert_eq!(selection.target, Target::Nocturne);
    }

    #[test]
    fn test_compare_returns_default_side_on_divergence() {
        let ns = response(Target::Nightscout, 200, 120);
        let noct = response(Target::Nocturne, 200, 50);
        let diverged = comparison(MatchKind::CriticalDifferences, "sgv differs");

        let selection = select(Strategy::Compare, &ns, &noct, Some(&diverged), "id");
        assert_eq!(selection.target, Target::Nightscout);
        assert!(selection.rationale.contains("sgv differs"));
    }

    #[test]
    fn test_compare_delegates_to_fastest_when_equivalent() {
        let ns = response(Target::Nightscout, 200, 120);
        let noct = response(Target::Nocturne, 200, 50);
        let perfect = comparison(MatchKind::Perfect, "responses match exactly");

        let selection = select(Strategy::Compare, &ns, &noct, Some(&perfect), "id");
        assert_eq!(selection.target, Target::Nocturne);
        assert!(selection.rationale.starts_with("Fastest:"));
    }

    #[test]
    fn test_abtest_is_deterministic() {
        let ns = response(Target::Nightscout, 200, 10);
        let noct = response(Target::Nocturne, 200, 10);
        let strategy = Strategy::AbTest { percentage: 30 };

        for id in ["INT-20260101-000000-aaaa", "INT-20260101-000000-bbbb", "x"] {
            let first = select(strategy, &ns, &noct, None, id);
            let second = select(strategy, &ns, &noct, None, id);
            assert_eq!(first.target, second.target, "id {id} must be stable");
        }
    }

    #[test]
    fn test_abtest_extremes() {
        let ns = response(Target::Nightscout, 200, 10);
        let noct = response(Target::Nocturne, 200, 10);

        let zero = select(Strategy::AbTest { percentage: 0 }, &ns, &noct, None, "id");
        assert_eq!(zero.target, Target::Nightscout);

        let hundred = select(Strategy::AbTest { percentage: 100 }, &ns, &noct, None, "id");
        assert_eq!(hundred.target, Target::Nocturne);
    }

    #[test]
    fn test_abtest_without_correlation_id_returns_default_side() {
        let ns = response(Target::Nightscout, 200, 10);
        let noct = response(Target::Nocturne, 200, 10);

        let selection = select(Strategy::AbTest { percentage: 50 }, &ns, &noct, None, "");
        assert_eq!(selection.target, Target::Nightscout);
        assert!(selection.rationale.contains("no correlation id"));
    }

    #[test]
    fn test_abtest_splits_traffic() {
        // With enough distinct ids both sides must be exercised.
        let ns = response(Target::Nightscout, 200, 10);
        let noct = response(Target::Nocturne, 200, 10);
        let strategy = Strategy::AbTest { percentage: 50 };

        let mut nocturne_hits = 0;
        for i in 0..200 {
            let selection = select(strategy, &ns, &noct, None, &format!("id-{i}"));
            if selection.target == Target::Nocturne {
                nocturne_hits += 1;
            }
        }
        assert!(nocturne_hits > 50 && nocturne_hits < 150);
    }

    #[test]
    fn test_missing_leg_overrides_strategy() {
        let ns = response(Target::Nightscout, 200, 10);
        let down = TargetResponse::failed(
            Target::Nocturne,
            "connection refused".to_string(),
            Duration::from_millis(2),
        );

        // Even Secondary returns the present side when the other leg is gone.
        let selection = select(Strategy::Secondary, &ns, &down, None, "id");
        assert_eq!(selection.target, Target::Nightscout);
        assert!(selection.rationale.contains("connection refused"));
    }

    #[test]
    fn test_both_missing_fabricates_placeholder() {
        let ns = TargetResponse::not_configured(Target::Nightscout);
        let noct = TargetResponse::not_configured(Target::Nocturne);

        let selection = select(Strategy::Primary, &ns, &noct, None, "id");
        assert_eq!(selection.target, Target::Nightscout);
        assert_eq!(selection.response.status, Some(503));
    }
}
