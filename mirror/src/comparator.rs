//! Structural comparison of the two backend responses.
//!
//! Status codes must match exactly. Bodies are compared structurally when both
//! sides parse as JSON, falling back to byte equality otherwise. Field-level
//! differences are scored against the configured severity policy and the
//! overall classification is the maximum severity observed. Comparison never
//! fails the request: unparseable input degrades to `ComparisonError`.

use crate::config::ComparisonPolicy;
use crate::types::{
    ComparisonResult, Discrepancy, DiscrepancyKind, MatchKind, Severity, TargetResponse,
};
use chrono::Utc;
use serde_json::Value;

const MAX_RENDERED_VALUE: usize = 120;

pub struct Comparator {
    policy: ComparisonPolicy,
}

impl Comparator {
    pub fn new(policy: ComparisonPolicy) -> Self {
        Comparator { policy }
    }

    pub fn compare(
        &self,
        correlation_id: &str,
        nightscout: &TargetResponse,
        nocturne: &TargetResponse,
    ) -> ComparisonResult {
        match (nightscout.is_missing(), nocturne.is_missing()) {
            (true, true) => self.missing(
                correlation_id,
                nightscout,
                nocturne,
                MatchKind::BothMissing,
                "both backends unavailable".to_string(),
            ),
            (true, false) => self.missing(
                correlation_id,
                nightscout,
                nocturne,
                MatchKind::NightscoutMissing,
                format!(
                    "Nightscout unavailable: {}",
                    nightscout.error.as_deref().unwrap_or("no response")
                ),
            ),
            (false, true) => self.missing(
                correlation_id,
                nightscout,
                nocturne,
                MatchKind::NocturneMissing,
                format!(
                    "Nocturne unavailable: {}",
                    nocturne.error.as_deref().unwrap_or("no response")
                ),
            ),
            (false, false) => self.compare_present(correlation_id, nightscout, nocturne),
        }
    }

    fn missing(
        &self,
        correlation_id: &str,
        nightscout: &TargetResponse,
        nocturne: &TargetResponse,
        overall: MatchKind,
        summary: String,
    ) -> ComparisonResult {
        ComparisonResult {
            correlation_id: correlation_id.to_string(),
            compared_at: Utc::now(),
            overall,
            status_match: false,
            body_match: false,
            discrepancies: Vec::new(),
            summary,
            nightscout_ms: nightscout.elapsed_ms,
            nocturne_ms: nocturne.elapsed_ms,
        }
    }

    fn compare_present(
        &self,
        correlation_id: &str,
        nightscout: &TargetResponse,
        nocturne: &TargetResponse,
    ) -> ComparisonResult {
        let mut discrepancies = Vec::new();

        let status_match = nightscout.status == nocturne.status;
        if !status_match {
            discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::StatusCodeMismatch,
                severity: Severity::Critical,
                field_path: "status".to_string(),
                nightscout_value: nightscout.status.map(|s| s.to_string()),
                nocturne_value: nocturne.status.map(|s| s.to_string()),
                description: format!(
                    "status code {} vs {}",
                    render_status(nightscout.status),
                    render_status(nocturne.status)
                ),
            });
        }

        let body_start = discrepancies.len();
        if let Err(parse_error) = self.compare_bodies(nightscout, nocturne, &mut discrepancies) {
            return ComparisonResult {
                correlation_id: correlation_id.to_string(),
                compared_at: Utc::now(),
                overall: MatchKind::ComparisonError,
                status_match,
                body_match: false,
                discrepancies: Vec::new(),
                summary: format!("comparison failed: {parse_error}"),
                nightscout_ms: nightscout.elapsed_ms,
                nocturne_ms: nocturne.elapsed_ms,
            };
        }
        let body_match = discrepancies.len() == body_start;

        let max_severity = discrepancies.iter().map(|d| d.severity).max();
        let overall = MatchKind::from_max_severity(max_severity);
        let summary = summarize(overall, &discrepancies);

        ComparisonResult {
            correlation_id: correlation_id.to_string(),
            compared_at: Utc::now(),
            overall,
            status_match,
            body_match,
            discrepancies,
            summary,
            nightscout_ms: nightscout.elapsed_ms,
            nocturne_ms: nocturne.elapsed_ms,
        }
    }

    /// Structural body comparison. `Err` means the bodies claimed a structured
    /// format but could not be parsed; the caller degrades to
    /// `ComparisonError`.
    fn compare_bodies(
        &self,
        nightscout: &TargetResponse,
        nocturne: &TargetResponse,
        out: &mut Vec<Discrepancy>,
    ) -> Result<(), String> {
        let a = &nightscout.body;
        let b = &nocturne.body;

        if a.is_empty() && b.is_empty() {
            return Ok(());
        }
        if a.is_empty() != b.is_empty() {
            let (has, lacks) = if a.is_empty() {
                ("Nocturne", "Nightscout")
            } else {
                ("Nightscout", "Nocturne")
            };
            out.push(Discrepancy {
                kind: DiscrepancyKind::FieldValueMismatch,
                severity: Severity::Major,
                field_path: "$".to_string(),
                nightscout_value: Some(format!("{} bytes", a.len())),
                nocturne_value: Some(format!("{} bytes", b.len())),
                description: format!("{has} returned a body but {lacks} did not"),
            });
            return Ok(());
        }

        match (
            serde_json::from_slice::<Value>(a),
            serde_json::from_slice::<Value>(b),
        ) {
            (Ok(a_value), Ok(b_value)) => {
                self.diff_value("$", &a_value, &b_value, out);
                Ok(())
            }
            (a_result, b_result) => {
                if declares_json(nightscout) || declares_json(nocturne) {
                    let error = a_result
                        .err()
                        .or(b_result.err())
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unparseable body".to_string());
                    return Err(error);
                }
                if a != b {
                    out.push(Discrepancy {
                        kind: DiscrepancyKind::FieldValueMismatch,
                        severity: Severity::Major,
                        field_path: "$".to_string(),
                        nightscout_value: Some(format!("{} bytes", a.len())),
                        nocturne_value: Some(format!("{} bytes", b.len())),
                        description: "non-JSON response bodies differ".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    fn diff_value(&self, path: &str, a: &Value, b: &Value, out: &mut Vec<Discrepancy>) {
        match (a, b) {
            (Value::Object(ao), Value::Object(bo)) => {
                for (key, a_child) in ao {
                    let child_path = format!("{path}.{key}");
                    match bo.get(key) {
                        Some(b_child) => self.diff_value(&child_path, a_child, b_child, out),
                        None => out.push(Discrepancy {
                            kind: DiscrepancyKind::MissingField,
                            severity: self.presence_severity(key),
                            field_path: child_path.clone(),
                            nightscout_value: Some(render(a_child)),
                            nocturne_value: None,
                            description: format!("{child_path} is missing from Nocturne"),
                        }),
                    }
                }
                for (key, b_child) in bo {
                    if !ao.contains_key(key) {
                        let child_path = format!("{path}.{key}");
                        out.push(Discrepancy {
                            kind: DiscrepancyKind::ExtraField,
                            severity: self.presence_severity(key),
                            field_path: child_path.clone(),
                            nightscout_value: None,
                            nocturne_value: Some(render(b_child)),
                            description: format!("{child_path} only present in Nocturne"),
                        });
                    }
                }
            }
            (Value::Array(a_items), Value::Array(b_items)) => {
                self.diff_array(path, a_items, b_items, out)
            }
            (Value::Number(a_num), Value::Number(b_num)) => {
                let (Some(x), Some(y)) = (a_num.as_f64(), b_num.as_f64()) else {
                    return;
                };
                if (x - y).abs() > self.policy.numeric_tolerance {
                    out.push(self.value_mismatch(path, a, b));
                }
            }
            (Value::String(a_str), Value::String(b_str)) => {
                if a_str == b_str {
                    return;
                }
                if a_str.trim().eq_ignore_ascii_case(b_str.trim()) {
                    out.push(Discrepancy {
                        kind: DiscrepancyKind::FieldValueMismatch,
                        severity: Severity::Minor,
                        field_path: path.to_string(),
                        nightscout_value: Some(a_str.clone()),
                        nocturne_value: Some(b_str.clone()),
                        description: format!("{path} differs only in case or whitespace"),
                    });
                } else {
                    out.push(self.value_mismatch(path, a, b));
                }
            }
            (Value::Bool(a_bool), Value::Bool(b_bool)) => {
                if a_bool != b_bool {
                    out.push(self.value_mismatch(path, a, b));
                }
            }
            (Value::Null, Value::Null) => {}
            _ => out.push(Discrepancy {
                kind: DiscrepancyKind::TypeMismatch,
                severity: self.value_severity(field_name(path)),
                field_path: path.to_string(),
                nightscout_value: Some(render(a)),
                nocturne_value: Some(render(b)),
                description: format!(
                    "{path} has type {} in Nightscout but {} in Nocturne",
                    type_name(a),
                    type_name(b)
                ),
            }),
        }
    }

    fn diff_array(&self, path: &str, a: &[Value], b: &[Value], out: &mut Vec<Discrepancy>) {
        if a.len() != b.len() {
            out.push(Discrepancy {
                kind: DiscrepancyKind::FieldValueMismatch,
                severity: Severity::Major,
                field_path: path.to_string(),
                nightscout_value: Some(a.len().to_string()),
                nocturne_value: Some(b.len().to_string()),
                description: format!("{path} has {} elements vs {}", a.len(), b.len()),
            });
        } else if a != b {
            // Same elements in a different order is benign.
            let mut a_rendered: Vec<String> = a.iter().map(|v| v.to_string()).collect();
            let mut b_rendered: Vec<String> = b.iter().map(|v| v.to_string()).collect();
            a_rendered.sort_unstable();
            b_rendered.sort_unstable();
            if a_rendered == b_rendered {
                out.push(Discrepancy {
                    kind: DiscrepancyKind::FieldValueMismatch,
                    severity: Severity::Minor,
                    field_path: path.to_string(),
                    nightscout_value: None,
                    nocturne_value: None,
                    description: format!("{path} contains the same elements in a different order"),
                });
                return;
            }
        }
        for (index, (a_item, b_item)) in a.iter().zip(b.iter()).enumerate() {
            self.diff_value(&format!("{path}[{index}]"), a_item, b_item, out);
        }
    }

    fn value_mismatch(&self, path: &str, a: &Value, b: &Value) -> Discrepancy {
        Discrepancy {
            kind: DiscrepancyKind::FieldValueMismatch,
            severity: self.value_severity(field_name(path)),
            field_path: path.to_string(),
            nightscout_value: Some(render(a)),
            nocturne_value: Some(render(b)),
            description: format!("{path}: {} vs {}", render(a), render(b)),
        }
    }

    /// Severity for a field missing on one side.
    fn presence_severity(&self, name: &str) -> Severity {
        if self.policy.ignored_fields.iter().any(|f| f == name) {
            Severity::Minor
        } else {
            Severity::Critical
        }
    }

    /// Severity for a value or type difference on a field present on both
    /// sides.
    fn value_severity(&self, name: &str) -> Severity {
        if self.policy.ignored_fields.iter().any(|f| f == name) {
            Severity::Minor
        } else if self.policy.critical_fields.iter().any(|f| f == name) {
            Severity::Critical
        } else {
            Severity::Major
        }
    }
}

/// Last path segment with any array index stripped: `$.entries[3].sgv` → `sgv`.
fn field_name(path: &str) -> &str {
    let tail = path.rsplit('.').next().unwrap_or(path);
    tail.split_once('[').map(|(name, _)| name).unwrap_or(tail)
}

fn declares_json(response: &TargetResponse) -> bool {
    response
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.contains("json"))
}

fn render(value: &Value) -> String {
    let mut rendered = value.to_string();
    if rendered.len() > MAX_RENDERED_VALUE {
        rendered.truncate(MAX_RENDERED_VALUE);
        rendered.push_str("...");
    }
    rendered
}

fn render_status(status: Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn summarize(overall: MatchKind, discrepancies: &[Discrepancy]) -> String {
    if discrepancies.is_empty() {
        return "responses match exactly".to_string();
    }
    let critical = discrepancies
        .iter()
        .filter(|d| d.severity == Severity::Critical)
        .count();
    let major = discrepancies
        .iter()
        .filter(|d| d.severity == Severity::Major)
        .count();
    let minor = discrepancies
        .iter()
        .filter(|d| d.severity == Severity::Minor)
        .count();
    let first = &discrepancies[0].description;
    format!(
        "{overall}: {} discrepancies ({critical} critical, {major} major, {minor} minor); first: {first}",
        discrepancies.len()
    )
}
