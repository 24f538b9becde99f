//! SQLite-backed analysis store.
//!
//! One `AnalysisRecord` plus its discrepancy children are written in a single
//! transaction; different requests' records are independent. Aggregations are
//! computed on demand from the persisted rows.

use crate::error::{Error, Result};
use crate::schema;
use crate::types::{
    AnalysisDetail, AnalysisFilter, AnalysisSummary, CompatibilityMetrics, DiscrepancyDetail,
    EndpointMetrics,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use mirror::recorder::{AnalysisSink, NewAnalysis, SinkError};
use mirror::types::{MatchKind, Severity};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const DEFAULT_PAGE: u32 = 50;
const MAX_PAGE: u32 = 500;

/// Rows deleted per purge statement, so the connection lock is released
/// between batches and in-flight recording is never stalled behind one long
/// DELETE.
const PURGE_BATCH: usize = 500;

const COLUMNS: &str = "id, correlation_id, timestamp, method, path, overall_match, \
     status_match, body_match, nightscout_status, nocturne_status, nightscout_ms, \
     nocturne_ms, total_ms, summary, selected_target, selection_rationale, \
     critical_count, major_count, minor_count, nightscout_missing, nocturne_missing, \
     error_message";

/// Cheaply clonable handle to one SQLite database.
#[derive(Clone)]
pub struct AnalysisStore {
    conn: Arc<Mutex<Connection>>,
}

impl AnalysisStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Foreign keys drive the cascade delete of discrepancy children
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        schema::migrate(&conn)?;
        Ok(AnalysisStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persists one analysis with its discrepancy children atomically.
    pub fn insert(&self, analysis: &NewAnalysis) -> Result<i64> {
        let comparison = &analysis.comparison;
        let critical = comparison.count_by_severity(Severity::Critical) as i64;
        let major = comparison.count_by_severity(Severity::Major) as i64;
        let minor = comparison.count_by_severity(Severity::Minor) as i64;
        let nightscout_missing = matches!(
            comparison.overall,
            MatchKind::NightscoutMissing | MatchKind::BothMissing
        );
        let nocturne_missing = matches!(
            comparison.overall,
            MatchKind::NocturneMissing | MatchKind::BothMissing
        );

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO analyses (correlation_id, timestamp, method, path, overall_match,
                 status_match, body_match, nightscout_status, nocturne_status, nightscout_ms,
                 nocturne_ms, total_ms, summary, selected_target, selection_rationale,
                 critical_count, major_count, minor_count, nightscout_missing,
                 nocturne_missing, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                 ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                analysis.correlation_id,
                fmt_ts(&analysis.timestamp),
                analysis.method,
                analysis.path,
                comparison.overall.as_str(),
                comparison.status_match,
                comparison.body_match,
                analysis.nightscout_status,
                analysis.nocturne_status,
                comparison.nightscout_ms as i64,
                comparison.nocturne_ms as i64,
                analysis.total_ms as i64,
                comparison.summary,
                analysis.selected_target.as_str(),
                analysis.selection_rationale,
                critical,
                major,
                minor,
                nightscout_missing,
                nocturne_missing,
                analysis.error_message,
            ],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO discrepancies (analysis_id, position, kind, severity,
                     field_path, nightscout_value, nocturne_value, description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (position, d) in comparison.discrepancies.iter().enumerate() {
                stmt.execute(params![
                    id,
                    position as i64,
                    d.kind.as_str(),
                    d.severity as i64,
                    d.field_path,
                    d.nightscout_value,
                    d.nocturne_value,
                    d.description,
                ])?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    /// Full record with its ordered discrepancy children.
    pub fn get(&self, id: i64) -> Result<Option<AnalysisDetail>> {
        let conn = self.conn();
        let summary = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM analyses WHERE id = ?1"),
                params![id],
                row_to_summary,
            )
            .optional()?;
        let Some(summary) = summary else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT kind, severity, field_path, nightscout_value, nocturne_value, description
             FROM discrepancies WHERE analysis_id = ?1 ORDER BY position",
        )?;
        let discrepancies = stmt
            .query_map(params![id], |row| {
                let ordinal: i64 = row.get(1)?;
                Ok(DiscrepancyDetail {
                    kind: row.get(0)?,
                    severity: Severity::from_ordinal(ordinal)
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_else(|| ordinal.to_string()),
                    field_path: row.get(2)?,
                    nightscout_value: row.get(3)?,
                    nocturne_value: row.get(4)?,
                    description: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(AnalysisDetail {
            summary,
            discrepancies,
        }))
    }

    /// Newest-first page of summaries matching the filter.
    pub fn list(&self, filter: &AnalysisFilter) -> Result<Vec<AnalysisSummary>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut bind: Vec<String> = Vec::new();
        if let Some(path) = &filter.request_path {
            clauses.push("path = ?");
            bind.push(path.clone());
        }
        if let Some(overall) = &filter.overall_match {
            clauses.push("overall_match = ?");
            bind.push(overall.clone());
        }
        if let Some(from) = &filter.from {
            clauses.push("timestamp >= ?");
            bind.push(fmt_ts(from));
        }
        if let Some(to) = &filter.to {
            clauses.push("timestamp <= ?");
            bind.push(fmt_ts(to));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let count = filter.count.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
        let skip = filter.skip.unwrap_or(0);

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM analyses {where_clause}
             ORDER BY timestamp DESC, id DESC LIMIT {count} OFFSET {skip}"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(bind), row_to_summary)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Compatibility metrics over a time window.
    pub fn metrics(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<CompatibilityMetrics> {
        metrics_on(&self.conn(), None, from, to)
    }

    /// Per-path metrics over a time window, worst compatibility first.
    pub fn endpoint_metrics(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<EndpointMetrics>> {
        let conn = self.conn();
        let (where_clause, bind) = window_clause(None, &from, &to);
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT path FROM analyses {where_clause} ORDER BY path"
        ))?;
        let paths = stmt
            .query_map(params_from_iter(bind), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut endpoints = Vec::with_capacity(paths.len());
        for path in paths {
            let metrics = metrics_on(&conn, Some(&path), from, to)?;
            endpoints.push(EndpointMetrics { path, metrics });
        }
        endpoints.sort_by(|a, b| {
            a.metrics
                .compatibility_score
                .total_cmp(&b.metrics.compatibility_score)
        });
        Ok(endpoints)
    }

    /// Deletes analyses older than the cutoff; children cascade. Deletion
    /// happens in batches so the lock is yielded between statements.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.purge_in_batches(cutoff, PURGE_BATCH)
    }

    fn purge_in_batches(&self, cutoff: DateTime<Utc>, batch: usize) -> Result<usize> {
        let cutoff = fmt_ts(&cutoff);
        let mut total = 0;
        loop {
            let deleted = self.conn().execute(
                &format!(
                    "DELETE FROM analyses WHERE id IN
                         (SELECT id FROM analyses WHERE timestamp < ?1 LIMIT {batch})"
                ),
                params![cutoff],
            )?;
            total += deleted;
            if deleted < batch {
                return Ok(total);
            }
        }
    }
}

#[async_trait]
impl AnalysisSink for AnalysisStore {
    /// rusqlite calls block, so the insert is moved off the async worker.
    async fn record(&self, analysis: NewAnalysis) -> std::result::Result<i64, SinkError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.insert(&analysis))
            .await
            .map_err(|e| SinkError(e.to_string()))?
            .map_err(|e| SinkError(e.to_string()))
    }
}

/// Fixed-width RFC 3339 so string comparison in SQL matches time order.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn window_clause(
    path: Option<&str>,
    from: &Option<DateTime<Utc>>,
    to: &Option<DateTime<Utc>>,
) -> (String, Vec<String>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut bind: Vec<String> = Vec::new();
    if let Some(path) = path {
        clauses.push("path = ?");
        bind.push(path.to_string());
    }
    if let Some(from) = from {
        clauses.push("timestamp >= ?");
        bind.push(fmt_ts(from));
    }
    if let Some(to) = to {
        clauses.push("timestamp <= ?");
        bind.push(fmt_ts(to));
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (where_clause, bind)
}

fn metrics_on(
    conn: &Connection,
    path: Option<&str>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<CompatibilityMetrics> {
    let (where_clause, bind) = window_clause(path, &from, &to);

    let (total, avg_nightscout_ms, avg_nocturne_ms, critical_discrepancies): (i64, f64, f64, i64) =
        conn.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(AVG(nightscout_ms), 0.0),
                     COALESCE(AVG(nocturne_ms), 0.0), COALESCE(SUM(critical_count), 0)
                 FROM analyses {where_clause}"
            ),
            params_from_iter(bind.clone()),
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

    if total == 0 {
        return Ok(CompatibilityMetrics::empty());
    }

    let mut metrics = CompatibilityMetrics {
        total,
        avg_nightscout_ms,
        avg_nocturne_ms,
        critical_discrepancies,
        ..CompatibilityMetrics::empty()
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT overall_match, COUNT(*) FROM analyses {where_clause} GROUP BY overall_match"
    ))?;
    let counts = stmt
        .query_map(params_from_iter(bind), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (overall, count) in counts {
        match overall.parse::<MatchKind>() {
            Ok(MatchKind::Perfect) => metrics.perfect = count,
            Ok(MatchKind::MinorDifferences) => metrics.minor_differences = count,
            Ok(MatchKind::MajorDifferences) => metrics.major_differences = count,
            Ok(MatchKind::CriticalDifferences) => metrics.critical_differences = count,
            Ok(MatchKind::NightscoutMissing) => metrics.nightscout_missing = count,
            Ok(MatchKind::NocturneMissing) => metrics.nocturne_missing = count,
            Ok(MatchKind::BothMissing) => metrics.both_missing = count,
            Ok(MatchKind::ComparisonError) => metrics.comparison_error = count,
            Err(_) => return Err(Error::Corrupt(format!("overall_match {overall:?}"))),
        }
    }
    metrics.compatibility_score = CompatibilityMetrics::score_of(
        metrics.perfect,
        metrics.minor_differences,
        metrics.total,
    );
    Ok(metrics)
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<AnalysisSummary> {
    let raw_ts: String = row.get(2)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw_ts)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(AnalysisSummary {
        id: row.get(0)?,
        correlation_id: row.get(1)?,
        timestamp,
        method: row.get(3)?,
        path: row.get(4)?,
        overall_match: row.get(5)?,
        status_match: row.get(6)?,
        body_match: row.get(7)?,
        nightscout_status: row.get(8)?,
        nocturne_status: row.get(9)?,
        nightscout_ms: row.get(10)?,
        nocturne_ms: row.get(11)?,
        total_ms: row.get(12)?,
        summary: row.get(13)?,
        selected_target: row.get(14)?,
        selection_rationale: row.get(15)?,
        critical_count: row.get(16)?,
        major_count: row.get(17)?,
        minor_count: row.get(18)?,
        nightscout_missing: row.get(19)?,
        nocturne_missing: row.get(20)?,
        error_message: row.get(21)?,
    })
}
