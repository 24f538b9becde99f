//! Read-only dashboard API over the analysis store.

use crate::error::Error;
use crate::reports::{self, MigrationAssessment};
use crate::store::AnalysisStore;
use crate::types::{AnalysisDetail, AnalysisFilter, AnalysisSummary, CompatibilityMetrics, EndpointMetrics};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use mirror::config::Listener;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum DashboardError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub fn router(store: Arc<AnalysisStore>) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .route("/endpoints", get(get_endpoints))
        .route("/analyses", get(list_analyses))
        .route("/analyses/{id}", get(get_analysis))
        .route("/reports/migration-assessment", get(get_assessment))
        .route("/reports/text", get(get_text_report))
        .with_state(store)
}

pub async fn serve(listener: Listener, store: Arc<AnalysisStore>) -> Result<(), DashboardError> {
    let app = router(store);
    let addr = format!("{}:{}", listener.host, listener.port);
    tracing::info!(%addr, "dashboard API listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct WindowParams {
    from_date: Option<String>,
    to_date: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    request_path: Option<String>,
    overall_match: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    count: Option<u32>,
    skip: Option<u32>,
}

/// Bad dates are a client error, not a 500.
#[derive(Debug)]
struct BadParam(String);

impl IntoResponse for BadParam {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorResponse {
            error_message: self.0,
        });
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

fn parse_date(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, BadParam> {
    match value {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|e| BadParam(format!("invalid {name}: {e}"))),
    }
}

#[derive(Debug)]
enum ApiError {
    Bad(BadParam),
    Store(Error),
}

impl From<BadParam> for ApiError {
    fn from(e: BadParam) -> Self {
        ApiError::Bad(e)
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Bad(e) => e.into_response(),
            ApiError::Store(Error::NotFound(id)) => {
                let body = Json(ApiErrorResponse {
                    error_message: format!("analysis not found: {id}"),
                });
                (StatusCode::NOT_FOUND, body).into_response()
            }
            ApiError::Store(e) => {
                tracing::error!(error = %e, "dashboard query failed");
                let body = Json(ApiErrorResponse {
                    error_message: e.to_string(),
                });
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

async fn get_metrics(
    State(store): State<Arc<AnalysisStore>>,
    Query(params): Query<WindowParams>,
) -> Result<Json<CompatibilityMetrics>, ApiError> {
    let from = parse_date("fromDate", params.from_date.as_deref())?;
    let to = parse_date("toDate", params.to_date.as_deref())?;
    Ok(Json(store.metrics(from, to)?))
}

async fn get_endpoints(
    State(store): State<Arc<AnalysisStore>>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<EndpointMetrics>>, ApiError> {
    let from = parse_date("fromDate", params.from_date.as_deref())?;
    let to = parse_date("toDate", params.to_date.as_deref())?;
    Ok(Json(store.endpoint_metrics(from, to)?))
}

async fn list_analyses(
    State(store): State<Arc<AnalysisStore>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AnalysisSummary>>, ApiError> {
    let filter = AnalysisFilter {
        request_path: params.request_path,
        overall_match: params.overall_match,
        from: parse_date("fromDate", params.from_date.as_deref())?,
        to: parse_date("toDate", params.to_date.as_deref())?,
        count: params.count,
        skip: params.skip,
    };
    Ok(Json(store.list(&filter)?))
}

async fn get_analysis(
    State(store): State<Arc<AnalysisStore>>,
    Path(id): Path<i64>,
) -> Result<Json<AnalysisDetail>, ApiError> {
    match store.get(id)? {
        Some(detail) => Ok(Json(detail)),
        None => Err(Error::NotFound(id).into()),
    }
}

async fn get_assessment(
    State(store): State<Arc<AnalysisStore>>,
    Query(params): Query<WindowParams>,
) -> Result<Json<MigrationAssessment>, ApiError> {
    let from = parse_date("fromDate", params.from_date.as_deref())?;
    let to = parse_date("toDate", params.to_date.as_deref())?;
    Ok(Json(reports::migration_assessment(&store, from, to)?))
}

async fn get_text_report(
    State(store): State<Arc<AnalysisStore>>,
    Query(params): Query<WindowParams>,
) -> Result<String, ApiError> {
    let from = parse_date("fromDate", params.from_date.as_deref())?;
    let to = parse_date("toDate", params.to_date.as_deref())?;
    let assessment = reports::migration_assessment(&store, from, to)?;
    Ok(reports::text_report(&assessment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::sample_analysis;
    use mirror::types::MatchKind;

    fn seeded_store() -> Arc<AnalysisStore> {
        let store = AnalysisStore::open_in_memory().unwrap();
        store
            .insert(&sample_analysis(
                "INT-1",
                "/api/v1/entries",
                MatchKind::Perfect,
                Vec::new(),
                Utc::now(),
            ))
            .unwrap();
        store
            .insert(&sample_analysis(
                "INT-2",
                "/api/v1/treatments",
                MatchKind::MajorDifferences,
                Vec::new(),
                Utc::now(),
            ))
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_get_metrics_counts_window() {
        let store = seeded_store();
        let Json(metrics) = get_metrics(State(store), Query(WindowParams::default()))
            .await
            .unwrap();
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.perfect, 1);
        assert_eq!(metrics.major_differences, 1);
    }

    #[tokio::test]
    async fn test_list_analyses_filters_by_path() {
        let store = seeded_store();
        let Json(listed) = list_analyses(
            State(store),
            Query(ListParams {
                request_path: Some("/api/v1/entries".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].correlation_id, "INT-1");
    }

    #[tokio::test]
    async fn test_get_analysis_not_found_is_404() {
        let store = seeded_store();
        let err = get_analysis(State(store), Path(999)).await.err().unwrap();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_date_is_400() {
        let store = seeded_store();
        let err = get_metrics(
            State(store),
            Query(WindowParams {
                from_date: Some("yesterday".to_string()),
                to_date: None,
            }),
        )
        .await
        .err()
        .unwrap();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_text_report_endpoint() {
        let store = seeded_store();
        let text = get_text_report(State(store), Query(WindowParams::default()))
            .await
            .unwrap();
        assert!(text.contains("MIGRATION ASSESSMENT"));
    }
}
