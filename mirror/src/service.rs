//! Hyper service for the mirrored-traffic listener.

use crate::config::MirrorConfig;
use crate::correlation::{self, CorrelationTracker};
use crate::forwarder::{CORRELATION_HEADER, DualDispatcher};
use crate::metrics_defs::REQUEST_DURATION;
use crate::recorder::AnalysisSink;
use crate::snapshot::RequestSnapshot;
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{HeaderValue, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::service::Service as HyperService;
use hyper::{Request, Response};
use shared::histogram;
use shared::http::make_error_response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Inbound bodies above this size are rejected before they are buffered.
const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

struct Inner {
    dispatcher: DualDispatcher,
    tracker: CorrelationTracker,
}

/// One clonable service instance handles all connections; per-request state
/// lives in the snapshot and the correlation scope.
#[derive(Clone)]
pub struct MirrorService {
    inner: Arc<Inner>,
}

impl MirrorService {
    pub fn new(config: &MirrorConfig, sink: Option<Arc<dyn AnalysisSink>>) -> Self {
        MirrorService {
            inner: Arc::new(Inner {
                dispatcher: DualDispatcher::new(config, sink),
                tracker: CorrelationTracker::new(config.correlation_enabled),
            }),
        }
    }
}

impl HyperService<Request<Incoming>> for MirrorService {
    type Response = Response<BoxBody<Bytes, hyper::Error>>;
    type Error = hyper::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move {
            let started = Instant::now();
            let (parts, body) = req.into_parts();

            let Some(body) = collect_limited(body, MAX_REQUEST_BODY_BYTES).await else {
                return Ok(make_error_response(StatusCode::BAD_REQUEST));
            };
            let snapshot = RequestSnapshot::new(&parts, body);

            let correlation_id = inner.tracker.issue();
            let outcome = correlation::with_correlation(correlation_id, async {
                inner.dispatcher.forward(&snapshot).await
            })
            .await;

            let mut response = Response::new(
                Full::new(outcome.body).map_err(|e| match e {}).boxed(),
            );
            *response.status_mut() =
                StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::BAD_GATEWAY);
            *response.headers_mut() = outcome.headers;
            // hyper recomputes framing for the collected body
            response.headers_mut().remove(CONTENT_LENGTH);
            if !outcome.correlation_id.is_empty()
                && let Ok(value) = HeaderValue::from_str(&outcome.correlation_id)
            {
                response.headers_mut().insert(CORRELATION_HEADER, value);
            }

            histogram!(REQUEST_DURATION).record(started.elapsed().as_millis() as f64);
            Ok(response)
        })
    }
}

/// Buffers the request body, refusing to read past `limit` bytes. `None` means
/// the body was oversized or the read failed; the caller answers 400.
async fn collect_limited<B>(body: B, limit: usize) -> Option<Bytes>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Some(collected.to_bytes()),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_body_within_cap_is_collected() {
        let body = Full::new(Bytes::from_static(b"{\"sgv\":120}"));
        let collected = collect_limited(body, MAX_REQUEST_BODY_BYTES).await.unwrap();
        assert_eq!(collected.as_ref(), b"{\"sgv\":120}");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let body = Full::new(Bytes::from(vec![0u8; MAX_REQUEST_BODY_BYTES + 1]));
        assert!(collect_limited(body, MAX_REQUEST_BODY_BYTES).await.is_none());

        // Exactly at the cap still goes through.
        let body = Full::new(Bytes::from(vec![0u8; 64]));
        assert!(collect_limited(body, 64).await.is_some());
    }
}
