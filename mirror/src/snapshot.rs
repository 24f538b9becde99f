//! Immutable capture of an inbound request.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{HeaderMap, Method};
use shared::http::filter_hop_by_hop;

/// Everything the forwarder needs to replay a request against both backends:
/// method, path+query, the filtered header set, and the collected body.
///
/// Hop-by-hop and transport headers (connection-scoped headers, host,
/// content-length) are stripped at construction; the snapshot never changes
/// afterwards.
#[derive(Clone, Debug)]
pub struct RequestSnapshot {
    method: Method,
    path_and_query: String,
    content_type: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestSnapshot {
    pub fn new(parts: &http::request::Parts, body: Bytes) -> Self {
        let mut headers = parts.headers.clone();
        filter_hop_by_hop(&mut headers, parts.version);
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        RequestSnapshot {
            method: parts.method.clone(),
            path_and_query,
            content_type,
            headers,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        self.path_and_query
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(&self.path_and_query)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_safe_method(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}
