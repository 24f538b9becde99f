//! Response cache keyed by a content-derived hash of the request.
//!
//! Only safe-method, bodiless requests outside the volatile-endpoint denylist
//! are cacheable, and only successful, size-bounded selected responses are
//! stored. Every path degrades to "not cached" rather than failing.

use crate::config::CacheConfig;
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use crate::snapshot::RequestSnapshot;
use crate::types::TargetResponse;
use bytes::Bytes;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use shared::counter;
use std::time::Duration;

/// Bodies above this size are never cached.
const MAX_BODY_BYTES: usize = 1024 * 1024;

const CAPACITY: u64 = 10_000;

/// Headers whose values carry caller identity and must be part of the key so
/// one caller's cached response is never served to another.
const IDENTITY_HEADERS: &[&str] = &["authorization", "api-secret"];

#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

pub struct ResponseCache {
    inner: Option<Cache<String, CachedResponse>>,
    denylist: Vec<String>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let inner = config.enabled.then(|| {
            let ttl = Duration::from_secs(config.ttl_secs);
            Cache::builder()
                .max_capacity(CAPACITY)
                .time_to_live(ttl)
                // Sliding window: entries idle for a quarter of the TTL expire
                // early.
                .time_to_idle(ttl / 4)
                .build()
        });
        ResponseCache {
            inner,
            denylist: config.denylist.clone(),
        }
    }

    /// Deterministic key over method, path+query, caller identity headers, and
    /// a digest of the body. `None` means "do not cache" (cache disabled).
    pub fn key(&self, snapshot: &RequestSnapshot) -> Option<String> {
        self.inner.as_ref()?;

        let mut hasher = Sha256::new();
        hasher.update(snapshot.method().as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(snapshot.path_and_query().as_bytes());
        hasher.update(b"\n");
        for name in IDENTITY_HEADERS {
            if let Some(value) = snapshot.headers().get(*name) {
                hasher.update(value.as_bytes());
                hasher.update(b"\n");
            }
        }
        if !snapshot.body().is_empty() {
            hasher.update(Sha256::digest(snapshot.body()));
        }
        Some(hex::encode(hasher.finalize()))
    }

    /// Whether this request is eligible for caching at all: safe method, no
    /// body, and not a volatile endpoint.
    pub fn should_cache(&self, snapshot: &RequestSnapshot) -> bool {
        self.inner.is_some()
            && snapshot.is_safe_method()
            && snapshot.body().is_empty()
            && !self
                .denylist
                .iter()
                .any(|fragment| snapshot.path().contains(fragment.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let cache = self.inner.as_ref()?;
        let entry = cache.get(key);
        if entry.is_some() {
            counter!(CACHE_HIT).increment(1);
        } else {
            counter!(CACHE_MISS).increment(1);
        }
        entry
    }

    /// Stores the selected response if it is successful and under the size
    /// cap. Anything else is silently skipped.
    pub fn put(&self, key: String, response: &TargetResponse) {
        let Some(cache) = self.inner.as_ref() else {
            return;
        };
        if !response.success || response.body.len() > MAX_BODY_BYTES {
            return;
        }
        let Some(status) = response.status else {
            return;
        };
        cache.insert(
            key,
            CachedResponse {
                status,
                content_type: response.content_type.clone(),
                body: response.body.clone(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;
    use http::{HeaderMap, Method, Request};

    fn enabled_cache() -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            enabled: true,
            ttl_secs: 60,
            denylist: vec!["status".into(), "heartbeat".into()],
        })
    }

    fn snapshot(method: Method, uri: &str, body: &'static [u8]) -> RequestSnapshot {
        let (parts, ()) = Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        RequestSnapshot::new(&parts, Bytes::from_static(body))
    }

    fn ok_response(body: &'static [u8]) -> TargetResponse {
        TargetResponse::received(
            Target::Nightscout,
            200,
            HeaderMap::new(),
            Bytes::from_static(body),
            Duration::from_millis(5),
        )
    }

    #[test]
    fn test_disabled_cache_yields_no_key() {
        let cache = ResponseCache::new(&CacheConfig::default());
        let snap = snapshot(Method::GET, "/api/v1/entries", b"");
        assert_eq!(cache.key(&snap), None);
        assert!(!cache.should_cache(&snap));
        assert!(cache.get("anything").is_none());
    }

    #[test]
    fn test_key_is_deterministic_and_identity_aware() {
        let cache = enabled_cache();
        let snap = snapshot(Method::GET, "/api/v1/entries?count=2", b"");
        assert_eq!(cache.key(&snap), cache.key(&snap));

        let (parts, ()) = Request::builder()
            .method(Method::GET)
            .uri("/api/v1/entries?count=2")
            .header("api-secret", "other-caller")
            .body(())
            .unwrap()
            .into_parts();
        let other = RequestSnapshot::new(&parts, Bytes::new());
        assert_ne!(cache.key(&snap), cache.key(&other));
    }

    #[test]
    fn test_unsafe_methods_and_bodies_are_not_cacheable() {
        let cache = enabled_cache();
        assert!(!cache.should_cache(&snapshot(Method::POST, "/api/v1/entries", b"")));
        assert!(!cache.should_cache(&snapshot(Method::PUT, "/api/v1/entries", b"")));
        assert!(!cache.should_cache(&snapshot(Method::GET, "/api/v1/entries", b"x")));
        assert!(cache.should_cache(&snapshot(Method::GET, "/api/v1/entries", b"")));
        assert!(cache.should_cache(&snapshot(Method::OPTIONS, "/api/v1/entries", b"")));
    }

    #[test]
    fn test_denylisted_paths_are_not_cacheable() {
        let cache = enabled_cache();
        assert!(!cache.should_cache(&snapshot(Method::GET, "/api/v1/status", b"")));
        assert!(!cache.should_cache(&snapshot(Method::GET, "/heartbeat", b"")));
    }

    #[test]
    fn test_round_trip_and_failure_skip() {
        let cache = enabled_cache();
        let snap = snapshot(Method::GET, "/api/v1/entries", b"");
        let key = cache.key(&snap).unwrap();

        cache.put(key.clone(), &ok_response(b"[1,2,3]"));
        let hit = cache.get(&key).unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body.as_ref(), b"[1,2,3]");

        // Unsuccessful responses are never stored.
        let failed = TargetResponse::failed(
            Target::Nightscout,
            "boom".into(),
            Duration::from_millis(1),
        );
        let key2 = format!("{key}-failed");
        cache.put(key2.clone(), &failed);
        assert!(cache.get(&key2).is_none());
    }

    #[test]
    fn test_oversized_bodies_are_not_stored() {
        let cache = enabled_cache();
        let big = TargetResponse::received(
            Target::Nightscout,
            200,
            HeaderMap::new(),
            Bytes::from(vec![0u8; MAX_BODY_BYTES + 1]),
            Duration::from_millis(5),
        );
        cache.put("big".into(), &big);
        assert!(cache.get("big").is_none());
    }
}
