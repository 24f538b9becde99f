use crate::selector::Strategy;
use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("port cannot be 0")]
    InvalidPort,

    #[error("A/B percentage must be within [0, 100], got {0}")]
    PercentageOutOfRange(i32),

    #[error("timeout for endpoint prefix {0:?} cannot be 0")]
    ZeroEndpointTimeout(String),

    #[error("default timeout cannot be 0")]
    ZeroDefaultTimeout,

    #[error("cache TTL cannot be 0 when the cache is enabled")]
    ZeroCacheTtl,

    #[error("at least one backend URL must be configured")]
    NoBackends,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// Response cache configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Absolute TTL for cached entries; the sliding idle window is TTL/4.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Path fragments that identify volatile endpoints which must never be
    /// served from cache.
    #[serde(default = "default_cache_denylist")]
    pub denylist: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: false,
            ttl_secs: default_cache_ttl_secs(),
            denylist: default_cache_denylist(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_cache_denylist() -> Vec<String> {
    ["status", "heartbeat", "health", "time"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Severity policy applied by the comparator.
///
/// Which fields are critical is deployment-specific configuration rather than
/// code: primary-key-like fields default to critical, everything else to major,
/// and explicitly ignored fields are downgraded to minor.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ComparisonPolicy {
    #[serde(default = "default_critical_fields")]
    pub critical_fields: Vec<String>,
    #[serde(default)]
    pub ignored_fields: Vec<String>,
    /// Numeric values differing by no more than this are considered equal.
    #[serde(default = "default_numeric_tolerance")]
    pub numeric_tolerance: f64,
}

impl Default for ComparisonPolicy {
    fn default() -> Self {
        ComparisonPolicy {
            critical_fields: default_critical_fields(),
            ignored_fields: Vec::new(),
            numeric_tolerance: default_numeric_tolerance(),
        }
    }
}

fn default_critical_fields() -> Vec<String> {
    ["_id", "id", "date", "sgv", "type"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_numeric_tolerance() -> f64 {
    0.001
}

/// Mirror proxy configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MirrorConfig {
    /// Main listener for mirrored traffic
    #[serde(default)]
    pub listener: Listener,
    /// Legacy backend base URL; a missing URL degrades that leg at request
    /// time rather than failing startup.
    pub nightscout_url: Option<Url>,
    /// Candidate backend base URL
    pub nocturne_url: Option<Url>,
    /// Which response is returned to the caller
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Path prefix to timeout overrides; the longest matching prefix wins.
    #[serde(default)]
    pub endpoint_timeouts: IndexMap<String, u64>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default = "default_true")]
    pub correlation_enabled: bool,
    /// Substrings replaced with a redaction marker before any failure message
    /// is stored or returned.
    #[serde(default)]
    pub redact: Vec<String>,
    #[serde(default)]
    pub comparison: ComparisonPolicy,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl MirrorConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;

        if self.nightscout_url.is_none() && self.nocturne_url.is_none() {
            return Err(ValidationError::NoBackends);
        }
        if self.default_timeout_secs == 0 {
            return Err(ValidationError::ZeroDefaultTimeout);
        }
        for (prefix, secs) in &self.endpoint_timeouts {
            if *secs == 0 {
                return Err(ValidationError::ZeroEndpointTimeout(prefix.clone()));
            }
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ValidationError::ZeroCacheTtl);
        }
        if let Strategy::AbTest { percentage } = self.strategy
            && !(0..=100).contains(&percentage)
        {
            return Err(ValidationError::PercentageOutOfRange(percentage));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
            nightscout_url: "http://legacy.internal:1337"
            nocturne_url: "http://candidate.internal:5000"
        "#
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: MirrorConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy, Strategy::Compare);
        assert_eq!(config.default_timeout_secs, 30);
        assert!(config.correlation_enabled);
        assert!(!config.cache.enabled);
        assert!(config.cache.denylist.contains(&"heartbeat".to_string()));
    }

    #[test]
    fn test_single_backend_is_valid() {
        let config: MirrorConfig = serde_yaml::from_str(
            r#"
            nightscout_url: "http://legacy.internal:1337"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_backends_rejected() {
        let config: MirrorConfig = serde_yaml::from_str("strategy: { kind: fastest }").unwrap();
        assert_eq!(config.validate(), Err(ValidationError::NoBackends));
    }

    #[test]
    fn test_abtest_percentage_bounds() {
        let config: MirrorConfig = serde_yaml::from_str(
            r#"
            nightscout_url: "http://legacy.internal:1337"
            strategy:
              kind: abtest
              percentage: 120
            "#,
        )
        .unwrap();
        assert_eq!(
            config.validate(),
            Err(ValidationError::PercentageOutOfRange(120))
        );
    }

    #[test]
    fn test_zero_endpoint_timeout_rejected() {
        let config: MirrorConfig = serde_yaml::from_str(
            r#"
            nightscout_url: "http://legacy.internal:1337"
            endpoint_timeouts:
              /api/v1/entries: 0
            "#,
        )
        .unwrap();
        assert_eq!(
            config.validate(),
            Err(ValidationError::ZeroEndpointTimeout(
                "/api/v1/entries".to_string()
            ))
        );
    }
}
