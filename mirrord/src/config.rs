use analysis::maintenance::MaintenanceConfig;
use mirror::config::{Listener, MirrorConfig, ValidationError};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mirror_analysis.db")
}

#[derive(Deserialize, Debug)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            db_path: default_db_path(),
        }
    }
}

fn default_dashboard_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 3001,
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub mirror: MirrorConfig,
    /// Dashboard API listener, separate from the mirrored-traffic listener.
    #[serde(default = "default_dashboard_listener")]
    pub dashboard: Listener,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;

        config.mirror.validate()?;
        config.dashboard.validate()?;
        Ok(config)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidError(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror::selector::Strategy;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
            mirror:
                listener:
                    host: 0.0.0.0
                    port: 3000
                nightscout_url: "http://legacy.internal:1337"
                nocturne_url: "http://candidate.internal:5000"
                strategy:
                    kind: abtest
                    percentage: 25
                endpoint_timeouts:
                    /api/v1/entries: 10
            dashboard:
                host: 0.0.0.0
                port: 8080
            storage:
                db_path: /var/lib/mirrord/analysis.db
            maintenance:
                retention_days: 14
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                sentry_dsn: "https://key@sentry.invalid/1"
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.mirror.strategy, Strategy::AbTest { percentage: 25 });
        assert_eq!(config.dashboard.port, 8080);
        assert_eq!(
            config.storage.db_path,
            PathBuf::from("/var/lib/mirrord/analysis.db")
        );
        assert_eq!(config.maintenance.retention_days, 14);
        assert_eq!(config.metrics.unwrap().statsd_port, 8125);
        assert!(config.logging.is_some());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let yaml = r#"
            mirror:
                nightscout_url: "http://legacy.internal:1337"
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.dashboard.port, 3001);
        assert_eq!(config.storage.db_path, PathBuf::from("mirror_analysis.db"));
        assert_eq!(config.maintenance.retention_days, 30);
        assert!(config.metrics.is_none());
        assert!(config.logging.is_none());
    }

    #[test]
    fn test_invalid_mirror_config_rejected() {
        let yaml = r#"
            mirror:
                strategy:
                    kind: fastest
            "#;
        let tmp = write_tmp_file(yaml);
        let err = Config::from_file(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidError(ValidationError::NoBackends)
        ));
    }
}
