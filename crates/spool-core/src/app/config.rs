//! SpoolConfig - TOML 設定
//!
//! ```toml
//! store_path = "state/payloads.json"
//! log_filter = "spool=debug,info"
//! poll_interval_ms = 30000
//!
//! [backoff]
//! base_delay_ms = 30000
//! multiplier = 2.0
//! max_delay_ms = 18000000
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::impls::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpoolConfig {
    /// Where the JSON payload store lives.
    pub store_path: PathBuf,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Backoff between RESCHEDULE verdicts in the in-memory backend.
    pub backoff: RetryPolicy,

    /// How long the backend sleeps when nothing is pending.
    poll_interval_ms: u64,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("spool-payloads.json"),
            log_filter: "info".to_string(),
            backoff: RetryPolicy::default(),
            poll_interval_ms: 30_000,
        }
    }
}

impl SpoolConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(SpoolConfig::from_toml("").unwrap(), SpoolConfig::default());
    }

    #[test]
    fn parses_every_key() {
        let config = SpoolConfig::from_toml(
            r#"
            store_path = "/var/lib/spool/payloads.json"
            log_filter = "spool_core=trace"
            poll_interval_ms = 500

            [backoff]
            base_delay_ms = 1000
            multiplier = 3.0
            max_delay_ms = 60000
            "#,
        )
        .unwrap();

        assert_eq!(config.store_path, PathBuf::from("/var/lib/spool/payloads.json"));
        assert_eq!(config.log_filter, "spool_core=trace");
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.backoff.base_delay, Duration::from_secs(1));
        assert_eq!(config.backoff.multiplier, 3.0);
        assert_eq!(config.backoff.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn partial_backoff_keeps_other_defaults() {
        let config = SpoolConfig::from_toml("[backoff]\nmultiplier = 1.5\n").unwrap();
        assert_eq!(config.backoff.multiplier, 1.5);
        assert_eq!(config.backoff.base_delay, RetryPolicy::default().base_delay);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = SpoolConfig::from_toml("stor_path = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_filter = \"debug\"").unwrap();

        let config = SpoolConfig::load(file.path()).unwrap();
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SpoolConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
