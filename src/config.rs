//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default interval between two flushes of buffered output.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Worker configuration, handed to a participant at construction.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Suppress every message-sink call and keep output locally instead.
    /// Meant for test harnesses.
    pub mock: bool,
    /// Buffered output is held back until this much time has passed since
    /// the previous flush.
    pub flush_interval: Duration,
    /// Directory for rolling log files (stdout only if None).
    pub log_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mock: false,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            log_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Configuration for tests: mock mode on, everything else default.
    pub fn mocked() -> Self {
        Self {
            mock: true,
            ..Self::default()
        }
    }

    /// Load configuration from `WORKITEM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mock = match lookup("WORKITEM_MOCK") {
            Some(v) => parse_bool("WORKITEM_MOCK", &v)?,
            None => false,
        };

        let flush_interval = match lookup("WORKITEM_FLUSH_INTERVAL_MS") {
            Some(v) => {
                let ms: u64 = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "WORKITEM_FLUSH_INTERVAL_MS".to_string(),
                    message: format!("expected milliseconds, got '{v}'"),
                })?;
                Duration::from_millis(ms)
            }
            None => DEFAULT_FLUSH_INTERVAL,
        };

        let log_dir = lookup("WORKITEM_LOG_DIR")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            mock,
            flush_interval,
            log_dir,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = WorkerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(!config.mock);
        assert_eq!(config.flush_interval, DEFAULT_FLUSH_INTERVAL);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_reads_all_values() {
        let config = WorkerConfig::from_lookup(lookup_from(&[
            ("WORKITEM_MOCK", "TRUE"),
            ("WORKITEM_FLUSH_INTERVAL_MS", "500"),
            ("WORKITEM_LOG_DIR", "/var/log/participants"),
        ]))
        .unwrap();
        assert!(config.mock);
        assert_eq!(config.flush_interval, Duration::from_millis(500));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/participants")));
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = WorkerConfig::from_lookup(lookup_from(&[("WORKITEM_MOCK", "maybe")]));
        assert!(matches!(err, Err(ConfigError::InvalidValue { .. })));

        let err =
            WorkerConfig::from_lookup(lookup_from(&[("WORKITEM_FLUSH_INTERVAL_MS", "soon")]));
        assert!(matches!(err, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_mocked() {
        let config = WorkerConfig::mocked();
        assert!(config.mock);
        assert_eq!(config.flush_interval, DEFAULT_FLUSH_INTERVAL);
    }
}
