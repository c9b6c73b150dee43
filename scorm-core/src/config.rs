//! Runtime configuration
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::persistence::RetryPolicy;

/// Default number of backend write attempts per snapshot
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default unmount flush window in milliseconds
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2000;
/// Default lifetime of the backend writer lease in milliseconds
pub const DEFAULT_LEASE_TTL_MS: u64 = 120_000;

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_ms() -> Vec<u64> {
    vec![0, 250, 1000]
}

fn default_replay_dir() -> PathBuf {
    scorm_paths::replay_dir()
}

fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}

fn default_lease_ttl_ms() -> u64 {
    DEFAULT_LEASE_TTL_MS
}

fn default_database() -> PathBuf {
    scorm_paths::database_path()
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RteConfig {
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[persistence]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before each attempt; later attempts reuse the last entry
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
    #[serde(default = "default_replay_dir")]
    pub replay_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            replay_dir: default_replay_dir(),
        }
    }
}

/// `[session]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// How long a session's claim on a (user, package) outlives its last renewal
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            lease_ttl_ms: default_lease_ttl_ms(),
        }
    }
}

/// `[storage]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

impl RteConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: RteConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persistence.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "persistence.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.session.lease_ttl_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "session.lease_ttl_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.persistence.max_attempts,
            self.persistence
                .backoff_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
        )
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.session.grace_period_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.session.lease_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = RteConfig::from_toml("").unwrap();
        assert_eq!(config, RteConfig::default());
        assert_eq!(config.persistence.max_attempts, 3);
        assert_eq!(config.persistence.backoff_ms, vec![0, 250, 1000]);
        assert_eq!(config.grace_period(), Duration::from_secs(2));
        assert_eq!(config.lease_ttl(), Duration::from_secs(120));
        assert!(config.storage.database.ends_with("attempts.db"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = RteConfig::from_toml(
            r#"
            [persistence]
            max_attempts = 5

            [session]
            grace_period_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.persistence.max_attempts, 5);
        assert_eq!(config.persistence.backoff_ms, vec![0, 250, 1000]);
        assert_eq!(config.grace_period(), Duration::from_millis(500));
    }

    #[test]
    fn retry_policy_follows_backoff_table() {
        let config = RteConfig::from_toml(
            r#"
            [persistence]
            max_attempts = 2
            backoff_ms = [10, 20]
            "#,
        )
        .unwrap();
        let mut policy = config.retry_policy();
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(20)));
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let result = RteConfig::from_toml("[persistence]\nmax_attempts = 0");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_lease_ttl_is_rejected() {
        let result = RteConfig::from_toml("[session]\nlease_ttl_ms = 0");
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "session.lease_ttl_ms"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = RteConfig::from_toml("[persistence\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
