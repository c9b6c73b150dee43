use super::types::{RawPersistenceConfig, RawRteConfig, RawSessionConfig, RawStorageConfig};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use scorm_core::RteConfig;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<RteConfig> {
        let mut raw = RawRteConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        Self::finalize(raw)
    }

    /// Load a single file with defaults applied
    pub fn load_from_path(path: &Path) -> Result<RteConfig> {
        Self::finalize(Self::read_raw(path)?)
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "scorm-rte").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with SCORM_RTE_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("SCORM_RTE_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".scorm-rte/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<RawRteConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawRteConfig, overlay: RawRteConfig) -> RawRteConfig {
        RawRteConfig {
            persistence: RawPersistenceConfig {
                max_attempts: overlay
                    .persistence
                    .max_attempts
                    .or(base.persistence.max_attempts),
                backoff_ms: overlay.persistence.backoff_ms.or(base.persistence.backoff_ms),
                replay_dir: overlay.persistence.replay_dir.or(base.persistence.replay_dir),
            },
            session: RawSessionConfig {
                grace_period_ms: overlay
                    .session
                    .grace_period_ms
                    .or(base.session.grace_period_ms),
                lease_ttl_ms: overlay.session.lease_ttl_ms.or(base.session.lease_ttl_ms),
            },
            storage: RawStorageConfig {
                database: overlay.storage.database.or(base.storage.database),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawRteConfig) -> Result<RteConfig> {
        let mut config = RteConfig::default();
        if let Some(max_attempts) = raw.persistence.max_attempts {
            config.persistence.max_attempts = max_attempts;
        }
        if let Some(backoff_ms) = raw.persistence.backoff_ms {
            config.persistence.backoff_ms = backoff_ms;
        }
        if let Some(replay_dir) = raw.persistence.replay_dir {
            config.persistence.replay_dir = replay_dir;
        }
        if let Some(grace_period_ms) = raw.session.grace_period_ms {
            config.session.grace_period_ms = grace_period_ms;
        }
        if let Some(lease_ttl_ms) = raw.session.lease_ttl_ms {
            config.session.lease_ttl_ms = lease_ttl_ms;
        }
        if let Some(database) = raw.storage.database {
            config.storage.database = database;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn raw(toml: &str) -> RawRteConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_overlay_wins_only_where_set() {
        let base = raw("[persistence]\nmax_attempts = 5\nbackoff_ms = [1, 2]\n");
        let overlay = raw("[persistence]\nmax_attempts = 7\n[session]\ngrace_period_ms = 10\n");

        let config = ConfigLoader::finalize(ConfigLoader::merge_raw(base, overlay)).unwrap();
        assert_eq!(config.persistence.max_attempts, 7);
        assert_eq!(config.persistence.backoff_ms, vec![1, 2]);
        assert_eq!(config.session.grace_period_ms, 10);
        assert_eq!(config.session.lease_ttl_ms, 120_000);
    }

    #[test]
    fn test_empty_layers_give_defaults() {
        let config = ConfigLoader::finalize(RawRteConfig::default()).unwrap();
        assert_eq!(config, RteConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result = ConfigLoader::finalize(raw("[persistence]\nmax_attempts = 0\n"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_path_reads_storage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\ndatabase = \"/tmp/x.db\"\n").unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config.storage.database, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    #[serial]
    fn test_project_config_path_honors_env() {
        let dir = TempDir::new().unwrap();
        // SAFETY: serialized with every other test touching this variable
        unsafe { std::env::set_var("SCORM_RTE_PROJECT_CONFIG_DIR", dir.path()) };
        assert_eq!(
            ConfigLoader::project_config_path(),
            dir.path().join("config.toml")
        );
        unsafe { std::env::remove_var("SCORM_RTE_PROJECT_CONFIG_DIR") };
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from(".scorm-rte/config.toml")
        );
    }

    #[test]
    #[serial]
    fn test_project_layer_is_applied() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[session]\ngrace_period_ms = 123\n",
        )
        .unwrap();
        unsafe { std::env::set_var("SCORM_RTE_PROJECT_CONFIG_DIR", dir.path()) };
        let config = ConfigLoader::load();
        unsafe { std::env::remove_var("SCORM_RTE_PROJECT_CONFIG_DIR") };

        assert_eq!(config.unwrap().session.grace_period_ms, 123);
    }
}
