//! On-disk config layers
//!
//! Every field is optional so a layer only overrides what it actually sets.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct RawRteConfig {
    #[serde(default)]
    pub persistence: RawPersistenceConfig,
    #[serde(default)]
    pub session: RawSessionConfig,
    #[serde(default)]
    pub storage: RawStorageConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPersistenceConfig {
    pub max_attempts: Option<u32>,
    pub backoff_ms: Option<Vec<u64>>,
    pub replay_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawSessionConfig {
    pub grace_period_ms: Option<u64>,
    pub lease_ttl_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawStorageConfig {
    pub database: Option<PathBuf>,
}
