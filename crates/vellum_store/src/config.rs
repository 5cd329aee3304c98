use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use vellum_core::{VellumError, VellumResult};

const DEFAULT_CONFIG_NAME: &str = "vellum.json";
const DEFAULT_PRIMARY_DB: &str = "vellum.sqlite";
const DEFAULT_SECONDARY_DB: &str = "vellum-secondary.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

impl DatabaseConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> VellumResult<PathBuf> {
        match self {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_PRIMARY_DB.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(VellumError::invalid("config is not sqlite backend")),
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match self {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

/// Tuning for the transition engine. Page sizes bound store round-trips;
/// the replication delay expresses the catch-up contract with a replicated
/// primary and must stay a real pause.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionConfig {
    pub user_page_size: Option<u32>,
    pub revision_page_size: Option<u32>,
    pub replication_lag_ms: Option<u64>,
}

impl TransitionConfig {
    pub fn with_defaults() -> Self {
        Self {
            user_page_size: Some(100),
            revision_page_size: Some(100),
            replication_lag_ms: Some(2_000),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VellumConfig {
    pub primary: DatabaseConfig,
    pub secondary: Option<DatabaseConfig>,
    pub pool: Option<PoolConfig>,
    pub transition: Option<TransitionConfig>,
}

impl VellumConfig {
    pub fn default_sqlite(primary_path: impl Into<String>, secondary_path: impl Into<String>) -> Self {
        Self {
            primary: DatabaseConfig::Sqlite {
                path: Some(primary_path.into()),
            },
            secondary: Some(DatabaseConfig::Sqlite {
                path: Some(secondary_path.into()),
            }),
            pool: None,
            transition: Some(TransitionConfig::with_defaults()),
        }
    }

    pub fn load_or_init(base_dir: &Path) -> VellumResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| VellumError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| VellumError::storage(format!("read config: {err}")))?;
            let config: VellumConfig =
                serde_json::from_str(&raw).map_err(|err| VellumError::invalid(err.to_string()))?;
            return Ok(config);
        }
        let default = VellumConfig::default_sqlite(
            base_dir.join(DEFAULT_PRIMARY_DB).to_string_lossy(),
            base_dir.join(DEFAULT_SECONDARY_DB).to_string_lossy(),
        );
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| VellumError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| VellumError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn user_page_size(&self) -> u32 {
        self.transition
            .as_ref()
            .and_then(|cfg| cfg.user_page_size)
            .unwrap_or(100)
    }

    pub fn revision_page_size(&self) -> u32 {
        self.transition
            .as_ref()
            .and_then(|cfg| cfg.revision_page_size)
            .unwrap_or(100)
    }

    pub fn replication_lag_ms(&self) -> u64 {
        self.transition
            .as_ref()
            .and_then(|cfg| cfg.replication_lag_ms)
            .unwrap_or(2_000)
    }
}
