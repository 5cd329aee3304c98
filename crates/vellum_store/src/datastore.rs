use std::path::{Path, PathBuf};

use crate::{VellumConfig, VellumStore};
use vellum_core::VellumResult;

const DEFAULT_DB_NAME: &str = "vellum.sqlite";

pub fn load_or_init_config(base: &Path) -> VellumResult<VellumConfig> {
    VellumConfig::load_or_init(base)
}

pub async fn open_primary_store(base: &Path) -> VellumResult<VellumStore> {
    let config = load_or_init_config(base)?;
    VellumStore::connect(&config.primary, config.pool.as_ref(), base).await
}

/// The secondary database is optional; a deployment that has finished its
/// transition epoch can drop it from the config.
pub async fn open_secondary_store(base: &Path) -> VellumResult<Option<VellumStore>> {
    let config = load_or_init_config(base)?;
    match &config.secondary {
        Some(database) => {
            let store = VellumStore::connect(database, config.pool.as_ref(), base).await?;
            Ok(Some(store))
        }
        None => Ok(None),
    }
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}

#[cfg(test)]
mod tests {
    use super::{default_sqlite_path, load_or_init_config, open_primary_store};
    use tempfile::tempdir;

    #[tokio::test]
    async fn opens_store_with_default_config() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path();
        let config = load_or_init_config(base).expect("config");
        assert_eq!(config.primary.backend_name(), "sqlite");
        let store = open_primary_store(base).await.expect("open store");
        let path = default_sqlite_path(base);
        assert!(path.exists());
        let _ = store;
    }

    #[tokio::test]
    async fn secondary_store_defaults_to_a_sibling_database() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path();
        let secondary = super::open_secondary_store(base).await.expect("open");
        assert!(secondary.is_some());
    }
}
