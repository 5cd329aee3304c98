pub mod config;
pub mod datastore;
pub mod db;
pub mod migration;
pub mod store;

pub use config::{DatabaseConfig, PoolConfig, TransitionConfig, VellumConfig};
pub use datastore::{
    default_sqlite_path, load_or_init_config, open_primary_store, open_secondary_store,
};
pub use store::{StoredEvent, VellumStore};

pub use vellum_core::*;
