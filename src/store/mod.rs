pub mod memory;
pub mod spanner;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{Config, StoreBackend};

pub use memory::MemoryStore;
pub use spanner::SpannerStore;

/// Flat byte-oriented key-value capability.
///
/// Implementations guarantee per-key atomicity only. There is no listing,
/// range scan or multi-key transaction, so anything spanning several keys
/// has to be coordinated by the caller.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Fetch the value under `key`, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove `key`, returning whether a value was actually removed
    async fn del(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Open the store selected by `config.store_backend`
pub async fn connect(config: &Config) -> Result<Arc<dyn KvStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Spanner => {
            let spanner = config
                .spanner
                .as_ref()
                .context("Spanner backend selected without Spanner configuration")?;
            Ok(Arc::new(SpannerStore::from_config(spanner).await?))
        }
    }
}
