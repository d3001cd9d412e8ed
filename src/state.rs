use crate::config::Config;
use crate::service::TodoService;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: TodoService,
    pub config: Arc<Config>,
}

#[cfg(test)]
impl AppState {
    /// State over a fresh `MemoryStore`, for handler tests
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(crate::store::MemoryStore::new()))
    }

    /// State over an arbitrary store, reported as the memory backend
    pub fn with_store(store: Arc<dyn crate::store::KvStore>) -> Self {
        use crate::config::StoreBackend;

        let config = Config {
            store_backend: StoreBackend::Memory,
            spanner: None,
            service_port: 8080,
            service_host: "0.0.0.0".to_string(),
        };

        AppState {
            service: TodoService::new(store),
            config: Arc::new(config),
        }
    }
}
