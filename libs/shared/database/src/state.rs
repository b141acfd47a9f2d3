use std::sync::Arc;

use shared_config::AppConfig;

use crate::store::StoreClient;

/// Process-wide shared state. The store client is constructed once at
/// startup and handed to every cell; its connection pool outlives requests.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<StoreClient>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let store = Arc::new(StoreClient::new(&config));
        Self { config, store }
    }
}
