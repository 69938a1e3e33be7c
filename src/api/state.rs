use crate::auth::AuthStore;
use crate::core::AppConfig;

pub struct AppState {
    pub store: AuthStore,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            store: AuthStore::open(&config.cache_path),
            config,
        }
    }
}
