use std::sync::Arc;

use crate::{
    config::AppConfig, db::DbPool, idempotency::IdempotencyStore, upstream::CoreApi,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub core: Arc<dyn CoreApi>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    /// Audit trail sink; `None` when the service runs without a database.
    pub audit: Option<DbPool>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        core: Arc<dyn CoreApi>,
        idempotency: Arc<dyn IdempotencyStore>,
        audit: Option<DbPool>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            core,
            idempotency,
            audit,
        }
    }
}
