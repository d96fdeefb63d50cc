use crate::config::AppConfig;
use crate::persistence::{FlatStore, ObjectStoreBackend};
use crate::services::restart::RestartTrigger;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct AppState {
    pub flat: Arc<dyn FlatStore>,
    pub objects: Arc<dyn ObjectStoreBackend>,
    pub restart: Arc<dyn RestartTrigger>,
    pub config: Arc<AppConfig>,
    /// One backup, restore, or maintenance operation at a time.
    pub operation_permit: Arc<Semaphore>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        flat: Arc<dyn FlatStore>,
        objects: Arc<dyn ObjectStoreBackend>,
        restart: Arc<dyn RestartTrigger>,
    ) -> Self {
        Self {
            flat,
            objects,
            restart,
            config: Arc::new(config),
            operation_permit: Arc::new(Semaphore::new(1)),
            start_time: chrono::Utc::now(),
        }
    }
}
