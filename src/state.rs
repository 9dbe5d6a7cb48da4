use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::MappingStore;
use crate::services::SyncService;

#[derive(Clone)]
pub struct AppState {
    pub store: MappingStore,
    pub sync: Arc<SyncService>,
    /// Held for the duration of a run; a second caller gets `SyncInProgress`.
    pub run_guard: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(store: MappingStore, sync: Arc<SyncService>) -> Self {
        Self {
            store,
            sync,
            run_guard: Arc::new(Mutex::new(())),
        }
    }
}
