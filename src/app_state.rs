use std::sync::Arc;

use crate::services::TaskService;
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub tasks: TaskService,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { tasks: TaskService::new(store) }
    }
}
