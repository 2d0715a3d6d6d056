//! Shared application state for the Axum API server.

use std::sync::Arc;

use courier_engine::RunStore;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RunStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }
}
