use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::coordinator::MainCoordinator;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<MainCoordinator>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(coordinator: Arc<MainCoordinator>) -> Self {
        Self {
            coordinator,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
