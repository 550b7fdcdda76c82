use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::db::Database;
use crate::services::engine::LeaderboardEngine;

/// Shared handler state. The engine exists only when the database connected
/// at startup; handlers that need it answer 503 otherwise.
#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    db: Option<Arc<Database>>,
    engine: Option<Arc<LeaderboardEngine>>,
}

impl AppState {
    pub fn new(db: Option<Arc<Database>>) -> Self {
        let engine = db
            .as_ref()
            .map(|db| Arc::new(LeaderboardEngine::new(Arc::clone(db))));
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            db,
            engine,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn db(&self) -> Option<Arc<Database>> {
        self.db.clone()
    }

    pub fn engine(&self) -> Option<Arc<LeaderboardEngine>> {
        self.engine.clone()
    }
}
