use std::sync::Arc;

use tracing::info;

use crate::services::engine::LeaderboardEngine;
use crate::services::error::EngineError;

/// Scheduled full ranking pass. Keeps the snapshot warm so interactive reads
/// rarely pay for a refresh themselves.
pub async fn run_refresh(engine: Arc<LeaderboardEngine>) -> Result<(), EngineError> {
    let snapshot = engine.refresh().await?;
    info!(
        version = snapshot.version,
        users = snapshot.entries.len(),
        skipped = snapshot.skipped_user_ids.len(),
        "scheduled leaderboard refresh complete"
    );
    Ok(())
}
