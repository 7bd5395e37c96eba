use std::sync::Arc;

use sqlx::SqlitePool;

use crate::export::MilestoneMap;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub milestones: Arc<MilestoneMap>,
}
