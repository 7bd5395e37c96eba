use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::error;

use crate::error::AppError;
use crate::export::{self, DashboardExport, SemesterData};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/dashboard", get(dashboard))
        .route("/api/semesters/{semester}", get(semester))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("select 1").execute(&state.db).await {
        Ok(_) => StatusCode::OK,
        Err(err) => {
            error!("health check failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Deserialize)]
struct DashboardParams {
    semester: Option<String>,
}

async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<DashboardExport>, AppError> {
    let export = export::dashboard_export(
        &state.db,
        params.semester.as_deref(),
        state.milestones.as_ref(),
    )
    .await?;
    Ok(Json(export))
}

async fn semester(
    State(state): State<AppState>,
    Path(semester): Path<String>,
) -> Result<Json<SemesterData>, AppError> {
    let data = export::semester_export(&state.db, &semester).await?;
    if data.snapshots.is_empty() {
        return Err(AppError::NotFound(format!(
            "no snapshots for semester {semester}"
        )));
    }
    Ok(Json(data))
}
