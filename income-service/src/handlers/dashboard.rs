//! Income dashboard handler.

use axum::{extract::State, Json};
use backoffice_core::error::AppError;
use backoffice_core::middleware::ActorContext;

use crate::dtos::DashboardResponse;
use crate::AppState;

/// The three income aggregates: MRR, total outstanding and revenue this
/// month. All default to zero when no rows match.
pub async fn dashboard(
    State(state): State<AppState>,
    _actor: ActorContext,
) -> Result<Json<DashboardResponse>, AppError> {
    let metrics = state.db.dashboard_metrics().await?;
    Ok(Json(DashboardResponse::from(metrics)))
}
