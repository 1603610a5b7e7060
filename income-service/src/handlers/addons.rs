//! Add-on catalog handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use backoffice_core::error::AppError;
use backoffice_core::middleware::ActorContext;
use validator::Validate;

use crate::dtos::{clamp_limit, CreateAddonRequest, ListAddonsQuery};
use crate::models::{CreateAddon, ServiceAddon};
use crate::AppState;

/// List active add-ons, optionally filtered by category.
pub async fn list_addons(
    State(state): State<AppState>,
    _actor: ActorContext,
    Query(query): Query<ListAddonsQuery>,
) -> Result<Json<Vec<ServiceAddon>>, AppError> {
    let addons = state
        .db
        .list_active_addons(query.category.as_deref(), clamp_limit(query.limit))
        .await?;
    Ok(Json(addons))
}

/// Create a new add-on.
pub async fn create_addon(
    State(state): State<AppState>,
    _actor: ActorContext,
    Json(payload): Json<CreateAddonRequest>,
) -> Result<(StatusCode, Json<ServiceAddon>), AppError> {
    payload.validate()?;

    let input = CreateAddon {
        name: payload.name.clone(),
        category: payload.category.clone(),
        price: payload.price,
        pricing_type: payload.pricing_type(),
        billing_frequency: payload.billing_frequency(),
        requires_approval: payload.requires_approval,
    };

    let addon = state.db.create_addon(&input).await?;
    Ok((StatusCode::CREATED, Json(addon)))
}
