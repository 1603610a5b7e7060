//! Service package handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use backoffice_core::error::AppError;
use backoffice_core::middleware::ActorContext;
use validator::Validate;

use crate::dtos::{clamp_limit, CreatePackageRequest, ListQuery};
use crate::models::{CreatePackage, ServicePackage};
use crate::AppState;

/// List active packages ordered by display_order then price.
pub async fn list_packages(
    State(state): State<AppState>,
    _actor: ActorContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ServicePackage>>, AppError> {
    let packages = state
        .db
        .list_active_packages(clamp_limit(query.limit))
        .await?;
    Ok(Json(packages))
}

/// Create a new package.
pub async fn create_package(
    State(state): State<AppState>,
    _actor: ActorContext,
    Json(payload): Json<CreatePackageRequest>,
) -> Result<(StatusCode, Json<ServicePackage>), AppError> {
    payload.validate()?;

    let input = CreatePackage {
        name: payload.name.clone(),
        description: payload.description.clone(),
        base_price: payload.base_price,
        billing_cycle: payload.billing_cycle(),
        posts_per_month: payload.posts_per_month,
        stories_per_week: payload.stories_per_week,
        reels_per_month: payload.reels_per_month,
        platforms_included: payload.platforms_included.clone(),
        features: payload.features.clone(),
        display_order: payload.display_order,
    };

    let package = state.db.create_package(&input).await?;
    Ok((StatusCode::CREATED, Json(package)))
}
