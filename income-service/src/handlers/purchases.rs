//! Add-on purchase handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use backoffice_core::error::AppError;
use backoffice_core::middleware::ActorContext;
use validator::Validate;

use crate::dtos::{CreatePurchaseRequest, UnbilledPurchasesQuery};
use crate::models::{CreatePurchase, CustomerAddonPurchase, UnbilledPurchase};
use crate::AppState;

/// List a customer's approved, not-yet-billed purchases.
pub async fn list_unbilled(
    State(state): State<AppState>,
    _actor: ActorContext,
    Query(query): Query<UnbilledPurchasesQuery>,
) -> Result<Json<Vec<UnbilledPurchase>>, AppError> {
    let purchases = state.db.list_unbilled_purchases(query.customer_id).await?;
    Ok(Json(purchases))
}

/// Record an add-on purchase with snapshot pricing.
pub async fn create_purchase(
    State(state): State<AppState>,
    _actor: ActorContext,
    Json(payload): Json<CreatePurchaseRequest>,
) -> Result<(StatusCode, Json<CustomerAddonPurchase>), AppError> {
    payload.validate()?;

    let input = CreatePurchase {
        customer_id: payload.customer_id,
        addon_id: payload.addon_id,
        quantity: payload.quantity,
        subscription_id: payload.subscription_id,
        description: payload.description.clone(),
        project_id: payload.project_id,
    };

    let purchase = state.db.create_purchase(&input).await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}
