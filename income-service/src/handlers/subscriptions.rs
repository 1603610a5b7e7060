//! Subscription handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use backoffice_core::error::AppError;
use backoffice_core::middleware::ActorContext;
use chrono::Utc;
use validator::Validate;

use crate::dtos::{clamp_limit, CreateSubscriptionRequest, ListSubscriptionsQuery};
use crate::models::{
    CreateSubscription, CustomerSubscription, ListSubscriptionsFilter, SubscriptionStatus,
    SubscriptionWithPackage,
};
use crate::AppState;

/// List subscriptions joined with package and customer names.
pub async fn list_subscriptions(
    State(state): State<AppState>,
    _actor: ActorContext,
    Query(query): Query<ListSubscriptionsQuery>,
) -> Result<Json<Vec<SubscriptionWithPackage>>, AppError> {
    let filter = ListSubscriptionsFilter {
        customer_id: query.customer_id,
        status: query
            .status
            .as_deref()
            .map(SubscriptionStatus::from_string),
        limit: clamp_limit(query.limit),
    };

    let subscriptions = state.db.list_subscriptions(&filter).await?;
    Ok(Json(subscriptions))
}

/// Create a subscription. The start date defaults to today; the next billing
/// date is start + 1 calendar month.
pub async fn create_subscription(
    State(state): State<AppState>,
    _actor: ActorContext,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<CustomerSubscription>), AppError> {
    payload.validate()?;

    let input = CreateSubscription {
        customer_id: payload.customer_id,
        package_id: payload.service_package_id,
        start_date: payload.start_date.unwrap_or_else(|| Utc::now().date_naive()),
        custom_monthly_price: payload.custom_monthly_price,
        notes: payload.notes.clone(),
    };

    let subscription = state.db.create_subscription(&input).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}
