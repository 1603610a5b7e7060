//! Customer subscription model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paused" => SubscriptionStatus::Paused,
            "cancelled" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Active,
        }
    }
}

/// Links a customer to a service package. A customer may hold several
/// concurrent subscriptions; each is billed independently.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerSubscription {
    pub subscription_id: Uuid,
    pub customer_id: i64,
    pub package_id: Uuid,
    pub status: String,
    pub start_date: NaiveDate,
    pub next_billing_date: NaiveDate,
    pub custom_monthly_price: Option<Decimal>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Subscription joined with package and customer names for list views.
/// `effective_price` is the custom override when present, else the package's
/// base price.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SubscriptionWithPackage {
    pub subscription_id: Uuid,
    pub customer_id: i64,
    pub customer_name: String,
    pub package_id: Uuid,
    pub package_name: String,
    pub status: String,
    pub start_date: NaiveDate,
    pub next_billing_date: NaiveDate,
    pub custom_monthly_price: Option<Decimal>,
    pub effective_price: Decimal,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub customer_id: i64,
    pub package_id: Uuid,
    pub start_date: NaiveDate,
    pub custom_monthly_price: Option<Decimal>,
    pub notes: Option<String>,
}

/// Filter parameters for listing subscriptions.
#[derive(Debug, Clone, Default)]
pub struct ListSubscriptionsFilter {
    pub customer_id: Option<i64>,
    pub status: Option<SubscriptionStatus>,
    pub limit: i64,
}
