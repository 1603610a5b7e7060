//! Service package catalog model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Billing cycle for recurring packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Annually,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Annually => "annually",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "quarterly" => BillingCycle::Quarterly,
            "annually" => BillingCycle::Annually,
            _ => BillingCycle::Monthly,
        }
    }
}

/// Recurring-billing catalog item. Immutable once referenced by
/// subscriptions, except for deactivation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServicePackage {
    pub package_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub billing_cycle: String,
    pub posts_per_month: i32,
    pub stories_per_week: i32,
    pub reels_per_month: i32,
    pub platforms_included: Vec<String>,
    pub features: Option<serde_json::Value>,
    pub display_order: i32,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a package.
#[derive(Debug, Clone)]
pub struct CreatePackage {
    pub name: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub billing_cycle: BillingCycle,
    pub posts_per_month: i32,
    pub stories_per_week: i32,
    pub reels_per_month: i32,
    pub platforms_included: Vec<String>,
    pub features: Option<serde_json::Value>,
    pub display_order: i32,
}
