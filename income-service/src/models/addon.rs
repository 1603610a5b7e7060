//! Add-on catalog and purchase models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Pricing type for add-ons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingType {
    Fixed,
    Variable,
}

impl PricingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingType::Fixed => "fixed",
            PricingType::Variable => "variable",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "variable" => PricingType::Variable,
            _ => PricingType::Fixed,
        }
    }
}

/// How often an add-on is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingFrequency {
    OneTime,
    Monthly,
}

impl BillingFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingFrequency::OneTime => "one_time",
            BillingFrequency::Monthly => "monthly",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "monthly" => BillingFrequency::Monthly,
            _ => BillingFrequency::OneTime,
        }
    }
}

/// Purchase lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Approved,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Approved => "approved",
        }
    }
}

/// One-off or recurring purchasable extra.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceAddon {
    pub addon_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub price: Decimal,
    pub pricing_type: String,
    pub billing_frequency: String,
    pub requires_approval: bool,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating an add-on.
#[derive(Debug, Clone)]
pub struct CreateAddon {
    pub name: String,
    pub category: Option<String>,
    pub price: Decimal,
    pub pricing_type: PricingType,
    pub billing_frequency: BillingFrequency,
    pub requires_approval: bool,
}

/// A customer buying N units of an add-on. The unit price is a snapshot of
/// the add-on price at purchase time, not a live reference.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerAddonPurchase {
    pub purchase_id: Uuid,
    pub customer_id: i64,
    pub addon_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub project_id: Option<i64>,
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub status: String,
    pub billed_invoice_item_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a purchase.
#[derive(Debug, Clone)]
pub struct CreatePurchase {
    pub customer_id: i64,
    pub addon_id: Uuid,
    pub quantity: i32,
    pub subscription_id: Option<Uuid>,
    pub description: Option<String>,
    pub project_id: Option<i64>,
}

/// An approved purchase with no invoice item referencing it yet, joined with
/// its add-on name for display and invoicing.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UnbilledPurchase {
    pub purchase_id: Uuid,
    pub addon_id: Uuid,
    pub addon_name: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}
