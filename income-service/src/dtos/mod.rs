//! Request and response types for the HTTP surface.
//!
//! Every request body is validated before the core transaction begins, so the
//! database layer only ever sees typed, pre-validated inputs.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{
    BillingCycle, BillingFrequency, CustomItem, Invoice, InvoiceItem, InvoicePayment, PricingType,
};
use crate::services::database::DashboardMetrics;

pub fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount_not_positive"));
    }
    Ok(())
}

pub fn validate_non_negative_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount < Decimal::ZERO {
        return Err(ValidationError::new("amount_negative"));
    }
    Ok(())
}

fn default_quantity() -> i32 {
    1
}

fn default_include_addons() -> bool {
    true
}

fn default_limit() -> i64 {
    100
}

/// Clamp a caller-supplied list limit to a sane window.
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, 500)
}

// -----------------------------------------------------------------------------
// Catalog
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePackageRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom(function = "validate_non_negative_amount"))]
    pub base_price: Decimal,
    pub billing_cycle: Option<String>,
    #[serde(default)]
    pub posts_per_month: i32,
    #[serde(default)]
    pub stories_per_week: i32,
    #[serde(default)]
    pub reels_per_month: i32,
    #[serde(default)]
    pub platforms_included: Vec<String>,
    pub features: Option<Value>,
    #[serde(default)]
    pub display_order: i32,
}

impl CreatePackageRequest {
    pub fn billing_cycle(&self) -> BillingCycle {
        self.billing_cycle
            .as_deref()
            .map(BillingCycle::from_string)
            .unwrap_or(BillingCycle::Monthly)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAddonRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub category: Option<String>,
    #[validate(custom(function = "validate_non_negative_amount"))]
    pub price: Decimal,
    pub pricing_type: Option<String>,
    pub billing_frequency: Option<String>,
    #[serde(default)]
    pub requires_approval: bool,
}

impl CreateAddonRequest {
    pub fn pricing_type(&self) -> PricingType {
        self.pricing_type
            .as_deref()
            .map(PricingType::from_string)
            .unwrap_or(PricingType::Fixed)
    }

    pub fn billing_frequency(&self) -> BillingFrequency {
        self.billing_frequency
            .as_deref()
            .map(BillingFrequency::from_string)
            .unwrap_or(BillingFrequency::OneTime)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListAddonsQuery {
    pub category: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

// -----------------------------------------------------------------------------
// Subscriptions
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    pub customer_id: i64,
    pub service_package_id: Uuid,
    pub start_date: Option<NaiveDate>,
    #[validate(custom(function = "validate_non_negative_amount"))]
    pub custom_monthly_price: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub customer_id: Option<i64>,
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

// -----------------------------------------------------------------------------
// Add-on purchases
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseRequest {
    pub customer_id: i64,
    pub addon_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub subscription_id: Option<Uuid>,
    pub description: Option<String>,
    pub project_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UnbilledPurchasesQuery {
    pub customer_id: i64,
}

// -----------------------------------------------------------------------------
// Invoices
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub customer_id: Option<i64>,
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateInvoiceRequest {
    pub customer_id: i64,
    pub subscription_id: Option<Uuid>,
    pub billing_period_start: Option<NaiveDate>,
    pub billing_period_end: Option<NaiveDate>,
    #[serde(default = "default_include_addons")]
    pub include_unbilled_addons: bool,
    #[serde(default)]
    #[validate(nested)]
    pub custom_items: Vec<CustomItemRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CustomItemRequest {
    #[validate(length(min = 1))]
    pub description: String,
    pub quantity: Option<Decimal>,
    #[validate(custom(function = "validate_non_negative_amount"))]
    pub unit_price: Decimal,
}

impl From<&CustomItemRequest> for CustomItem {
    fn from(req: &CustomItemRequest) -> Self {
        CustomItem {
            description: req.description.clone(),
            quantity: req.quantity.unwrap_or(Decimal::ONE),
            unit_price: req.unit_price,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateInvoiceResponse {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub subtotal: Decimal,
    pub iva: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 30))]
    pub payment_method: String,
    pub payment_date: Option<NaiveDate>,
    pub reference_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordPaymentResponse {
    pub payment_id: Uuid,
    pub invoice_number: String,
    pub payment_amount: Decimal,
    pub new_amount_paid: Decimal,
    pub amount_remaining: Decimal,
    pub invoice_status: String,
}

/// Invoice row plus the derived balance due, for list views.
#[derive(Debug, Serialize)]
pub struct InvoiceSummary {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub amount_due: Decimal,
}

impl From<Invoice> for InvoiceSummary {
    fn from(invoice: Invoice) -> Self {
        let amount_due = invoice.amount_due();
        InvoiceSummary {
            invoice,
            amount_due,
        }
    }
}

/// Full invoice view: the row, its lines in display order, and its payments.
#[derive(Debug, Serialize)]
pub struct InvoiceDetailResponse {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub amount_due: Decimal,
    pub items: Vec<InvoiceItem>,
    pub payments: Vec<InvoicePayment>,
}

// -----------------------------------------------------------------------------
// Dashboard
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub mrr: Decimal,
    pub total_outstanding: Decimal,
    pub revenue_this_month: Decimal,
}

impl From<DashboardMetrics> for DashboardResponse {
    fn from(m: DashboardMetrics) -> Self {
        DashboardResponse {
            mrr: m.mrr,
            total_outstanding: m.total_outstanding,
            revenue_this_month: m.revenue_this_month,
        }
    }
}
