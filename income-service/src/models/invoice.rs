//! Invoice, invoice item and payment models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status.
///
/// Only `draft`, `partial` and `paid` are assigned by this module; `sent` is
/// set by the delivery flow and `cancelled`/`overdue` are terminal/exception
/// states managed elsewhere. Payments move an invoice monotonically towards
/// `paid`; there is no path back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Partial,
    Paid,
    Cancelled,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "partial" => InvoiceStatus::Partial,
            "paid" => InvoiceStatus::Paid,
            "cancelled" => InvoiceStatus::Cancelled,
            "overdue" => InvoiceStatus::Overdue,
            _ => InvoiceStatus::Draft,
        }
    }

    /// Status after applying a payment that brings the cumulative paid
    /// amount to `new_amount_paid`.
    pub fn after_payment(new_amount_paid: Decimal, total: Decimal) -> Self {
        if new_amount_paid >= total {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Partial
        }
    }
}

/// Line item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Subscription,
    Addon,
    Custom,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Subscription => "subscription",
            ItemType::Addon => "addon",
            ItemType::Custom => "custom",
        }
    }
}

/// Invoice row. Totals are recomputed from the live sum of item totals at
/// generation time, never maintained incrementally.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub customer_id: i64,
    pub subscription_id: Option<Uuid>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub billing_period_start: Option<NaiveDate>,
    pub billing_period_end: Option<NaiveDate>,
    pub subtotal: Decimal,
    pub tax_percentage: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Invoice {
    /// Effective balance due.
    pub fn amount_due(&self) -> Decimal {
        self.total - self.amount_paid
    }
}

/// One invoice line. `subtotal` and `total` are computed identically; no
/// per-line discount is applied.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceItem {
    pub item_id: Uuid,
    pub invoice_id: Uuid,
    pub item_type: String,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub display_order: i32,
}

/// One payment event. Immutable once created; never updated or reversed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoicePayment {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub payment_date: NaiveDate,
    pub reference_number: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// A caller-supplied ad-hoc line item.
#[derive(Debug, Clone)]
pub struct CustomItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Input for generating an invoice.
#[derive(Debug, Clone)]
pub struct GenerateInvoice {
    pub customer_id: i64,
    pub subscription_id: Option<Uuid>,
    pub billing_period_start: Option<NaiveDate>,
    pub billing_period_end: Option<NaiveDate>,
    pub include_unbilled_addons: bool,
    pub custom_items: Vec<CustomItem>,
}

/// Summary returned by invoice generation.
#[derive(Debug, Clone)]
pub struct GeneratedInvoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub amount: Decimal,
    pub payment_method: String,
    pub payment_date: NaiveDate,
    pub reference_number: Option<String>,
}

/// Outcome of a recorded payment.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment_id: Uuid,
    pub invoice_number: String,
    pub payment_amount: Decimal,
    pub new_amount_paid: Decimal,
    pub amount_remaining: Decimal,
    pub status: InvoiceStatus,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub customer_id: Option<i64>,
    pub status: Option<InvoiceStatus>,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_payoff_transitions_to_paid() {
        let total = Decimal::new(116000, 2);
        assert_eq!(
            InvoiceStatus::after_payment(total, total),
            InvoiceStatus::Paid
        );
    }

    #[test]
    fn partial_payment_transitions_to_partial() {
        let total = Decimal::new(116000, 2);
        let paid = Decimal::new(50000, 2);
        assert_eq!(
            InvoiceStatus::after_payment(paid, total),
            InvoiceStatus::Partial
        );
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Partial,
            InvoiceStatus::Paid,
            InvoiceStatus::Cancelled,
            InvoiceStatus::Overdue,
        ] {
            assert_eq!(InvoiceStatus::from_string(status.as_str()), status);
        }
    }
}
