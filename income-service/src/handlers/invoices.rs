//! Invoice handlers: list, detail, generation and payment.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use backoffice_core::error::AppError;
use backoffice_core::middleware::ActorContext;
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    clamp_limit, GenerateInvoiceRequest, GenerateInvoiceResponse, InvoiceDetailResponse,
    InvoiceSummary, ListInvoicesQuery, RecordPaymentRequest, RecordPaymentResponse,
};
use crate::models::{
    CustomItem, GenerateInvoice, InvoiceStatus, ListInvoicesFilter, RecordPayment,
};
use crate::AppState;

/// List invoices with their computed amount due.
pub async fn list_invoices(
    State(state): State<AppState>,
    _actor: ActorContext,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<InvoiceSummary>>, AppError> {
    let filter = ListInvoicesFilter {
        customer_id: query.customer_id,
        status: query.status.as_deref().map(InvoiceStatus::from_string),
        limit: clamp_limit(query.limit),
    };

    let invoices = state.db.list_invoices(&filter).await?;
    Ok(Json(invoices.into_iter().map(InvoiceSummary::from).collect()))
}

/// Get an invoice with its line items and payments.
pub async fn get_invoice(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceDetailResponse>, AppError> {
    let invoice = state
        .db
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;

    let items = state.db.get_invoice_items(invoice_id).await?;
    let payments = state.db.get_invoice_payments(invoice_id).await?;

    Ok(Json(InvoiceDetailResponse {
        amount_due: invoice.amount_due(),
        invoice,
        items,
        payments,
    }))
}

/// Generate an invoice from the customer's subscription, unbilled add-on
/// purchases and any caller-supplied custom items.
pub async fn generate_invoice(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(payload): Json<GenerateInvoiceRequest>,
) -> Result<(StatusCode, Json<GenerateInvoiceResponse>), AppError> {
    payload.validate()?;

    let input = GenerateInvoice {
        customer_id: payload.customer_id,
        subscription_id: payload.subscription_id,
        billing_period_start: payload.billing_period_start,
        billing_period_end: payload.billing_period_end,
        include_unbilled_addons: payload.include_unbilled_addons,
        custom_items: payload.custom_items.iter().map(CustomItem::from).collect(),
    };

    let generated = state.db.generate_invoice(&input, actor.actor_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(GenerateInvoiceResponse {
            invoice_id: generated.invoice_id,
            invoice_number: generated.invoice_number,
            subtotal: generated.subtotal,
            iva: generated.tax_amount,
            total: generated.total,
        }),
    ))
}

/// Record a payment against an invoice.
pub async fn record_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<RecordPaymentResponse>), AppError> {
    payload.validate()?;

    let input = RecordPayment {
        amount: payload.amount,
        payment_method: payload.payment_method.clone(),
        payment_date: payload
            .payment_date
            .unwrap_or_else(|| Utc::now().date_naive()),
        reference_number: payload.reference_number.clone(),
    };

    let outcome = state
        .db
        .record_payment(invoice_id, &input, actor.actor_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RecordPaymentResponse {
            payment_id: outcome.payment_id,
            invoice_number: outcome.invoice_number,
            payment_amount: outcome.payment_amount,
            new_amount_paid: outcome.new_amount_paid,
            amount_remaining: outcome.amount_remaining,
            invoice_status: outcome.status.as_str().to_string(),
        }),
    ))
}
