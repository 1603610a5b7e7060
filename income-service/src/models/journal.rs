//! Double-entry journal model and the fixed chart of accounts.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Caja.
pub const ACCOUNT_CASH: &str = "1101";
/// Bancos.
pub const ACCOUNT_BANK: &str = "1102";
/// Clientes; per-customer sub-accounts are derived from this prefix.
pub const ACCOUNT_RECEIVABLE_PREFIX: &str = "1103";
/// IVA trasladado.
pub const ACCOUNT_IVA_PAYABLE: &str = "2104";
/// Ingresos por servicios.
pub const ACCOUNT_REVENUE: &str = "4100";

/// What produced a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalSource {
    InvoiceGenerated,
    InvoicePayment,
}

impl JournalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalSource::InvoiceGenerated => "invoice_generated",
            JournalSource::InvoicePayment => "invoice_payment",
        }
    }
}

/// Append-only accounting row. Exactly one of `debit`/`credit` is non-zero.
/// Never updated or deleted after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JournalEntry {
    pub entry_id: Uuid,
    pub entry_date: NaiveDate,
    pub description: String,
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub source_type: String,
    pub source_id: Uuid,
    pub created_by: i64,
    pub created_utc: DateTime<Utc>,
}

/// Receivable sub-account for a customer: the receivable prefix plus the
/// customer id zero-padded to four digits.
pub fn receivable_account_code(customer_id: i64) -> String {
    format!("{}-{:04}", ACCOUNT_RECEIVABLE_PREFIX, customer_id)
}

/// Account debited when a payment comes in. Bank transfers land on the bank
/// account, every other method on the cash account.
pub fn cash_account_for_method(method: &str) -> &'static str {
    match method {
        "transfer" | "transferencia" => ACCOUNT_BANK,
        _ => ACCOUNT_CASH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receivable_code_pads_to_four_digits() {
        assert_eq!(receivable_account_code(7), "1103-0007");
        assert_eq!(receivable_account_code(42), "1103-0042");
        assert_eq!(receivable_account_code(9999), "1103-9999");
    }

    #[test]
    fn receivable_code_does_not_truncate_large_ids() {
        assert_eq!(receivable_account_code(12345), "1103-12345");
    }

    #[test]
    fn transfers_hit_the_bank_account() {
        assert_eq!(cash_account_for_method("transfer"), ACCOUNT_BANK);
        assert_eq!(cash_account_for_method("transferencia"), ACCOUNT_BANK);
    }

    #[test]
    fn other_methods_default_to_cash() {
        assert_eq!(cash_account_for_method("cash"), ACCOUNT_CASH);
        assert_eq!(cash_account_for_method("card"), ACCOUNT_CASH);
        assert_eq!(cash_account_for_method(""), ACCOUNT_CASH);
    }
}
