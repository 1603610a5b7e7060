//! IVA (Mexican VAT) computation.
//!
//! All figures are cent-precision amounts. Tax is rounded once on the
//! discounted subtotal and the total is derived from the already-rounded
//! figures, so `total == subtotal - discount + tax` holds exactly.

use rust_decimal::{Decimal, RoundingStrategy};

/// Fixed IVA rate: 16%.
pub const IVA_RATE: Decimal = Decimal::from_parts(16, 0, 0, false, 2);

/// IVA rate expressed as a percentage, as stored on invoices.
pub const IVA_RATE_PERCENT: Decimal = Decimal::from_parts(16, 0, 0, false, 0);

/// Invoice money figures, each at cent precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// 16% of `amount`, rounded to the cent (half away from zero).
pub fn calculate_iva(amount: Decimal) -> Decimal {
    round_cents(amount * IVA_RATE)
}

/// Compute invoice totals from a subtotal and a discount.
pub fn calculate_invoice_totals(subtotal: Decimal, discount: Decimal) -> InvoiceTotals {
    let subtotal = round_cents(subtotal);
    let discount = round_cents(discount);
    let taxable = subtotal - discount;
    let tax_amount = calculate_iva(taxable);

    InvoiceTotals {
        subtotal,
        discount,
        tax_amount,
        total: taxable + tax_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().expect("invalid decimal literal")
    }

    #[test]
    fn iva_of_one_hundred_is_sixteen() {
        assert_eq!(calculate_iva(dec("100")), dec("16.00"));
    }

    #[test]
    fn iva_of_zero_is_zero() {
        assert_eq!(calculate_iva(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn iva_rounds_half_away_from_zero() {
        // 96.90625 * 0.16 = 15.505 exactly
        assert_eq!(calculate_iva(dec("96.90625")), dec("15.51"));
        // 103.15 * 0.16 = 16.504
        assert_eq!(calculate_iva(dec("103.15")), dec("16.50"));
    }

    #[test]
    fn totals_for_plain_subscription() {
        let totals = calculate_invoice_totals(dec("1000"), Decimal::ZERO);
        assert_eq!(totals.subtotal, dec("1000"));
        assert_eq!(totals.tax_amount, dec("160.00"));
        assert_eq!(totals.total, dec("1160.00"));
    }

    #[test]
    fn discount_is_applied_before_tax() {
        let totals = calculate_invoice_totals(dec("1000"), dec("100"));
        assert_eq!(totals.tax_amount, dec("144.00"));
        assert_eq!(totals.total, dec("1044.00"));
    }

    #[test]
    fn total_identity_holds_to_the_cent() {
        for (subtotal, discount) in [
            ("1000", "0"),
            ("999.99", "0.01"),
            ("96.91", "0"),
            ("103.15", "3.15"),
            ("0.01", "0"),
            ("12345.67", "45.67"),
        ] {
            let totals = calculate_invoice_totals(dec(subtotal), dec(discount));
            assert_eq!(
                totals.total,
                totals.subtotal - totals.discount + totals.tax_amount,
                "identity broken for subtotal={} discount={}",
                subtotal,
                discount
            );
        }
    }
}
