//! Tax classification and tax amounts for line items and invoices.
//!
//! Amounts are tax-inclusive integers in the smallest currency unit; rates are
//! integer basis points so rounding never depends on floating point.

use serde::{Deserialize, Serialize};

use einvoice_core::{DomainError, DomainResult, ValueObject};

use crate::item::PaymentItem;

/// Tax treatment of a line item, or the aggregate treatment of an invoice.
///
/// `Mixed` only ever describes an invoice; a single item is never `Mixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxType {
    Taxed,
    ZeroTax,
    TaxFree,
    Special,
    Mixed,
}

const BPS_SCALE: u32 = 10_000;

/// Tax rate in basis points (`500` = 5%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TaxRate(u32);

impl ValueObject for TaxRate {}

impl TaxRate {
    /// Standard business tax rate (5%).
    pub const STANDARD: TaxRate = TaxRate(500);

    pub fn from_bps(bps: u32) -> DomainResult<Self> {
        if bps > BPS_SCALE {
            return Err(DomainError::validation(format!(
                "tax rate must not exceed 100% (got {bps} bps)"
            )));
        }
        Ok(Self(bps))
    }

    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// The rate as a fraction (for display only).
    pub fn as_fraction(&self) -> f64 {
        f64::from(self.0) / f64::from(BPS_SCALE)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl TryFrom<u32> for TaxRate {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_bps(value)
    }
}

impl From<TaxRate> for u32 {
    fn from(value: TaxRate) -> Self {
        value.0
    }
}

/// Aggregate tax type of an invoice.
///
/// All items agreeing yields their shared type. Any disagreement yields
/// `Mixed`, including `Special` next to anything else.
pub fn classify_invoice_tax_type(items: &[PaymentItem]) -> DomainResult<TaxType> {
    let Some(first) = items.first() else {
        return Err(DomainError::validation("cannot classify an empty item list"));
    };
    if items.iter().any(|item| item.tax_type == TaxType::Mixed) {
        return Err(DomainError::validation("a single item cannot be MIXED"));
    }

    if items.iter().all(|item| item.tax_type == first.tax_type) {
        Ok(first.tax_type)
    } else {
        Ok(TaxType::Mixed)
    }
}

/// Tax contained in a tax-inclusive line.
///
/// Taxed lines report at least 1 even when rounding would produce 0; every
/// other tax type contributes nothing.
pub fn item_tax(item: &PaymentItem, rate: TaxRate) -> DomainResult<u64> {
    if item.tax_type != TaxType::Taxed {
        return Ok(0);
    }

    let amount = u128::from(item.line_total()?);
    let bps = u128::from(rate.bps());
    let denominator = u128::from(BPS_SCALE) + bps;

    // round-half-up of amount * bps / (10000 + bps)
    let raw = (2 * amount * bps + denominator) / (2 * denominator);
    let raw = u64::try_from(raw).map_err(|_| DomainError::invariant("item tax overflow"))?;

    Ok(raw.max(1))
}

/// Sum of [`item_tax`] over `items`.
pub fn invoice_tax_amount(items: &[PaymentItem], rate: TaxRate) -> DomainResult<u64> {
    items.iter().try_fold(0u64, |total, item| {
        total
            .checked_add(item_tax(item, rate)?)
            .ok_or_else(|| DomainError::invariant("tax total overflow"))
    })
}

/// Net-of-tax amount for a tax-inclusive total.
pub fn invoice_net_amount(issued_amount: u64, tax_amount: u64) -> u64 {
    issued_amount.saturating_sub(tax_amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn item(tax_type: TaxType) -> PaymentItem {
        PaymentItem::new("Line", 1, 100, tax_type)
    }

    #[test]
    fn shared_tax_type_wins() {
        let items = vec![item(TaxType::ZeroTax), item(TaxType::ZeroTax)];
        assert_eq!(classify_invoice_tax_type(&items).unwrap(), TaxType::ZeroTax);
    }

    #[test]
    fn taxed_with_tax_free_is_mixed() {
        let items = vec![item(TaxType::Taxed), item(TaxType::TaxFree)];
        assert_eq!(classify_invoice_tax_type(&items).unwrap(), TaxType::Mixed);
    }

    #[test]
    fn all_special_is_special() {
        let items = vec![item(TaxType::Special), item(TaxType::Special)];
        assert_eq!(classify_invoice_tax_type(&items).unwrap(), TaxType::Special);
    }

    #[test]
    fn special_is_not_dominant() {
        let items = vec![item(TaxType::Special), item(TaxType::Taxed)];
        assert_eq!(classify_invoice_tax_type(&items).unwrap(), TaxType::Mixed);
    }

    #[test]
    fn empty_list_cannot_be_classified() {
        assert!(matches!(
            classify_invoice_tax_type(&[]),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn taxed_line_tax_rounds_half_up() {
        // 100 * 0.05 / 1.05 = 4.76
        assert_eq!(item_tax(&item(TaxType::Taxed), TaxRate::STANDARD).unwrap(), 5);
        // 1050 * 0.05 / 1.05 = 50 exactly
        let line = PaymentItem::taxed("Desk", 1, 1050);
        assert_eq!(item_tax(&line, TaxRate::STANDARD).unwrap(), 50);
        // 42 * 0.05 / 1.05 = 2.0
        let line = PaymentItem::taxed("Tea", 2, 21);
        assert_eq!(item_tax(&line, TaxRate::STANDARD).unwrap(), 2);
    }

    #[test]
    fn tiny_taxed_line_still_reports_one() {
        let line = PaymentItem::taxed("Candy", 1, 10);
        assert_eq!(item_tax(&line, TaxRate::STANDARD).unwrap(), 1);
    }

    #[test]
    fn untaxed_lines_contribute_nothing() {
        for tax_type in [TaxType::ZeroTax, TaxType::TaxFree, TaxType::Special] {
            assert_eq!(item_tax(&item(tax_type), TaxRate::STANDARD).unwrap(), 0);
        }
    }

    #[test]
    fn invoice_tax_sums_per_item_tax() {
        let items = vec![
            PaymentItem::taxed("Candy", 1, 10),
            PaymentItem::taxed("Desk", 1, 1050),
            PaymentItem::new("Book", 1, 300, TaxType::TaxFree),
        ];
        let tax = invoice_tax_amount(&items, TaxRate::STANDARD).unwrap();
        assert_eq!(tax, 51);
        assert_eq!(invoice_net_amount(1360, tax), 1309);
    }

    #[test]
    fn rates_above_one_hundred_percent_are_rejected() {
        assert!(TaxRate::from_bps(10_000).is_ok());
        assert!(TaxRate::from_bps(10_001).is_err());
        assert!(serde_json::from_str::<TaxRate>("20000").is_err());
        assert_eq!(serde_json::from_str::<TaxRate>("500").unwrap(), TaxRate::STANDARD);
    }

    #[test]
    fn tax_type_uses_screaming_snake_case() {
        assert_eq!(serde_json::to_string(&TaxType::ZeroTax).unwrap(), "\"ZERO_TAX\"");
        assert_eq!(serde_json::to_string(&TaxType::TaxFree).unwrap(), "\"TAX_FREE\"");
    }

    proptest! {
        /// Property: a taxed line whose exact tax would round to zero reports 1.
        #[test]
        fn taxed_lines_never_report_zero(
            quantity in 1u32..50,
            unit_price in 1u64..10_000,
            bps in 1u32..3_000,
        ) {
            let line = PaymentItem::taxed("Line", quantity, unit_price);
            let tax = item_tax(&line, TaxRate::from_bps(bps).unwrap()).unwrap();
            prop_assert!(tax >= 1);
            prop_assert!(tax <= line.line_total().unwrap());
        }
    }
}
