//! Priced line items attached to invoices and allowances.

use serde::{Deserialize, Serialize};

use einvoice_core::{DomainError, DomainResult, ValueObject};

use crate::tax::TaxType;

/// A priced cart line. Immutable once attached to an invoice or allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentItem {
    pub name: String,
    pub quantity: u32,
    /// Tax-inclusive price in the smallest currency unit.
    pub unit_price: u64,
    pub tax_type: TaxType,
}

impl ValueObject for PaymentItem {}

impl PaymentItem {
    pub fn new(name: impl Into<String>, quantity: u32, unit_price: u64, tax_type: TaxType) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_price,
            tax_type,
        }
    }

    /// Shorthand for the common taxed line.
    pub fn taxed(name: impl Into<String>, quantity: u32, unit_price: u64) -> Self {
        Self::new(name, quantity, unit_price, TaxType::Taxed)
    }

    /// `quantity * unit_price`.
    pub fn line_total(&self) -> DomainResult<u64> {
        u64::from(self.quantity)
            .checked_mul(self.unit_price)
            .ok_or_else(|| DomainError::invariant(format!("line amount overflow ({})", self.name)))
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("item name must not be blank"));
        }
        if self.quantity == 0 {
            return Err(DomainError::validation(format!(
                "item quantity must be positive ({})",
                self.name
            )));
        }
        if self.unit_price == 0 {
            return Err(DomainError::validation(format!(
                "item unit_price must be positive ({})",
                self.name
            )));
        }
        if self.tax_type == TaxType::Mixed {
            return Err(DomainError::validation(format!(
                "a single item cannot be MIXED ({})",
                self.name
            )));
        }
        Ok(())
    }
}

/// Reject empty lists and malformed items.
pub fn validate_items(items: &[PaymentItem]) -> DomainResult<()> {
    if items.is_empty() {
        return Err(DomainError::validation("at least one item is required"));
    }
    items.iter().try_for_each(PaymentItem::validate)
}

/// Gross total of `items` (sum of line totals).
pub fn items_total(items: &[PaymentItem]) -> DomainResult<u64> {
    items.iter().try_fold(0u64, |total, item| {
        total
            .checked_add(item.line_total()?)
            .ok_or_else(|| DomainError::invariant("items total overflow"))
    })
}
