//! Partial credit notes issued against an invoice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use einvoice_core::{DomainError, DomainResult, Entity, code_newtype};

use crate::invoice::InvoiceNumber;
use crate::item::PaymentItem;

code_newtype!(
    /// Allowance number: parent invoice number, `AL`, 4-digit sequence.
    pub struct AllowanceNumber,
    "AllowanceNumber"
);

impl AllowanceNumber {
    /// Number of the `sequence`-th allowance (1-based) of `invoice_number`.
    ///
    /// Sequences come from the count of allowances ever issued, so numbers of
    /// invalidated allowances are never handed out again.
    pub fn for_sequence(invoice_number: &InvoiceNumber, sequence: usize) -> Self {
        Self(format!("{invoice_number}AL{sequence:04}"))
    }
}

/// Allowance status lifecycle: `Inited -> Issued -> Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllowanceState {
    Inited,
    Issued,
    Invalid,
}

/// A partial credit against an invoice.
///
/// Owned by its invoice; `invoice_number` is the back-reference used to route
/// balance changes through the owner. Built only by the invoice itself or by
/// ledger replay, since numbering and the balance snapshot both depend on the
/// parent's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowance {
    allowance_number: AllowanceNumber,
    invoice_number: InvoiceNumber,
    allowance_price: u64,
    items: Vec<PaymentItem>,
    tax_amount: u64,
    status: AllowanceState,
    allowanced_on: DateTime<Utc>,
    invalid_on: Option<DateTime<Utc>>,
    remaining_amount: u64,
}

/// Fields fixed when an allowance posts.
#[derive(Debug, Clone)]
pub(crate) struct AllowanceDraft {
    pub allowance_number: AllowanceNumber,
    pub invoice_number: InvoiceNumber,
    pub allowance_price: u64,
    pub items: Vec<PaymentItem>,
    pub tax_amount: u64,
    pub allowanced_on: DateTime<Utc>,
    pub remaining_amount: u64,
}

impl Allowance {
    pub(crate) fn issued(draft: AllowanceDraft) -> Self {
        Self {
            allowance_number: draft.allowance_number,
            invoice_number: draft.invoice_number,
            allowance_price: draft.allowance_price,
            items: draft.items,
            tax_amount: draft.tax_amount,
            status: AllowanceState::Issued,
            allowanced_on: draft.allowanced_on,
            invalid_on: None,
            remaining_amount: draft.remaining_amount,
        }
    }

    pub fn allowance_number(&self) -> &AllowanceNumber {
        &self.allowance_number
    }

    pub fn invoice_number(&self) -> &InvoiceNumber {
        &self.invoice_number
    }

    /// Amount credited back to the buyer.
    pub fn allowance_price(&self) -> u64 {
        self.allowance_price
    }

    pub fn items(&self) -> &[PaymentItem] {
        &self.items
    }

    pub fn tax_amount(&self) -> u64 {
        self.tax_amount
    }

    pub fn status(&self) -> AllowanceState {
        self.status
    }

    pub fn allowanced_on(&self) -> DateTime<Utc> {
        self.allowanced_on
    }

    pub fn invalid_on(&self) -> Option<DateTime<Utc>> {
        self.invalid_on
    }

    /// Invoice balance immediately before this allowance posted, counting only
    /// earlier allowances that are still active.
    pub fn remaining_amount(&self) -> u64 {
        self.remaining_amount
    }

    pub fn is_active(&self) -> bool {
        self.status == AllowanceState::Issued
    }

    /// Invariant: only an issued allowance can be invalidated, and only once.
    pub fn ensure_invalidatable(&self) -> DomainResult<()> {
        match self.status {
            AllowanceState::Issued => Ok(()),
            AllowanceState::Invalid => Err(DomainError::invalid_state(format!(
                "allowance {} is already invalid",
                self.allowance_number
            ))),
            AllowanceState::Inited => Err(DomainError::invalid_state(format!(
                "allowance {} has not been issued",
                self.allowance_number
            ))),
        }
    }

    /// Transition to `Invalid`.
    ///
    /// The balance effect belongs to the owning invoice; see
    /// [`Invoice::invalidate_allowance`](crate::invoice::Invoice::invalidate_allowance).
    pub(crate) fn invalidate(&mut self, invalid_on: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_invalidatable()?;
        self.status = AllowanceState::Invalid;
        self.invalid_on = Some(invalid_on);
        Ok(())
    }
}

impl Entity for Allowance {
    type Id = AllowanceNumber;

    fn id(&self) -> &Self::Id {
        &self.allowance_number
    }
}

/// Sum of prices of the active allowances in `allowances`.
pub(crate) fn active_total(allowances: &[Allowance]) -> u64 {
    allowances
        .iter()
        .filter(|a| a.is_active())
        .fold(0u64, |total, a| total.saturating_add(a.allowance_price))
}

/// Pre-posting balance for the allowance that follows `prior`.
pub(crate) fn remaining_before(issued_amount: u64, prior: &[Allowance]) -> u64 {
    issued_amount.saturating_sub(active_total(prior))
}
