//! Vendor-facing payloads and status translation.
//!
//! Vendor adapters decode their own wire formats into these types; the ledger
//! never sees vendor-specific fields.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use einvoice_core::{DomainError, DomainResult};

use crate::allowance::{AllowanceNumber, AllowanceState};
use crate::invoice::{InvoiceNumber, OrderId, VatNumber};
use crate::item::PaymentItem;
use crate::tax::TaxRate;

/// Vendor confirmation that an invoice was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceAck {
    pub invoice_number: InvoiceNumber,
    pub issued_on: DateTime<Utc>,
}

/// Vendor confirmation that an allowance was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceAck {
    pub allowanced_on: DateTime<Utc>,
    /// Remaining invoice balance as the vendor computes it.
    #[serde(default)]
    pub remaining_amount: Option<u64>,
}

/// One allowance entry in a vendor query response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceRecord {
    pub allowance_number: AllowanceNumber,
    pub amount: u64,
    pub date: DateTime<Utc>,
    pub vendor_status_code: String,
    #[serde(default)]
    pub invalid_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tax_amount: Option<u64>,
    #[serde(default)]
    pub items: Vec<PaymentItem>,
}

/// Decoded vendor answer to an invoice status query.
///
/// `allowances` is flat and in the vendor's chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub invoice_number: InvoiceNumber,
    pub order_id: OrderId,
    #[serde(default)]
    pub vat_number: Option<VatNumber>,
    pub items: Vec<PaymentItem>,
    #[serde(default)]
    pub tax_rate: Option<TaxRate>,
    pub issued_on: DateTime<Utc>,
    #[serde(default)]
    pub void_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allowances: Vec<AllowanceRecord>,
}

/// Maps a vendor's allowance status codes onto [`AllowanceState`].
pub trait StatusTranslator {
    /// Vendor name, for logs.
    fn vendor(&self) -> &str;

    /// Resolve `code`; unknown codes are a validation error.
    fn allowance_state(&self, code: &str) -> DomainResult<AllowanceState>;
}

impl<T: StatusTranslator + ?Sized> StatusTranslator for &T {
    fn vendor(&self) -> &str {
        (**self).vendor()
    }

    fn allowance_state(&self, code: &str) -> DomainResult<AllowanceState> {
        (**self).allowance_state(code)
    }
}

/// Table-driven [`StatusTranslator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCodeTable {
    vendor: String,
    issued: BTreeSet<String>,
    invalid: BTreeSet<String>,
}

impl StatusCodeTable {
    /// Build a table; a code listed as both issued and invalid is rejected.
    pub fn new<I, J, S>(vendor: impl Into<String>, issued: I, invalid: J) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let issued: BTreeSet<String> = issued.into_iter().map(Into::into).collect();
        let invalid: BTreeSet<String> = invalid.into_iter().map(Into::into).collect();

        if let Some(code) = issued.intersection(&invalid).next() {
            return Err(DomainError::validation(format!(
                "status code {code:?} cannot mean both issued and invalid"
            )));
        }
        Ok(Self {
            vendor: vendor.into(),
            issued,
            invalid,
        })
    }
}

impl StatusTranslator for StatusCodeTable {
    fn vendor(&self) -> &str {
        &self.vendor
    }

    fn allowance_state(&self, code: &str) -> DomainResult<AllowanceState> {
        let code = code.trim();
        if self.issued.contains(code) {
            Ok(AllowanceState::Issued)
        } else if self.invalid.contains(code) {
            Ok(AllowanceState::Invalid)
        } else {
            Err(DomainError::validation(format!(
                "unknown {} allowance status code {code:?}",
                self.vendor
            )))
        }
    }
}
