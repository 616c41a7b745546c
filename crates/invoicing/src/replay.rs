//! Ledger replay: rebuild an invoice and its allowance chain from a vendor's
//! flat query history, without a round-trip per entry.
//!
//! Each record is built against the balance left by the earlier records still
//! active, then resolved against its vendor status before the next record
//! looks at it. The running total is carried forward, so each record costs
//! O(1) beyond its own items. Re-running replay on the same input
//! therefore yields the same balance snapshots, and invalidated entries never
//! count against later ones.

use std::collections::HashSet;

use einvoice_core::{Aggregate, DomainError, DomainResult};

use crate::allowance::{Allowance, AllowanceDraft, AllowanceState};
use crate::invoice::{Invoice, InvoiceCommand, IssueInvoice, VoidInvoice};
use crate::item::{items_total, validate_items};
use crate::tax::invoice_tax_amount;
use crate::vendor::{AllowanceRecord, QueryResponse, StatusTranslator};

/// Reconstruct the invoice described by `response`.
pub fn replay<T: StatusTranslator>(response: &QueryResponse, translator: &T) -> DomainResult<Invoice> {
    let mut invoice = Invoice::empty(response.invoice_number.clone());
    invoice.execute(&InvoiceCommand::IssueInvoice(IssueInvoice {
        invoice_number: response.invoice_number.clone(),
        order_id: response.order_id.clone(),
        items: response.items.clone(),
        tax_rate: response.tax_rate,
        vat_number: response.vat_number.clone(),
        issued_on: response.issued_on,
    }))?;

    let mut seen = HashSet::with_capacity(response.allowances.len());
    let mut processed: Vec<Allowance> = Vec::with_capacity(response.allowances.len());
    let mut active_total: u64 = 0;

    for (index, record) in response.allowances.iter().enumerate() {
        if !seen.insert(&record.allowance_number) {
            return Err(DomainError::validation(format!(
                "duplicate allowance {} in vendor history",
                record.allowance_number
            )));
        }
        let state = translator.allowance_state(&record.vendor_status_code)?;

        let remaining_amount = invoice.issued_amount().saturating_sub(active_total);
        let mut allowance = allowance_against(&invoice, remaining_amount, record)?;
        if state == AllowanceState::Invalid {
            allowance.invalidate(record.invalid_on.unwrap_or(record.date))?;
        } else {
            active_total += allowance.allowance_price();
        }

        tracing::debug!(
            vendor = translator.vendor(),
            invoice_number = %response.invoice_number,
            index,
            allowance_number = %record.allowance_number,
            remaining_amount = allowance.remaining_amount(),
            status = ?allowance.status(),
            "replayed allowance"
        );
        processed.push(allowance);
    }

    invoice.restore_allowances(processed);

    if let Some(void_on) = response.void_on {
        invoice.execute(&InvoiceCommand::VoidInvoice(VoidInvoice {
            invoice_number: response.invoice_number.clone(),
            reason: None,
            void_on,
        }))?;
    }

    tracing::info!(
        vendor = translator.vendor(),
        invoice_number = %invoice.invoice_number(),
        allowances = invoice.allowances().len(),
        now_amount = invoice.now_amount(),
        state = ?invoice.state(),
        "invoice replayed from vendor history"
    );
    Ok(invoice)
}

/// Build the allowance for `record` against the balance the earlier active
/// records leave on `invoice`.
fn allowance_against(
    invoice: &Invoice,
    remaining_amount: u64,
    record: &AllowanceRecord,
) -> DomainResult<Allowance> {
    if record.amount == 0 {
        return Err(DomainError::validation(format!(
            "allowance {} has no amount",
            record.allowance_number
        )));
    }

    if record.amount > remaining_amount {
        return Err(DomainError::invariant(format!(
            "vendor history overdraws invoice {}: allowance {} of {} against balance {}",
            invoice.invoice_number(),
            record.allowance_number,
            record.amount,
            remaining_amount
        )));
    }

    let tax_amount = match record.tax_amount {
        Some(tax) => tax,
        None if record.items.is_empty() => 0,
        None => invoice_tax_amount(&record.items, invoice.tax_rate())?,
    };
    if !record.items.is_empty() {
        validate_items(&record.items)?;
        let items_amount = items_total(&record.items)?;
        if items_amount != record.amount {
            return Err(DomainError::validation(format!(
                "allowance {} items total {} but the vendor reports {}",
                record.allowance_number, items_amount, record.amount
            )));
        }
    }

    Ok(Allowance::issued(AllowanceDraft {
        allowance_number: record.allowance_number.clone(),
        invoice_number: invoice.invoice_number().clone(),
        allowance_price: record.amount,
        items: record.items.clone(),
        tax_amount,
        allowanced_on: record.date,
        remaining_amount,
    }))
}
