//! In-memory, single-writer registry of invoices.
//!
//! Every mutating method takes `&mut self`, so one book is one writer: two
//! allowance requests can never both pass the balance check against the same
//! stale `now_amount`. Callers that share a book across threads wrap it in a
//! mutex. Each call also takes an [`ExpectedVersion`] so a caller acting on an
//! older read of the invoice gets a `Conflict` instead of a silent overdraw.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use einvoice_core::{Aggregate, AggregateRoot, DomainError, DomainResult, ExpectedVersion};
use einvoice_events::{Event, EventEnvelope};

use crate::config::LedgerConfig;
use crate::invoice::{Invoice, InvoiceCommand, InvoiceEvent, InvoiceNumber};
use crate::replay::replay;
use crate::vendor::{QueryResponse, StatusTranslator};

/// Stream type recorded on journaled invoice events.
pub const INVOICE_STREAM: &str = "invoicing.invoice";

#[derive(Debug, Default)]
pub struct InvoiceBook {
    config: LedgerConfig,
    invoices: BTreeMap<InvoiceNumber, Invoice>,
    journals: BTreeMap<InvoiceNumber, Vec<EventEnvelope<InvoiceEvent>>>,
}

impl InvoiceBook {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            invoices: BTreeMap::new(),
            journals: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn get(&self, invoice_number: &InvoiceNumber) -> Option<&Invoice> {
        self.invoices.get(invoice_number)
    }

    pub fn invoices(&self) -> impl Iterator<Item = &Invoice> {
        self.invoices.values()
    }

    /// Committed events for `invoice_number`, oldest first.
    pub fn journal(&self, invoice_number: &InvoiceNumber) -> &[EventEnvelope<InvoiceEvent>] {
        self.journals
            .get(invoice_number)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Run `command` against its invoice and journal the resulting events.
    ///
    /// `IssueInvoice` creates the invoice; every other command requires it to
    /// exist. Issuance without a tax rate gets the configured default.
    pub fn dispatch(
        &mut self,
        command: InvoiceCommand,
        expected: ExpectedVersion,
    ) -> DomainResult<Vec<InvoiceEvent>> {
        let command = self.with_defaults(command);
        let invoice_number = command.invoice_number().clone();

        let events = match self.invoices.get(&invoice_number) {
            Some(invoice) => {
                expected.check(invoice.version())?;
                invoice.handle(&command)?
            }
            None if matches!(command, InvoiceCommand::IssueInvoice(_)) => {
                expected.check(0)?;
                Invoice::empty(invoice_number.clone()).handle(&command)?
            }
            None => {
                return Err(DomainError::not_found(format!("invoice {invoice_number}")));
            }
        };

        let invoice = self
            .invoices
            .entry(invoice_number.clone())
            .or_insert_with(|| Invoice::empty(invoice_number.clone()));
        let journal = self.journals.entry(invoice_number.clone()).or_default();
        for event in &events {
            invoice.apply(event);
            journal.push(EventEnvelope::new(
                invoice_number.as_str(),
                INVOICE_STREAM,
                invoice.version(),
                event.clone(),
            ));
            tracing::info!(
                invoice_number = %invoice_number,
                event_type = event.event_type(),
                version = invoice.version(),
                now_amount = invoice.now_amount(),
                "invoice event committed"
            );
        }

        Ok(events)
    }

    /// Replace the local copy of an invoice with one rebuilt from vendor history.
    ///
    /// The previous journal is dropped; the vendor is the system of record.
    pub fn refresh<T: StatusTranslator>(
        &mut self,
        response: &QueryResponse,
        translator: &T,
    ) -> DomainResult<&Invoice> {
        let invoice = replay(response, translator)?;
        Ok(self.import(invoice))
    }

    /// Install an invoice built outside the book (e.g. by replay).
    pub fn import(&mut self, invoice: Invoice) -> &Invoice {
        let invoice_number = invoice.invoice_number().clone();
        self.journals.remove(&invoice_number);
        tracing::info!(
            invoice_number = %invoice_number,
            version = invoice.version(),
            "invoice imported"
        );
        match self.invoices.entry(invoice_number) {
            Entry::Occupied(mut slot) => {
                slot.insert(invoice);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(invoice),
        }
    }

    /// Rebuild an invoice purely from its journal.
    ///
    /// Fails for imported invoices, whose journal does not start at issuance.
    pub fn rehydrate(&self, invoice_number: &InvoiceNumber) -> DomainResult<Invoice> {
        let journal = self.journal(invoice_number);
        if journal.is_empty() {
            return Err(DomainError::not_found(format!(
                "journal for invoice {invoice_number}"
            )));
        }

        let mut invoice = Invoice::empty(invoice_number.clone());
        for (index, envelope) in journal.iter().enumerate() {
            if envelope.sequence_number() != index as u64 + 1 {
                return Err(DomainError::invalid_state(format!(
                    "journal for invoice {invoice_number} does not start at issuance"
                )));
            }
            invoice.apply(envelope.payload());
        }
        Ok(invoice)
    }

    fn with_defaults(&self, command: InvoiceCommand) -> InvoiceCommand {
        match command {
            InvoiceCommand::IssueInvoice(mut cmd) => {
                cmd.tax_rate = cmd.tax_rate.or(Some(self.config.default_tax_rate));
                InvoiceCommand::IssueInvoice(cmd)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::allowance::AllowanceNumber;
    use crate::invoice::{InvalidateAllowance, IssueInvoice, OrderId, RequestAllowance};
    use crate::item::PaymentItem;
    use crate::tax::TaxRate;
    use crate::vendor::{AllowanceRecord, StatusCodeTable};

    fn number() -> InvoiceNumber {
        InvoiceNumber::new("AB12345678").unwrap()
    }

    fn issue_cmd() -> InvoiceCommand {
        InvoiceCommand::IssueInvoice(IssueInvoice {
            invoice_number: number(),
            order_id: OrderId::new("ORDER-1").unwrap(),
            items: vec![PaymentItem::taxed("Box", 1, 100)],
            tax_rate: None,
            vat_number: None,
            issued_on: Utc::now(),
        })
    }

    fn allowance_cmd(amount: u64) -> InvoiceCommand {
        InvoiceCommand::RequestAllowance(RequestAllowance {
            invoice_number: number(),
            items: vec![PaymentItem::taxed("Refund", 1, amount)],
            allowanced_on: Utc::now(),
            vendor_remaining_amount: None,
        })
    }

    #[test]
    fn issuance_uses_configured_default_rate() {
        let config = LedgerConfig {
            default_tax_rate: TaxRate::from_bps(1_000).unwrap(),
        };
        let mut book = InvoiceBook::new(config);
        book.dispatch(issue_cmd(), ExpectedVersion::Exact(0)).unwrap();

        let invoice = book.get(&number()).unwrap();
        assert_eq!(invoice.tax_rate().bps(), 1_000);
        assert_eq!(invoice.tax_amount(), 9);
    }

    #[test]
    fn stale_version_is_a_conflict_and_changes_nothing() {
        let mut book = InvoiceBook::default();
        book.dispatch(issue_cmd(), ExpectedVersion::Any).unwrap();
        book.dispatch(allowance_cmd(40), ExpectedVersion::Exact(1)).unwrap();

        // A second writer still holding version 1 must not post.
        let err = book
            .dispatch(allowance_cmd(40), ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(book.get(&number()).unwrap().now_amount(), 60);
        assert_eq!(book.journal(&number()).len(), 2);
    }

    #[test]
    fn commands_for_unknown_invoices_are_not_found() {
        let mut book = InvoiceBook::default();
        assert!(matches!(
            book.dispatch(allowance_cmd(10), ExpectedVersion::Any),
            Err(DomainError::NotFound(_))
        ));
        assert!(book.get(&number()).is_none());
    }

    #[test]
    fn failed_issuance_leaves_no_invoice_behind() {
        let mut book = InvoiceBook::default();
        let InvoiceCommand::IssueInvoice(mut cmd) = issue_cmd() else {
            unreachable!()
        };
        cmd.items.clear();

        assert!(book
            .dispatch(InvoiceCommand::IssueInvoice(cmd), ExpectedVersion::Any)
            .is_err());
        assert!(book.get(&number()).is_none());
        assert!(book.journal(&number()).is_empty());
    }

    #[test]
    fn journal_rehydrates_to_the_live_invoice() {
        let mut book = InvoiceBook::default();
        book.dispatch(issue_cmd(), ExpectedVersion::Any).unwrap();
        book.dispatch(allowance_cmd(40), ExpectedVersion::Any).unwrap();
        book.dispatch(allowance_cmd(30), ExpectedVersion::Any).unwrap();
        book.dispatch(
            InvoiceCommand::InvalidateAllowance(InvalidateAllowance {
                invoice_number: number(),
                allowance_number: AllowanceNumber::for_sequence(&number(), 1),
                invalid_on: Utc::now(),
            }),
            ExpectedVersion::Exact(3),
        )
        .unwrap();

        let journal = book.journal(&number());
        let sequences: Vec<u64> = journal.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert_eq!(journal[3].event_type(), "invoicing.invoice.allowance_invalidated");

        let rebuilt = book.rehydrate(&number()).unwrap();
        assert_eq!(&rebuilt, book.get(&number()).unwrap());
        assert_eq!(rebuilt.now_amount(), 70);
    }

    #[test]
    fn refresh_replaces_local_state_with_vendor_history() {
        let mut book = InvoiceBook::default();
        book.dispatch(issue_cmd(), ExpectedVersion::Any).unwrap();

        let InvoiceCommand::IssueInvoice(issued) = issue_cmd() else {
            unreachable!()
        };
        let response = QueryResponse {
            invoice_number: number(),
            order_id: issued.order_id,
            vat_number: None,
            items: issued.items,
            tax_rate: None,
            issued_on: issued.issued_on,
            void_on: None,
            allowances: vec![AllowanceRecord {
                allowance_number: AllowanceNumber::for_sequence(&number(), 1),
                amount: 25,
                date: Utc::now(),
                vendor_status_code: "1".to_string(),
                invalid_on: None,
                tax_amount: Some(1),
                items: Vec::new(),
            }],
        };
        let translator = StatusCodeTable::new("acme", ["1"], ["9"]).unwrap();

        let invoice = book.refresh(&response, &translator).unwrap();
        assert_eq!(invoice.now_amount(), 75);
        assert!(book.journal(&number()).is_empty());
        assert!(matches!(
            book.rehydrate(&number()),
            Err(DomainError::NotFound(_))
        ));

        // Further commands journal from the imported version onward.
        book.dispatch(allowance_cmd(5), ExpectedVersion::Exact(2)).unwrap();
        assert_eq!(book.journal(&number())[0].sequence_number(), 3);
        assert!(matches!(
            book.rehydrate(&number()),
            Err(DomainError::InvalidState(_))
        ));
    }
}
