use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use einvoice_core::{Aggregate, AggregateRoot, DomainError, DomainResult, code_newtype};
use einvoice_events::Event;

use crate::allowance::{Allowance, AllowanceDraft, AllowanceNumber, remaining_before};
use crate::item::{PaymentItem, items_total, validate_items};
use crate::tax::{
    TaxRate, TaxType, classify_invoice_tax_type, invoice_net_amount, invoice_tax_amount,
};
use crate::vendor::{AllowanceAck, IssuanceAck};

code_newtype!(
    /// Invoice number assigned by the e-invoice vendor at issuance.
    pub struct InvoiceNumber,
    "InvoiceNumber"
);

code_newtype!(
    /// Caller-assigned correlation key (usually the shop order id).
    pub struct OrderId,
    "OrderId"
);

/// Buyer's business tax id: exactly 8 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VatNumber(String);

impl VatNumber {
    pub fn new(value: impl AsRef<str>) -> DomainResult<Self> {
        let value = value.as_ref().trim();
        if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "vat number must be 8 digits (got {value:?})"
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VatNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VatNumber> for String {
    fn from(value: VatNumber) -> Self {
        value.0
    }
}

/// Invoice state lifecycle: `Inited -> Issued -> {Void | Allowanced}`.
///
/// `Allowanced` is not terminal: further allowances may post, and the invoice
/// can still be voided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceState {
    Inited,
    Issued,
    Void,
    Allowanced,
}

/// Aggregate root: Invoice.
///
/// `now_amount` and `state` are never adjusted in place; `settle`
/// recomputes both from the allowance list after every applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    invoice_number: InvoiceNumber,
    order_id: Option<OrderId>,
    vat_number: Option<VatNumber>,
    items: Vec<PaymentItem>,
    issued_amount: u64,
    now_amount: u64,
    tax_rate: TaxRate,
    tax_amount: u64,
    tax_type: TaxType,
    state: InvoiceState,
    issued_on: Option<DateTime<Utc>>,
    void_on: Option<DateTime<Utc>>,
    allowances: Vec<Allowance>,
    accumulated_allowances: Vec<Allowance>,
    /// Vendor-reported balance minus the locally derived one. Never positive;
    /// reset to 0 once no allowance is active.
    balance_adjustment: i64,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-issued aggregate instance for rehydration.
    pub fn empty(invoice_number: InvoiceNumber) -> Self {
        Self {
            invoice_number,
            order_id: None,
            vat_number: None,
            items: Vec::new(),
            issued_amount: 0,
            now_amount: 0,
            tax_rate: TaxRate::default(),
            tax_amount: 0,
            tax_type: TaxType::Taxed,
            state: InvoiceState::Inited,
            issued_on: None,
            void_on: None,
            allowances: Vec::new(),
            accumulated_allowances: Vec::new(),
            balance_adjustment: 0,
            version: 0,
            created: false,
        }
    }

    pub fn invoice_number(&self) -> &InvoiceNumber {
        &self.invoice_number
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        self.order_id.as_ref()
    }

    pub fn vat_number(&self) -> Option<&VatNumber> {
        self.vat_number.as_ref()
    }

    pub fn items(&self) -> &[PaymentItem] {
        &self.items
    }

    /// Gross total at issuance.
    pub fn issued_amount(&self) -> u64 {
        self.issued_amount
    }

    /// Outstanding balance not yet credited back.
    pub fn now_amount(&self) -> u64 {
        self.now_amount
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn tax_amount(&self) -> u64 {
        self.tax_amount
    }

    pub fn tax_type(&self) -> TaxType {
        self.tax_type
    }

    pub fn net_amount(&self) -> u64 {
        invoice_net_amount(self.issued_amount, self.tax_amount)
    }

    pub fn state(&self) -> InvoiceState {
        self.state
    }

    pub fn issued_on(&self) -> Option<DateTime<Utc>> {
        self.issued_on
    }

    pub fn void_on(&self) -> Option<DateTime<Utc>> {
        self.void_on
    }

    /// Every allowance ever issued, in creation order (invalidated ones included).
    pub fn allowances(&self) -> &[Allowance] {
        &self.allowances
    }

    /// Active chain rebuilt by ledger replay; always empty on live invoices.
    pub fn accumulated_allowances(&self) -> &[Allowance] {
        &self.accumulated_allowances
    }

    pub fn allowance(&self, number: &AllowanceNumber) -> Option<&Allowance> {
        self.allowances.iter().find(|a| a.allowance_number() == number)
    }

    pub fn balance_adjustment(&self) -> i64 {
        self.balance_adjustment
    }

    /// Invariant: allowances post only against issued, non-void invoices.
    pub fn can_accept_allowance(&self) -> bool {
        matches!(self.state, InvoiceState::Issued | InvoiceState::Allowanced)
    }
}

impl Invoice {
    /// Issue a new invoice once the vendor has acknowledged it.
    ///
    /// `tax_rate` defaults to the standard rate.
    pub fn issue(
        ack: &IssuanceAck,
        order_id: OrderId,
        items: Vec<PaymentItem>,
        tax_rate: Option<TaxRate>,
        vat_number: Option<VatNumber>,
    ) -> DomainResult<Self> {
        let mut invoice = Self::empty(ack.invoice_number.clone());
        invoice.execute(&InvoiceCommand::IssueInvoice(IssueInvoice {
            invoice_number: ack.invoice_number.clone(),
            order_id,
            items,
            tax_rate,
            vat_number,
            issued_on: ack.issued_on,
        }))?;

        tracing::info!(
            invoice_number = %invoice.invoice_number,
            issued_amount = invoice.issued_amount,
            tax_amount = invoice.tax_amount,
            tax_type = ?invoice.tax_type,
            "invoice issued"
        );
        Ok(invoice)
    }

    /// Void the invoice. Balance and allowances are left untouched.
    pub fn void(&mut self, void_on: Option<DateTime<Utc>>) -> DomainResult<()> {
        self.execute(&InvoiceCommand::VoidInvoice(VoidInvoice {
            invoice_number: self.invoice_number.clone(),
            reason: None,
            void_on: void_on.unwrap_or_else(Utc::now),
        }))?;

        tracing::info!(invoice_number = %self.invoice_number, "invoice voided");
        Ok(())
    }

    /// Post an allowance for `items` after the vendor accepted it.
    ///
    /// When the acknowledgment carries the vendor's own remaining balance, that
    /// figure becomes the invoice's `now_amount`.
    pub fn request_allowance(
        &mut self,
        items: Vec<PaymentItem>,
        ack: Option<&AllowanceAck>,
    ) -> DomainResult<&Allowance> {
        self.execute(&InvoiceCommand::RequestAllowance(RequestAllowance {
            invoice_number: self.invoice_number.clone(),
            items,
            allowanced_on: ack.map(|a| a.allowanced_on).unwrap_or_else(Utc::now),
            vendor_remaining_amount: ack.and_then(|a| a.remaining_amount),
        }))?;

        let allowance = self
            .allowances
            .last()
            .ok_or_else(|| DomainError::invariant("allowance missing after posting"))?;
        tracing::info!(
            invoice_number = %self.invoice_number,
            allowance_number = %allowance.allowance_number(),
            allowance_price = allowance.allowance_price(),
            now_amount = self.now_amount,
            "allowance issued"
        );
        Ok(allowance)
    }

    /// Invalidate an allowance, restoring exactly its price to `now_amount`.
    pub fn invalidate_allowance(
        &mut self,
        allowance_number: &AllowanceNumber,
        invalid_on: Option<DateTime<Utc>>,
    ) -> DomainResult<()> {
        self.execute(&InvoiceCommand::InvalidateAllowance(InvalidateAllowance {
            invoice_number: self.invoice_number.clone(),
            allowance_number: allowance_number.clone(),
            invalid_on: invalid_on.unwrap_or_else(Utc::now),
        }))?;

        tracing::info!(
            invoice_number = %self.invoice_number,
            allowance_number = %allowance_number,
            now_amount = self.now_amount,
            "allowance invalidated"
        );
        Ok(())
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceNumber;

    fn id(&self) -> &Self::Id {
        &self.invoice_number
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub invoice_number: InvoiceNumber,
    pub order_id: OrderId,
    pub items: Vec<PaymentItem>,
    pub tax_rate: Option<TaxRate>,
    pub vat_number: Option<VatNumber>,
    pub issued_on: DateTime<Utc>,
}

/// Command: RequestAllowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAllowance {
    pub invoice_number: InvoiceNumber,
    pub items: Vec<PaymentItem>,
    pub allowanced_on: DateTime<Utc>,
    /// Remaining balance reported by the vendor, if any.
    pub vendor_remaining_amount: Option<u64>,
}

/// Command: InvalidateAllowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateAllowance {
    pub invoice_number: InvoiceNumber,
    pub allowance_number: AllowanceNumber,
    pub invalid_on: DateTime<Utc>,
}

/// Command: VoidInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInvoice {
    pub invoice_number: InvoiceNumber,
    pub reason: Option<String>,
    pub void_on: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    RequestAllowance(RequestAllowance),
    InvalidateAllowance(InvalidateAllowance),
    VoidInvoice(VoidInvoice),
}

impl InvoiceCommand {
    pub fn invoice_number(&self) -> &InvoiceNumber {
        match self {
            InvoiceCommand::IssueInvoice(c) => &c.invoice_number,
            InvoiceCommand::RequestAllowance(c) => &c.invoice_number,
            InvoiceCommand::InvalidateAllowance(c) => &c.invoice_number,
            InvoiceCommand::VoidInvoice(c) => &c.invoice_number,
        }
    }
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub invoice_number: InvoiceNumber,
    pub order_id: OrderId,
    pub vat_number: Option<VatNumber>,
    pub items: Vec<PaymentItem>,
    pub tax_rate: TaxRate,
    pub tax_type: TaxType,
    pub tax_amount: u64,
    pub issued_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllowanceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceIssued {
    pub invoice_number: InvoiceNumber,
    pub allowance_number: AllowanceNumber,
    pub items: Vec<PaymentItem>,
    pub allowance_price: u64,
    pub tax_amount: u64,
    /// Pre-posting balance snapshot.
    pub remaining_amount: u64,
    pub vendor_remaining_amount: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllowanceInvalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceInvalidated {
    pub invoice_number: InvoiceNumber,
    pub allowance_number: AllowanceNumber,
    pub allowance_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVoided {
    pub invoice_number: InvoiceNumber,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    AllowanceIssued(AllowanceIssued),
    AllowanceInvalidated(AllowanceInvalidated),
    InvoiceVoided(InvoiceVoided),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::AllowanceIssued(_) => "invoicing.invoice.allowance_issued",
            InvoiceEvent::AllowanceInvalidated(_) => "invoicing.invoice.allowance_invalidated",
            InvoiceEvent::InvoiceVoided(_) => "invoicing.invoice.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::AllowanceIssued(e) => e.occurred_at,
            InvoiceEvent::AllowanceInvalidated(e) => e.occurred_at,
            InvoiceEvent::InvoiceVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.invoice_number = e.invoice_number.clone();
                self.order_id = Some(e.order_id.clone());
                self.vat_number = e.vat_number.clone();
                self.items = e.items.clone();
                self.issued_amount = e.issued_amount;
                self.tax_rate = e.tax_rate;
                self.tax_amount = e.tax_amount;
                self.tax_type = e.tax_type;
                self.issued_on = Some(e.occurred_at);
                self.void_on = None;
                self.allowances.clear();
                self.accumulated_allowances.clear();
                self.balance_adjustment = 0;
                self.state = InvoiceState::Issued;
                self.created = true;
            }
            InvoiceEvent::AllowanceIssued(e) => {
                self.allowances.push(Allowance::issued(AllowanceDraft {
                    allowance_number: e.allowance_number.clone(),
                    invoice_number: e.invoice_number.clone(),
                    allowance_price: e.allowance_price,
                    items: e.items.clone(),
                    tax_amount: e.tax_amount,
                    allowanced_on: e.occurred_at,
                    remaining_amount: e.remaining_amount,
                }));
                if let Some(reported) = e.vendor_remaining_amount {
                    // The vendor may only report less than the ledger derives.
                    self.balance_adjustment = balance_drift(reported, self.derived_balance()).min(0);
                }
            }
            InvoiceEvent::AllowanceInvalidated(e) => {
                if let Some(allowance) = self
                    .allowances
                    .iter_mut()
                    .find(|a| *a.allowance_number() == e.allowance_number)
                {
                    let invalidated = allowance.invalidate(e.occurred_at);
                    debug_assert!(
                        invalidated.is_ok(),
                        "applied an invalidation that handle would reject: {invalidated:?}"
                    );
                }
            }
            InvoiceEvent::InvoiceVoided(e) => {
                self.state = InvoiceState::Void;
                self.void_on = Some(e.occurred_at);
            }
        }

        self.settle();

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.ensure_invoice_number(command.invoice_number())?;
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RequestAllowance(cmd) => self.handle_request_allowance(cmd),
            InvoiceCommand::InvalidateAllowance(cmd) => self.handle_invalidate_allowance(cmd),
            InvoiceCommand::VoidInvoice(cmd) => self.handle_void(cmd),
        }
    }
}

/// `reported - derived`, saturating into `i64`.
fn balance_drift(reported: u64, derived: u64) -> i64 {
    let drift = i128::from(reported) - i128::from(derived);
    i64::try_from(drift).unwrap_or(if drift < 0 { i64::MIN } else { i64::MAX })
}

impl Invoice {
    /// Issued amount minus every active allowance, before vendor adjustment.
    fn derived_balance(&self) -> u64 {
        remaining_before(self.issued_amount, &self.allowances)
    }

    /// Recompute `now_amount` and `state` from the allowance list.
    ///
    /// The only place either field is written after issuance.
    fn settle(&mut self) {
        let any_active = self.allowances.iter().any(Allowance::is_active);
        if !any_active {
            self.balance_adjustment = 0;
        }
        let balance = i128::from(self.derived_balance()) + i128::from(self.balance_adjustment);
        self.now_amount = u64::try_from(balance.max(0)).unwrap_or(u64::MAX);

        if self.created && self.state != InvoiceState::Void {
            self.state = if any_active {
                InvoiceState::Allowanced
            } else {
                InvoiceState::Issued
            };
        }
    }

    fn ensure_invoice_number(&self, invoice_number: &InvoiceNumber) -> Result<(), DomainError> {
        if self.invoice_number != *invoice_number {
            return Err(DomainError::invariant("invoice_number mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already issued"));
        }

        validate_items(&cmd.items)?;
        let issued_amount = items_total(&cmd.items)?;
        let tax_rate = cmd.tax_rate.unwrap_or_default();
        let tax_type = classify_invoice_tax_type(&cmd.items)?;
        let tax_amount = invoice_tax_amount(&cmd.items, tax_rate)?;

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            invoice_number: cmd.invoice_number.clone(),
            order_id: cmd.order_id.clone(),
            vat_number: cmd.vat_number.clone(),
            items: cmd.items.clone(),
            tax_rate,
            tax_type,
            tax_amount,
            issued_amount,
            occurred_at: cmd.issued_on,
        })])
    }

    fn handle_request_allowance(
        &self,
        cmd: &RequestAllowance,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        if !self.can_accept_allowance() {
            return Err(DomainError::invalid_state(format!(
                "cannot issue allowance on invoice in state {:?}",
                self.state
            )));
        }

        validate_items(&cmd.items)?;
        let allowance_price = items_total(&cmd.items)?;
        let derived = self.derived_balance();
        let available = self.now_amount.min(derived);
        if allowance_price > available {
            return Err(DomainError::insufficient_balance(allowance_price, available));
        }

        if let Some(reported) = cmd.vendor_remaining_amount {
            let derived_after = derived - allowance_price;
            if reported > derived_after {
                return Err(DomainError::invariant(format!(
                    "vendor reports remaining balance {reported} on invoice {} \
                     but active allowances leave at most {derived_after}",
                    self.invoice_number
                )));
            }
            let expected = available - allowance_price;
            if reported != expected {
                tracing::warn!(
                    invoice_number = %self.invoice_number,
                    reported,
                    expected,
                    "vendor remaining balance differs from local ledger; using vendor figure"
                );
            }
        }

        Ok(vec![InvoiceEvent::AllowanceIssued(AllowanceIssued {
            invoice_number: self.invoice_number.clone(),
            allowance_number: AllowanceNumber::for_sequence(
                &self.invoice_number,
                self.allowances.len() + 1,
            ),
            items: cmd.items.clone(),
            allowance_price,
            tax_amount: invoice_tax_amount(&cmd.items, self.tax_rate)?,
            remaining_amount: remaining_before(self.issued_amount, &self.allowances),
            vendor_remaining_amount: cmd.vendor_remaining_amount,
            occurred_at: cmd.allowanced_on,
        })])
    }

    fn handle_invalidate_allowance(
        &self,
        cmd: &InvalidateAllowance,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::invalid_state("invoice has not been issued"));
        }

        let allowance = self.allowance(&cmd.allowance_number).ok_or_else(|| {
            DomainError::not_found(format!("allowance {}", cmd.allowance_number))
        })?;
        allowance.ensure_invalidatable()?;

        Ok(vec![InvoiceEvent::AllowanceInvalidated(AllowanceInvalidated {
            invoice_number: self.invoice_number.clone(),
            allowance_number: cmd.allowance_number.clone(),
            allowance_price: allowance.allowance_price(),
            occurred_at: cmd.invalid_on,
        })])
    }

    fn handle_void(&self, cmd: &VoidInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::invalid_state("invoice has not been issued"));
        }
        if self.state == InvoiceState::Void {
            return Err(DomainError::invalid_state("invoice is already void"));
        }

        Ok(vec![InvoiceEvent::InvoiceVoided(InvoiceVoided {
            invoice_number: self.invoice_number.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.void_on,
        })])
    }
}

/// Ledger replay support.
impl Invoice {
    /// Install a replayed allowance chain and settle the balance.
    pub(crate) fn restore_allowances(&mut self, chain: Vec<Allowance>) {
        self.accumulated_allowances = chain.iter().filter(|a| a.is_active()).cloned().collect();
        self.version += chain.len() as u64;
        self.allowances = chain;
        self.settle();
    }
}
