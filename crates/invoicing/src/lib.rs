//! Invoice issuance & partial-allowance ledger.
//!
//! Business rules for issued invoices and the allowances (partial credit
//! notes) posted against them, implemented purely as deterministic domain
//! logic (no IO, no HTTP, no storage). Vendor adapters translate their wire
//! formats into the types in [`vendor`] and call in here only after the vendor
//! has acknowledged an operation.
//!
//! The ledger does no locking: mutating calls against one invoice must be
//! serialised by the caller, e.g. by routing them through one [`InvoiceBook`].

pub mod allowance;
pub mod book;
pub mod config;
pub mod invoice;
pub mod item;
pub mod replay;
pub mod tax;
pub mod vendor;

pub use allowance::{Allowance, AllowanceNumber, AllowanceState};
pub use book::InvoiceBook;
pub use config::LedgerConfig;
pub use invoice::{
    AllowanceInvalidated, AllowanceIssued, InvalidateAllowance, Invoice, InvoiceCommand,
    InvoiceEvent, InvoiceIssued, InvoiceNumber, InvoiceState, InvoiceVoided, IssueInvoice,
    OrderId, RequestAllowance, VatNumber, VoidInvoice,
};
pub use item::PaymentItem;
pub use replay::replay;
pub use tax::{
    TaxRate, TaxType, classify_invoice_tax_type, invoice_net_amount, invoice_tax_amount, item_tax,
};
pub use vendor::{
    AllowanceAck, AllowanceRecord, IssuanceAck, QueryResponse, StatusCodeTable, StatusTranslator,
};
