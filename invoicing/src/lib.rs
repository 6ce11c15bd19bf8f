//! Invoicing
//!
//! Computes what a customer owes for a load and drives the invoice lifecycle.
//!
//! Amounts of an unbilled invoice follow the current load and lane on every
//! read. Finalizing an invoice snapshots amounts and line items; from then on
//! reads return the snapshot and lane or load edits no longer affect it.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod calculator;
pub mod error;
pub mod line_items;
pub mod lifecycle;

pub use calculator::{price_load, InvoiceAmounts, InvoiceCalculator, Pricing};
pub use error::{Error, Result};
pub use line_items::build_line_items;
pub use lifecycle::InvoiceService;
