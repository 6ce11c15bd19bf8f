//! Error types for invoicing

use freight_core::InvoiceStatus;
use thiserror::Error;
use uuid::Uuid;

/// Result type for invoicing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Invoicing errors
#[derive(Error, Debug)]
pub enum Error {
    /// Core (storage, lookup) error
    #[error(transparent)]
    Core(#[from] freight_core::Error),

    /// Lifecycle edge not allowed
    #[error("Invoice {invoice_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Invoice
        invoice_id: Uuid,
        /// Current status
        from: InvoiceStatus,
        /// Requested status
        to: InvoiceStatus,
    },

    /// Amounts are frozen
    #[error("Invoice {0} is finalized; amounts are frozen")]
    Frozen(Uuid),
}
