//! Error types for lane classification

use thiserror::Error;

/// Classification error
#[derive(Debug, Error)]
pub enum Error {
    /// Core (storage, lookup) error
    #[error(transparent)]
    Core(#[from] freight_core::Error),

    /// Invoicing error
    #[error(transparent)]
    Invoicing(#[from] invoicing::Error),

    /// Lane definition rejected
    #[error("Invalid lane: {0}")]
    InvalidLane(String),

    /// Load input rejected
    #[error("Invalid load: {0}")]
    InvalidLoad(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
