//! Error types for shipment reconciliation

use thiserror::Error;

/// Result type for reconciliation
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Core (storage, lookup) error
    #[error(transparent)]
    Core(#[from] freight_core::Error),

    /// Invoicing error
    #[error(transparent)]
    Invoicing(#[from] invoicing::Error),

    /// Pay engine error
    #[error(transparent)]
    Pay(#[from] pay_engine::Error),

    /// Classification error
    #[error(transparent)]
    Lanes(#[from] lane_classifier::Error),

    /// Source rejected the credentials
    #[error("Authentication failed with status {status}: check the API key")]
    Unauthorized {
        /// HTTP status code
        status: u16,
    },

    /// Source throttled the request
    #[error("Rate limit exceeded by shipment source")]
    RateLimited {
        /// Retry-After hint
        retry_after: Option<u64>,
    },

    /// Request timed out
    #[error("Timeout fetching shipments: {0}")]
    Timeout(String),

    /// Source answered with an error status
    #[error("Shipment source error {status}: {message}")]
    Source {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response or shipment could not be parsed
    #[error("Failed to parse {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Failure of the external feed rather than of our own data
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized { .. }
                | Error::RateLimited { .. }
                | Error::Timeout(_)
                | Error::Source { .. }
                | Error::Http(_)
        )
    }
}
