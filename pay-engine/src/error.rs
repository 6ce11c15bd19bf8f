//! Error types for the pay engine

use thiserror::Error;
use uuid::Uuid;

/// Pay engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Core (storage, lookup) error
    #[error(transparent)]
    Core(#[from] freight_core::Error),

    /// Invoicing error
    #[error(transparent)]
    Invoicing(#[from] invoicing::Error),

    /// Carrier partnership is deactivated
    #[error("Carrier partnership {0} is inactive")]
    InactivePartnership(Uuid),

    /// Profile cannot pay this kind of subject
    #[error("Profile {profile_id} does not apply to {subject}")]
    ProfileMismatch {
        /// Profile
        profile_id: Uuid,
        /// Subject it was assigned to
        subject: freight_core::PaySubject,
    },

    /// Payable line cannot be changed this way
    #[error("Payable {0} is engine-owned; only manual or locked lines may be edited")]
    NotEditable(Uuid),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
