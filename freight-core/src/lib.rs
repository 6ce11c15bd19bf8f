//! Freight Settlement Core
//!
//! Shared data model, document storage and collaborator interfaces for the
//! settlement workspace.
//!
//! # Architecture
//!
//! - **Documents**: every entity is a bincode-encoded document keyed by a
//!   time-ordered UUID inside its collection
//! - **Single-document atomicity**: one read-modify-write commits at a time;
//!   multi-document workflows are sequences of guarded steps
//! - **Collaborators**: audit and stats are traits so callers choose the sink
//!
//! # Invariants
//!
//! - `load_type = UNMAPPED ⇒ invoice.status = MISSING_DATA`
//! - A load's `load_type` only moves forward out of UNMAPPED
//! - Exactly one default profile assignment per pay subject
//! - A load's primary-subject cache mirrors leg 1

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
#[cfg(feature = "rocksdb")]
pub mod rocks;
pub mod stats;
pub mod storage;
pub mod types;

// Re-exports
pub use audit::{AuditAction, AuditEntry, AuditSink, EntityType};
pub use config::{Config, StorageBackend, StorageConfig};
pub use context::OrgContext;
pub use error::{Error, Result};
pub use stats::{StatsAggregate, StoredStats};
pub use storage::{Document, Storage};
pub use types::*;

use rust_decimal::{Decimal, RoundingStrategy};

/// Round a money amount to cents, half away from zero
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(round_money(Decimal::new(-12345, 3)), Decimal::new(-1235, 2));
        assert_eq!(round_money(Decimal::new(300, 0)), Decimal::new(300, 0));
    }
}
