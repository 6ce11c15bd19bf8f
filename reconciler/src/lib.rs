//! Shipment Reconciler
//!
//! Keeps loads in step with an external shipment feed: new shipments are
//! classified into loads, changed ones refreshed with their pay recalculated,
//! and UNMAPPED loads promoted once their lane exists.
//!
//! # Components
//!
//! - [`source`]: the feed interface and its HTTPS implementation
//! - [`reconcile`]: one batch for one org
//! - [`diagnostics`]: failure bucketing and the batch report
//! - [`scheduler`]: periodic batches and stats repair for the worker

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod reconcile;
pub mod scheduler;
pub mod source;
pub mod types;

pub use config::{FeedConfig, ReconcileConfig};
pub use diagnostics::{normalize_reason, BatchSummary, FailureCollector};
pub use error::{Error, Result};
pub use reconcile::{BatchOptions, BatchReport, ShipmentOutcome, ShipmentReconciler};
pub use scheduler::ReconcileScheduler;
pub use source::{HttpShipmentSource, ShipmentSource};
pub use types::{Credentials, ExternalShipment, ExternalStop, ShipmentPage};
