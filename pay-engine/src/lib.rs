//! Pay Engine
//!
//! Computes what drivers and carriers are owed per dispatch leg.
//!
//! # Flow
//!
//! 1. The subject's profile assignments are tiered by BASE-rule threshold and
//!    the [`selector`] picks one for the leg's miles
//! 2. Every active rule of that profile runs through the [`evaluator`]
//! 3. The [`recalculator`] replaces the leg's engine-owned lines with the
//!    results
//!
//! [`dispatch`] mutations call the recalculator for every leg they affect.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod payables;
pub mod profiles;
pub mod recalculator;
pub mod selector;

pub use dispatch::{DispatchService, LoadAttributes, StopTimes};
pub use error::{Error, Result};
pub use evaluator::{evaluate_rule, RuleContext, RuleOutcome};
pub use payables::{ManualPayable, PayableLedger};
pub use profiles::ProfileAssignments;
pub use recalculator::{PayRecalculator, RecalcResult};
pub use selector::{select_profile, ProfileCandidate};
