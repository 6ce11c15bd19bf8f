//! Lane Classifier
//!
//! Classifies incoming loads against the org's contract lanes and promotes
//! UNMAPPED loads once a covering lane appears.
//!
//! | Match            | Load type | Review | GPS | Invoice        |
//! |------------------|-----------|--------|-----|----------------|
//! | exact HCR + trip | CONTRACT  | no     | no  | DRAFT          |
//! | wildcard `*`     | SPOT      | yes    | yes | DRAFT          |
//! | none             | UNMAPPED  | no     | no  | MISSING_DATA   |

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod classifier;
pub mod error;
pub mod lanes;
pub mod matcher;
pub mod promotion;

pub use classifier::{classify, Classification, CreatedLoad, LoadClassifier, NewLoad, NewStop};
pub use error::{Error, Result};
pub use lanes::{LaneCreated, LaneService, NewLane};
pub use matcher::{find_lane, normalize_hcr, normalize_trip, LaneMatch, LaneMatcher};
pub use promotion::{PromotionOutcome, Promoter};
