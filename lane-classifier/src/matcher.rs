//! Lane matching
//!
//! HCR and trip numbers arrive from carriers and customer systems in whatever
//! shape they were typed (`abc-123`, ` ABC 123`, trip `007`). Both sides are
//! normalized before comparison, then lanes are tried in order:
//!
//! 1. exact (HCR and trip) → CONTRACT
//! 2. wildcard (HCR and trip `*`) → SPOT
//! 3. nothing → UNMAPPED

use crate::Result;
use chrono::{NaiveDate, Utc};
use freight_core::{ContractLane, LoadType, Storage};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

lazy_static! {
    static ref SEPARATORS: Regex = Regex::new(r"[\s\-]+").unwrap();
    static ref NUMERIC: Regex = Regex::new(r"^[0-9]+$").unwrap();
}

/// Canonical HCR: uppercase without whitespace or dashes
pub fn normalize_hcr(hcr: &str) -> String {
    SEPARATORS.replace_all(hcr.trim(), "").to_uppercase()
}

/// Canonical trip number: as [`normalize_hcr`], numeric trips lose leading zeros
pub fn normalize_trip(trip: &str) -> String {
    let cleaned = SEPARATORS.replace_all(trip.trim(), "").to_uppercase();
    if NUMERIC.is_match(&cleaned) {
        let stripped = cleaned.trim_start_matches('0');
        if stripped.is_empty() {
            return "0".to_string();
        }
        return stripped.to_string();
    }
    cleaned
}

/// Outcome of matching a shipment against the lane table
#[derive(Debug, Clone, PartialEq)]
pub enum LaneMatch {
    /// Lane for this exact HCR and trip
    Exact(ContractLane),
    /// Wildcard lane for the HCR
    Wildcard(ContractLane),
    /// No lane
    None,
}

impl LaneMatch {
    /// Load type this match classifies into
    pub fn load_type(&self) -> LoadType {
        match self {
            LaneMatch::Exact(_) => LoadType::Contract,
            LaneMatch::Wildcard(_) => LoadType::Spot,
            LaneMatch::None => LoadType::Unmapped,
        }
    }

    /// Matched lane
    pub fn lane(&self) -> Option<&ContractLane> {
        match self {
            LaneMatch::Exact(lane) | LaneMatch::Wildcard(lane) => Some(lane),
            LaneMatch::None => None,
        }
    }
}

/// Match `hcr`/`trip` against `lanes`.
///
/// Inactive lanes and lanes whose date range excludes `pickup_date` are
/// ignored. Among several candidates of the same kind the newest lane wins.
pub fn find_lane(
    lanes: &[ContractLane],
    hcr: &str,
    trip: &str,
    pickup_date: Option<NaiveDate>,
) -> LaneMatch {
    let hcr = normalize_hcr(hcr);
    let trip = normalize_trip(trip);
    if hcr.is_empty() || trip.is_empty() {
        return LaneMatch::None;
    }

    let newest = |a: &&ContractLane, b: &&ContractLane| a.created_at.cmp(&b.created_at);

    if let Some(lane) = eligible(lanes, &hcr, pickup_date)
        .filter(|lane| !lane.is_wildcard() && normalize_trip(&lane.trip_number) == trip)
        .max_by(newest)
    {
        return LaneMatch::Exact(lane.clone());
    }

    if let Some(lane) = eligible(lanes, &hcr, pickup_date)
        .filter(|lane| lane.is_wildcard())
        .max_by(newest)
    {
        return LaneMatch::Wildcard(lane.clone());
    }

    LaneMatch::None
}

fn eligible<'a>(
    lanes: &'a [ContractLane],
    hcr: &'a str,
    pickup_date: Option<NaiveDate>,
) -> impl Iterator<Item = &'a ContractLane> + 'a {
    lanes.iter().filter(move |lane| {
        lane.is_active && lane.covers_date(pickup_date) && normalize_hcr(&lane.hcr) == hcr
    })
}

/// Store-backed lane matcher
#[derive(Debug, Clone)]
pub struct LaneMatcher {
    storage: Arc<Storage>,
}

impl LaneMatcher {
    /// Create matcher
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Match against the org's active lanes without side effects
    pub fn match_lane(
        &self,
        org_id: Uuid,
        hcr: &str,
        trip: &str,
        pickup_date: Option<NaiveDate>,
    ) -> Result<LaneMatch> {
        let lanes = self.storage.active_lanes(org_id)?;
        Ok(find_lane(&lanes, hcr, trip, pickup_date))
    }

    /// Resolve a lane for an import and stamp its match telemetry
    pub fn resolve_lane(&self, org_id: Uuid, hcr: &str, trip: &str) -> Result<Option<ContractLane>> {
        let matched = self.match_lane(org_id, hcr, trip, None)?;
        match matched.lane() {
            Some(lane) => Ok(Some(self.record_match(lane.id)?)),
            None => Ok(None),
        }
    }

    /// Stamp `last_import_match_at` and bump `import_match_count`
    pub fn record_match(&self, lane_id: Uuid) -> Result<ContractLane> {
        Ok(self.storage.update(lane_id, |lane: &mut ContractLane| {
            lane.last_import_match_at = Some(Utc::now());
            lane.import_match_count += 1;
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freight_core::RateType;
    use rust_decimal::Decimal;

    fn lane(org_id: Uuid, hcr: &str, trip: &str) -> ContractLane {
        ContractLane::new(org_id, hcr, trip, Decimal::new(250, 2), RateType::PerMile)
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_hcr(" abc-123 "), "ABC123");
        assert_eq!(normalize_hcr("ABC 123"), "ABC123");
        assert_eq!(normalize_trip("007"), "7");
        assert_eq!(normalize_trip("000"), "0");
        assert_eq!(normalize_trip("07a"), "07A");
        assert_eq!(normalize_trip("*"), "*");
    }

    #[test]
    fn test_exact_then_wildcard_then_none() {
        let org_id = Uuid::now_v7();
        let exact = lane(org_id, "ABC123", "7");
        let wildcard = lane(org_id, "ABC123", "*");
        let lanes = vec![wildcard.clone(), exact.clone()];

        assert_eq!(find_lane(&lanes, "abc-123", "007", None), LaneMatch::Exact(exact));
        assert_eq!(find_lane(&lanes, "ABC123", "8", None), LaneMatch::Wildcard(wildcard));
        assert_eq!(find_lane(&lanes, "XYZ999", "7", None), LaneMatch::None);
        assert_eq!(find_lane(&lanes, "", "7", None), LaneMatch::None);
    }

    #[test]
    fn test_inactive_and_out_of_range_lanes_ignored() {
        let org_id = Uuid::now_v7();
        let mut inactive = lane(org_id, "ABC123", "7");
        inactive.is_active = false;
        let mut expired = lane(org_id, "ABC123", "7");
        expired.effective_to = NaiveDate::from_ymd_opt(2023, 12, 31);
        let lanes = vec![inactive, expired.clone()];

        let pickup = NaiveDate::from_ymd_opt(2024, 2, 1);
        assert_eq!(find_lane(&lanes, "ABC123", "7", pickup), LaneMatch::None);
        assert_eq!(find_lane(&lanes, "ABC123", "7", None), LaneMatch::Exact(expired));
    }

    #[test]
    fn test_resolve_lane_stamps_telemetry() {
        let storage = Arc::new(Storage::in_memory());
        let matcher = LaneMatcher::new(storage.clone());
        let org_id = Uuid::now_v7();
        let l = lane(org_id, "ABC123", "7");
        storage.put(&l).unwrap();

        assert!(matcher.resolve_lane(org_id, "ABC123", "9").unwrap().is_none());

        let resolved = matcher.resolve_lane(org_id, "ABC123", "7").unwrap().unwrap();
        assert_eq!(resolved.id, l.id);
        assert_eq!(resolved.import_match_count, 1);
        assert!(resolved.last_import_match_at.is_some());

        // Other orgs never see this lane
        assert!(matcher.resolve_lane(Uuid::now_v7(), "ABC123", "7").unwrap().is_none());
    }
}
