//! Wire types of the external shipment feed

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use freight_core::{LoadStatus, StopType};
use lane_classifier::{NewLoad, NewStop};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feed credentials of one org
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// API root, e.g. `https://tms.example.com/api/v2`
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .finish()
    }
}

/// One page of `GET /shipments`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipmentPage {
    /// Shipments on this page
    pub shipments: Vec<ExternalShipment>,
    /// Cursor of the next page, absent on the last one
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Stop as sent by the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalStop {
    /// Position; defaults to list order
    #[serde(default)]
    pub sequence: Option<u32>,
    /// `pickup` / `delivery` and common synonyms
    #[serde(rename = "type")]
    pub stop_type: String,
    /// Location
    #[serde(default)]
    pub location: String,
    /// Window start
    #[serde(default)]
    pub window_start: Option<DateTime<Utc>>,
    /// Window end
    #[serde(default)]
    pub window_end: Option<DateTime<Utc>>,
    /// Arrival
    #[serde(default)]
    pub check_in_at: Option<DateTime<Utc>>,
    /// Departure
    #[serde(default)]
    pub check_out_at: Option<DateTime<Utc>>,
}

/// Shipment as sent by the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalShipment {
    /// Source-side ID
    pub id: String,
    /// Load number; the ID is used when absent
    #[serde(default)]
    pub load_number: Option<String>,
    /// Free-form status
    #[serde(default)]
    pub status: Option<String>,
    /// Highway contract route
    #[serde(default)]
    pub hcr: Option<String>,
    /// Trip number
    #[serde(default, alias = "trip")]
    pub trip_number: Option<String>,
    /// Measured miles
    #[serde(default)]
    pub miles: Option<f64>,
    /// Measured distance in meters, used when `miles` is absent
    #[serde(
        default,
        rename = "totalDistanceInMeters",
        alias = "total_distance_in_meters"
    )]
    pub total_distance_in_meters: Option<f64>,
    /// Contracted miles
    #[serde(default)]
    pub contract_miles: Option<f64>,
    /// Hazmat
    #[serde(default)]
    pub hazmat: bool,
    /// Tarp required
    #[serde(default)]
    pub tarp_required: bool,
    /// Weight (lbs)
    #[serde(default)]
    pub weight: Option<f64>,
    /// Commodity
    #[serde(default)]
    pub commodity: Option<String>,
    /// `YYYY-MM-DD` or RFC 3339
    #[serde(default)]
    pub pickup_date: Option<String>,
    /// Opaque "last updated" marker used for change detection
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<String>,
    /// Stops
    #[serde(default)]
    pub stops: Vec<ExternalStop>,
}

impl ExternalShipment {
    /// Trimmed HCR and trip, when both are present
    pub fn route(&self) -> Option<(&str, &str)> {
        let hcr = non_blank(&self.hcr)?;
        let trip = non_blank(&self.trip_number)?;
        Some((hcr, trip))
    }

    /// Convert to classifier input
    pub fn to_new_load(&self) -> Result<NewLoad> {
        let mut input = NewLoad::new(non_blank(&self.load_number).unwrap_or(self.id.as_str()));
        input.external_id = Some(self.id.clone());
        if let Some(status) = non_blank(&self.status) {
            input.status = LoadStatus::from_external(status)
                .ok_or_else(|| Error::Parse(format!("status '{}'", status)))?;
        }
        input.parsed_hcr = non_blank(&self.hcr).map(str::to_string);
        input.parsed_trip_number = non_blank(&self.trip_number).map(str::to_string);
        input.effective_miles = match self.miles {
            Some(_) => quantity(self.miles, "miles")?,
            None => quantity(self.total_distance_in_meters, "distance")?
                .map(|meters| (meters / meters_per_mile()).round_dp(2)),
        };
        input.contract_miles = quantity(self.contract_miles, "contract miles")?;
        input.is_hazmat = self.hazmat;
        input.requires_tarp = self.tarp_required;
        input.weight = quantity(self.weight, "weight")?;
        input.commodity = non_blank(&self.commodity).map(str::to_string);
        input.pickup_date = match non_blank(&self.pickup_date) {
            Some(raw) => Some(
                parse_date(raw).ok_or_else(|| Error::Parse(format!("pickup date '{}'", raw)))?,
            ),
            None => None,
        };
        input.external_updated_at = self.updated_at.clone();
        input.stops = self
            .stops
            .iter()
            .enumerate()
            .map(|(index, stop)| stop.to_new_stop(index))
            .collect::<Result<_>>()?;
        Ok(input)
    }
}

impl ExternalStop {
    fn to_new_stop(&self, index: usize) -> Result<NewStop> {
        let stop_type = match self.stop_type.trim().to_ascii_lowercase().as_str() {
            "pickup" | "pick" | "origin" | "pu" => StopType::Pickup,
            "delivery" | "drop" | "destination" | "so" => StopType::Delivery,
            other => return Err(Error::Parse(format!("stop type '{}'", other))),
        };
        let dwell_minutes = match (self.check_in_at, self.check_out_at) {
            (Some(check_in), Some(check_out)) if check_out > check_in => {
                Decimal::from((check_out - check_in).num_minutes())
            }
            _ => Decimal::ZERO,
        };
        Ok(NewStop {
            sequence: self.sequence.unwrap_or(index as u32 + 1),
            stop_type,
            location: self.location.trim().to_string(),
            window_start: self.window_start,
            window_end: self.window_end,
            check_in_at: self.check_in_at,
            check_out_at: self.check_out_at,
            dwell_minutes,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn quantity(value: Option<f64>, field: &str) -> Result<Option<Decimal>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match Decimal::try_from(value) {
        Ok(decimal) if decimal >= Decimal::ZERO => Ok(Some(decimal.round_dp(2))),
        _ => Err(Error::Parse(format!("{} '{}'", field, value))),
    }
}

fn meters_per_mile() -> Decimal {
    Decimal::new(1_609_344, 3)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shipment(value: serde_json::Value) -> ExternalShipment {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_full_shipment_converts() {
        let s = shipment(json!({
            "id": "ext-1",
            "load_number": "L-100",
            "status": "In Transit",
            "hcr": " ABC-123 ",
            "trip_number": "007",
            "miles": 120.456,
            "hazmat": true,
            "pickup_date": "2024-05-01T08:00:00Z",
            "updated_at": "v3",
            "stops": [
                { "type": "origin", "location": "Depot" },
                {
                    "type": "Delivery",
                    "location": "Plant",
                    "check_in_at": "2024-05-01T10:00:00Z",
                    "check_out_at": "2024-05-01T11:30:00Z"
                }
            ]
        }));

        assert_eq!(s.route(), Some(("ABC-123", "007")));
        let input = s.to_new_load().unwrap();
        assert_eq!(input.load_number, "L-100");
        assert_eq!(input.external_id.as_deref(), Some("ext-1"));
        assert_eq!(input.status, LoadStatus::InTransit);
        assert_eq!(input.effective_miles, Some(Decimal::new(12046, 2)));
        assert!(input.is_hazmat);
        assert_eq!(input.pickup_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(input.stops.len(), 2);
        assert_eq!(input.stops[0].stop_type, StopType::Pickup);
        assert_eq!(input.stops[1].sequence, 2);
        assert_eq!(input.stops[1].dwell_minutes, Decimal::from(90));
    }

    #[test]
    fn test_feed_shape_with_meters() {
        let s = shipment(json!({
            "id": "S-1",
            "hcr": "ABC123",
            "trip": "7",
            "status": "dispatched",
            "totalDistanceInMeters": 193121.0,
            "weight": 41000.0,
            "commodity": "Mail",
            "updated_at": "2026-10-01T06:00:00Z",
            "stops": [
                { "type": "pickup", "location": "Depot" },
                { "type": "delivery", "location": "Plant" }
            ]
        }));

        assert_eq!(s.route(), Some(("ABC123", "7")));
        let input = s.to_new_load().unwrap();
        assert_eq!(input.parsed_trip_number.as_deref(), Some("7"));
        assert_eq!(input.effective_miles, Some(Decimal::new(12000, 2)));
        assert_eq!(input.weight, Some(Decimal::from(41000)));
        assert_eq!(
            input.external_updated_at.as_deref(),
            Some("2026-10-01T06:00:00Z")
        );
        assert_eq!(input.stops.len(), 2);
    }

    #[test]
    fn test_explicit_miles_win_over_meters() {
        let s = shipment(json!({
            "id": "S-2",
            "miles": 50.0,
            "totalDistanceInMeters": 193121.0
        }));
        assert_eq!(s.to_new_load().unwrap().effective_miles, Some(Decimal::from(50)));

        let negative = shipment(json!({ "id": "S-3", "totalDistanceInMeters": -1.0 }));
        assert!(matches!(negative.to_new_load(), Err(Error::Parse(_))));
    }

    #[test]
    fn test_sparse_shipment_defaults() {
        let s = shipment(json!({ "id": "ext-2", "hcr": "ABC123", "trip_number": "  " }));
        assert_eq!(s.route(), None);
        let input = s.to_new_load().unwrap();
        assert_eq!(input.load_number, "ext-2");
        assert_eq!(input.status, LoadStatus::Pending);
        assert!(input.stops.is_empty());
    }

    #[test]
    fn test_bad_fields_are_parse_errors() {
        let bad_date = shipment(json!({ "id": "x", "pickup_date": "next tuesday" }));
        assert!(matches!(bad_date.to_new_load(), Err(Error::Parse(_))));

        let bad_status = shipment(json!({ "id": "x", "status": "teleported" }));
        assert!(matches!(bad_status.to_new_load(), Err(Error::Parse(_))));

        let negative = shipment(json!({ "id": "x", "miles": -4.0 }));
        assert!(matches!(negative.to_new_load(), Err(Error::Parse(_))));
    }

    #[test]
    fn test_credentials_debug_hides_key() {
        let creds = Credentials {
            base_url: "https://tms.example.com".to_string(),
            api_key: "secret-key".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("secret-key"));
    }
}
