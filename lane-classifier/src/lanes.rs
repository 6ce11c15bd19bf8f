//! Contract lane administration
//!
//! Creating a lane backfills: every UNMAPPED load of the org that the new
//! lane covers is promoted right away.

use crate::{
    matcher::{normalize_hcr, normalize_trip},
    promotion::Promoter,
    Error, Result,
};
use chrono::{NaiveDate, Utc};
use freight_core::{
    AuditAction, AuditEntry, AuditSink, ContractLane, EntityType, FuelSurchargeType, Load,
    LoadType, OrgContext, RateType, StatsAggregate, Storage,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Lane definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLane {
    /// Highway contract route
    pub hcr: String,
    /// Trip number or `*`
    pub trip_number: String,
    /// Billed customer
    pub customer_id: Option<Uuid>,
    /// Rate
    pub rate: Decimal,
    /// Rate type
    pub rate_type: RateType,
    /// Fuel surcharge mode
    pub fuel_surcharge_type: Option<FuelSurchargeType>,
    /// Fuel surcharge value
    pub fuel_surcharge_value: Decimal,
    /// Charge per extra stop
    pub stop_off_rate: Decimal,
    /// Stops covered by the base rate
    pub included_stops: u32,
    /// Contracted miles
    pub contract_miles: Option<Decimal>,
    /// First effective day
    pub effective_from: Option<NaiveDate>,
    /// Last effective day
    pub effective_to: Option<NaiveDate>,
}

impl NewLane {
    /// Lane with no surcharges or date range
    pub fn new(
        hcr: impl Into<String>,
        trip_number: impl Into<String>,
        rate: Decimal,
        rate_type: RateType,
    ) -> Self {
        Self {
            hcr: hcr.into(),
            trip_number: trip_number.into(),
            customer_id: None,
            rate,
            rate_type,
            fuel_surcharge_type: None,
            fuel_surcharge_value: Decimal::ZERO,
            stop_off_rate: Decimal::ZERO,
            included_stops: 0,
            contract_miles: None,
            effective_from: None,
            effective_to: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if normalize_hcr(&self.hcr).is_empty() {
            return Err(Error::InvalidLane("HCR is required".to_string()));
        }
        if normalize_trip(&self.trip_number).is_empty() {
            return Err(Error::InvalidLane("trip number is required".to_string()));
        }
        if self.rate < Decimal::ZERO
            || self.fuel_surcharge_value < Decimal::ZERO
            || self.stop_off_rate < Decimal::ZERO
        {
            return Err(Error::InvalidLane("rates cannot be negative".to_string()));
        }
        if let (Some(from), Some(to)) = (self.effective_from, self.effective_to) {
            if from > to {
                return Err(Error::InvalidLane(format!(
                    "effective range {} to {} is empty",
                    from, to
                )));
            }
        }
        Ok(())
    }
}

/// Result of [`LaneService::create_lane`]
#[derive(Debug, Clone, PartialEq)]
pub struct LaneCreated {
    /// Stored lane
    pub lane: ContractLane,
    /// Loads promoted by the backfill
    pub promoted: Vec<Uuid>,
}

/// Lane administration
#[derive(Clone)]
pub struct LaneService {
    storage: Arc<Storage>,
    promoter: Promoter,
    audit: Arc<dyn AuditSink>,
}

impl LaneService {
    /// Create service
    pub fn new(
        storage: Arc<Storage>,
        stats: Arc<dyn StatsAggregate>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            promoter: Promoter::new(storage.clone(), stats, audit.clone()),
            storage,
            audit,
        }
    }

    /// Store a lane and promote the UNMAPPED loads it covers
    pub fn create_lane(&self, ctx: &OrgContext, new_lane: NewLane) -> Result<LaneCreated> {
        new_lane.validate()?;

        let mut lane = ContractLane::new(
            ctx.org_id,
            new_lane.hcr.trim(),
            new_lane.trip_number.trim(),
            new_lane.rate,
            new_lane.rate_type,
        );
        lane.customer_id = new_lane.customer_id;
        lane.fuel_surcharge_type = new_lane.fuel_surcharge_type;
        lane.fuel_surcharge_value = new_lane.fuel_surcharge_value;
        lane.stop_off_rate = new_lane.stop_off_rate;
        lane.included_stops = new_lane.included_stops;
        lane.contract_miles = new_lane.contract_miles;
        lane.effective_from = new_lane.effective_from;
        lane.effective_to = new_lane.effective_to;
        self.storage.put(&lane)?;

        self.audit.log_action(AuditEntry::new(
            ctx,
            EntityType::ContractLane,
            lane.id,
            AuditAction::Create,
            format!("Lane {}/{} created", lane.hcr, lane.trip_number),
        ));

        let promoted = self.backfill(ctx, &lane)?;
        tracing::info!(
            lane_id = %lane.id,
            hcr = %lane.hcr,
            trip = %lane.trip_number,
            promoted = promoted.len(),
            "Lane created"
        );

        Ok(LaneCreated {
            lane: self.storage.fetch(lane.id)?,
            promoted,
        })
    }

    /// Deactivate a lane; loads already classified against it keep their type
    pub fn deactivate_lane(&self, ctx: &OrgContext, lane_id: Uuid) -> Result<ContractLane> {
        let lane: ContractLane = self.storage.fetch(lane_id)?;
        ctx.ensure_org("ContractLane", lane.org_id)?;

        let lane = self
            .storage
            .update(lane_id, |l: &mut ContractLane| l.is_active = false)?;
        self.audit.log_action(
            AuditEntry::new(
                ctx,
                EntityType::ContractLane,
                lane_id,
                AuditAction::Update,
                "Lane deactivated",
            )
            .with_changed_fields(["is_active"]),
        );
        Ok(lane)
    }

    /// Promote every UNMAPPED load the lane covers.
    ///
    /// Each candidate is re-matched against the full lane table, so a load
    /// covered by both this wildcard and an exact lane still ends up CONTRACT.
    pub fn backfill(&self, ctx: &OrgContext, lane: &ContractLane) -> Result<Vec<Uuid>> {
        let hcr = normalize_hcr(&lane.hcr);
        let trip = normalize_trip(&lane.trip_number);

        let candidates = self.storage.loads_where(ctx.org_id, |load: &Load| {
            load.load_type == LoadType::Unmapped
                && lane.covers_date(load.pickup_date)
                && load.parsed_hcr.as_deref().map(normalize_hcr).as_deref() == Some(hcr.as_str())
                && (lane.is_wildcard()
                    || load.parsed_trip_number.as_deref().map(normalize_trip).as_deref()
                        == Some(trip.as_str()))
        })?;

        let mut promoted = Vec::new();
        for load in candidates {
            match self.promoter.try_promote(ctx, load.id) {
                Ok(outcome) if outcome.is_promoted() => promoted.push(load.id),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(load_id = %load.id, error = %e, "Backfill promotion failed");
                }
            }
        }

        if !promoted.is_empty() {
            self.storage.update(lane.id, |l: &mut ContractLane| {
                l.last_import_match_at = Some(Utc::now());
            })?;
        }
        Ok(promoted)
    }
}
