//! Load classification and creation
//!
//! Creating a load is a sequence of steps (load, invoice, stops, draft
//! snapshot) with no transaction around them. Each step first looks for what
//! an earlier attempt may already have written, so re-running after a failure
//! finishes the remaining steps without duplicating the completed ones.
//! Resumption is keyed by the load's external ID.

use crate::{
    matcher::{LaneMatch, LaneMatcher},
    Error, Result,
};
use chrono::{DateTime, NaiveDate, Utc};
use freight_core::{
    AuditAction, AuditEntry, AuditSink, EntityType, Invoice, InvoiceStatus, Load, LoadStatus,
    LoadType, OrgContext, StatsAggregate, Stop, StopType, Storage,
};
use invoicing::InvoiceService;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Stop as received from an import or an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStop {
    /// Position on the load (1-based)
    pub sequence: u32,
    /// Role
    pub stop_type: StopType,
    /// Location
    pub location: String,
    /// Scheduled window start
    pub window_start: Option<DateTime<Utc>>,
    /// Scheduled window end
    pub window_end: Option<DateTime<Utc>>,
    /// Actual arrival
    pub check_in_at: Option<DateTime<Utc>>,
    /// Actual departure
    pub check_out_at: Option<DateTime<Utc>>,
    /// Recorded dwell minutes
    pub dwell_minutes: Decimal,
}

impl NewStop {
    fn to_stop(&self, load: &Load) -> Stop {
        let mut stop = Stop::new(load, self.sequence, self.stop_type, self.location.clone());
        stop.window_start = self.window_start;
        stop.window_end = self.window_end;
        stop.check_in_at = self.check_in_at;
        stop.check_out_at = self.check_out_at;
        stop.dwell_minutes = self.dwell_minutes;
        stop
    }

    fn describes(&self, stop: &Stop) -> bool {
        self.sequence == stop.sequence
            && self.stop_type == stop.stop_type
            && self.location == stop.location
            && self.window_start == stop.window_start
            && self.window_end == stop.window_end
            && self.check_in_at == stop.check_in_at
            && self.check_out_at == stop.check_out_at
            && self.dwell_minutes == stop.dwell_minutes
    }
}

fn same_stops(stored: &[Stop], input: &[NewStop]) -> bool {
    stored.len() == input.len()
        && input
            .iter()
            .all(|new| stored.iter().any(|stop| new.describes(stop)))
}

/// Load as received from an import or an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLoad {
    /// Load number
    pub load_number: String,
    /// Shipment ID in the source system
    pub external_id: Option<String>,
    /// Workflow status
    pub status: LoadStatus,
    /// Highway contract route
    pub parsed_hcr: Option<String>,
    /// Trip number
    pub parsed_trip_number: Option<String>,
    /// Measured miles
    pub effective_miles: Option<Decimal>,
    /// Contracted miles
    pub contract_miles: Option<Decimal>,
    /// Hazmat
    pub is_hazmat: bool,
    /// Tarp required
    pub requires_tarp: bool,
    /// Weight (lbs)
    pub weight: Option<Decimal>,
    /// Commodity
    pub commodity: Option<String>,
    /// Pickup date
    pub pickup_date: Option<NaiveDate>,
    /// Source "last updated" marker
    pub external_updated_at: Option<String>,
    /// Stops
    pub stops: Vec<NewStop>,
}

impl NewLoad {
    /// Pending load with nothing but a number
    pub fn new(load_number: impl Into<String>) -> Self {
        Self {
            load_number: load_number.into(),
            external_id: None,
            status: LoadStatus::Pending,
            parsed_hcr: None,
            parsed_trip_number: None,
            effective_miles: None,
            contract_miles: None,
            is_hazmat: false,
            requires_tarp: false,
            weight: None,
            commodity: None,
            pickup_date: None,
            external_updated_at: None,
            stops: Vec::new(),
        }
    }

    fn apply_attributes(&self, load: &mut Load) {
        load.external_id = self.external_id.clone();
        load.status = self.status;
        load.parsed_hcr = self.parsed_hcr.clone();
        load.parsed_trip_number = self.parsed_trip_number.clone();
        load.effective_miles = self.effective_miles;
        load.contract_miles = self.contract_miles;
        load.is_hazmat = self.is_hazmat;
        load.requires_tarp = self.requires_tarp;
        load.weight = self.weight;
        load.commodity = self.commodity.clone();
        load.pickup_date = self.pickup_date;
        load.external_updated_at = self.external_updated_at.clone();
    }
}

/// What a lane match means for a new load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Load type
    pub load_type: LoadType,
    /// Linked lane (exact or wildcard)
    pub contract_lane_id: Option<Uuid>,
    /// Wildcard matches need an operator to confirm the rate
    pub requires_manual_review: bool,
    /// Unmapped loads are tracked so their route can be mapped later
    pub gps_tracking_enabled: bool,
    /// Invoice status the load starts with
    pub invoice_status: InvoiceStatus,
}

/// Classify a lane match
pub fn classify(lane_match: &LaneMatch) -> Classification {
    match lane_match {
        LaneMatch::Exact(lane) => Classification {
            load_type: LoadType::Contract,
            contract_lane_id: Some(lane.id),
            requires_manual_review: false,
            gps_tracking_enabled: false,
            invoice_status: InvoiceStatus::Draft,
        },
        LaneMatch::Wildcard(lane) => Classification {
            load_type: LoadType::Spot,
            contract_lane_id: Some(lane.id),
            requires_manual_review: true,
            gps_tracking_enabled: false,
            invoice_status: InvoiceStatus::Draft,
        },
        LaneMatch::None => Classification {
            load_type: LoadType::Unmapped,
            contract_lane_id: None,
            requires_manual_review: false,
            gps_tracking_enabled: true,
            invoice_status: InvoiceStatus::MissingData,
        },
    }
}

/// Result of [`LoadClassifier::create_load`]
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedLoad {
    /// Load as stored
    pub load: Load,
    /// Its invoice
    pub invoice: Invoice,
    /// False when an earlier attempt had already written the load
    pub created: bool,
}

/// Classifies and creates loads
#[derive(Clone)]
pub struct LoadClassifier {
    storage: Arc<Storage>,
    matcher: LaneMatcher,
    invoices: InvoiceService,
    stats: Arc<dyn StatsAggregate>,
    audit: Arc<dyn AuditSink>,
}

impl LoadClassifier {
    /// Create classifier
    pub fn new(
        storage: Arc<Storage>,
        stats: Arc<dyn StatsAggregate>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            matcher: LaneMatcher::new(storage.clone()),
            invoices: InvoiceService::new(storage.clone(), stats.clone(), audit.clone()),
            storage,
            stats,
            audit,
        }
    }

    /// Lane matcher over the same store
    pub fn matcher(&self) -> &LaneMatcher {
        &self.matcher
    }

    /// Match an input's HCR and trip; missing values never match
    pub fn match_input(&self, org_id: Uuid, input: &NewLoad) -> Result<LaneMatch> {
        match (&input.parsed_hcr, &input.parsed_trip_number) {
            (Some(hcr), Some(trip)) => self.matcher.match_lane(org_id, hcr, trip, input.pickup_date),
            _ => Ok(LaneMatch::None),
        }
    }

    /// Create a classified load with its invoice and stops
    pub fn create_load(&self, ctx: &OrgContext, input: NewLoad) -> Result<CreatedLoad> {
        if input.load_number.trim().is_empty() {
            return Err(Error::InvalidLoad("load number is required".to_string()));
        }

        let existing = match &input.external_id {
            Some(external_id) => self.storage.load_by_external_id(ctx.org_id, external_id)?,
            None => None,
        };

        let (load, created) = match existing {
            Some(load) => {
                tracing::debug!(load_id = %load.id, "Resuming load creation");
                (load, false)
            }
            None => (self.insert_load(ctx, &input)?, true),
        };

        let invoice = match self.storage.invoice_for_load(load.id)? {
            Some(invoice) => invoice,
            None => {
                let status = if load.load_type == LoadType::Unmapped {
                    InvoiceStatus::MissingData
                } else {
                    InvoiceStatus::Draft
                };
                let invoice = Invoice::new(&load, status);
                self.storage.put(&invoice)?;
                self.stats.update_invoice_count(ctx.org_id, None, status);
                invoice
            }
        };

        // A partial stop write from an earlier attempt is replaced wholesale
        let stored = self.storage.stops_for_load(load.id)?;
        if !same_stops(&stored, &input.stops) {
            self.replace_stops(&load, &input.stops)?;
        }

        if invoice.status == InvoiceStatus::Draft {
            self.invoices.store_draft_snapshot(invoice.id)?;
        }

        Ok(CreatedLoad {
            load,
            invoice: self.storage.fetch(invoice.id)?,
            created,
        })
    }

    /// Overwrite an existing load's imported attributes and stops.
    ///
    /// Classification fields are left alone: a load's type never moves
    /// backwards because its source data changed.
    pub fn refresh_load(&self, ctx: &OrgContext, load_id: Uuid, input: &NewLoad) -> Result<Load> {
        let before: Load = self.storage.fetch(load_id)?;
        ctx.ensure_org("Load", before.org_id)?;

        let load = self.storage.update(load_id, |load: &mut Load| {
            input.apply_attributes(load);
            load.updated_at = Utc::now();
        })?;
        if before.status != load.status {
            self.stats
                .update_load_count(ctx.org_id, Some(before.status), load.status);
        }

        self.replace_stops(&load, &input.stops)?;

        self.audit.log_action(AuditEntry::new(
            ctx,
            EntityType::Load,
            load_id,
            AuditAction::Update,
            "Load refreshed from source",
        ));
        Ok(load)
    }

    /// Replace a load's stops wholesale
    pub fn replace_stops(&self, load: &Load, stops: &[NewStop]) -> Result<()> {
        let load_id = load.id;
        self.storage
            .delete_where(|stop: &Stop| stop.load_id == load_id)?;
        for stop in stops {
            self.storage.put(&stop.to_stop(load))?;
        }
        Ok(())
    }

    fn insert_load(&self, ctx: &OrgContext, input: &NewLoad) -> Result<Load> {
        let lane_match = self.match_input(ctx.org_id, input)?;
        let classification = classify(&lane_match);

        let mut load = Load::new(ctx.org_id, input.load_number.trim());
        input.apply_attributes(&mut load);
        load.load_type = classification.load_type;
        load.contract_lane_id = classification.contract_lane_id;
        load.requires_manual_review = classification.requires_manual_review;
        load.gps_tracking_enabled = classification.gps_tracking_enabled;
        self.storage.put(&load)?;

        self.stats.update_load_count(ctx.org_id, None, load.status);
        if let Some(lane) = lane_match.lane() {
            self.matcher.record_match(lane.id)?;
        }

        tracing::info!(
            load_id = %load.id,
            load_number = %load.load_number,
            load_type = %load.load_type,
            "Load created"
        );
        self.audit.log_action(AuditEntry::new(
            ctx,
            EntityType::Load,
            load.id,
            AuditAction::Create,
            format!("Load {} created as {}", load.load_number, load.load_type),
        ));

        Ok(load)
    }
}
