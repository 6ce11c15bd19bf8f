//! Promotion out of UNMAPPED
//!
//! ```text
//!            ┌──→ CONTRACT   (exact lane)
//! UNMAPPED ──┤
//!            └──→ SPOT       (wildcard lane, needs review)
//! ```
//!
//! Lanes and shipments arrive in any order, so an UNMAPPED load is promoted
//! whenever a lane for it shows up: during reconciliation, after a lane is
//! created, or when the load is read. Promotion re-reads the load inside its
//! write and does nothing unless the load is still UNMAPPED, so concurrent or
//! repeated triggers are harmless. The invoice moves in a later write; a
//! retry on a load that was flipped but whose invoice is still MISSING_DATA
//! finishes that step.

use crate::{
    matcher::{LaneMatch, LaneMatcher},
    Result,
};
use chrono::Utc;
use freight_core::{
    AuditAction, AuditEntry, AuditSink, EntityType, Invoice, InvoiceStatus, Load, LoadType,
    OrgContext, StatsAggregate, Storage,
};
use invoicing::InvoiceService;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of a promotion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// Load left UNMAPPED
    Promoted {
        /// New type
        load_type: LoadType,
        /// Linked lane
        lane_id: Uuid,
    },
    /// Load was no longer UNMAPPED
    AlreadyClassified(LoadType),
    /// Still no lane for the load
    NoLane,
}

impl PromotionOutcome {
    /// Load was promoted by this call
    pub fn is_promoted(&self) -> bool {
        matches!(self, PromotionOutcome::Promoted { .. })
    }
}

/// Promotes loads once their lane exists
#[derive(Clone)]
pub struct Promoter {
    storage: Arc<Storage>,
    matcher: LaneMatcher,
    invoices: InvoiceService,
    stats: Arc<dyn StatsAggregate>,
    audit: Arc<dyn AuditSink>,
}

impl Promoter {
    /// Create promoter
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

    /// Promote a load with an already computed lane match
    pub fn promote_load(
        &self,
        ctx: &OrgContext,
        load_id: Uuid,
        lane_match: &LaneMatch,
    ) -> Result<PromotionOutcome> {
        let current: Load = self.storage.fetch(load_id)?;
        ctx.ensure_org("Load", current.org_id)?;

        let Some(lane) = lane_match.lane() else {
            return Ok(PromotionOutcome::NoLane);
        };
        let load_type = lane_match.load_type();

        let promoted = self.storage.update_if(load_id, |load: &mut Load| {
            if !load.load_type.can_transition_to(load_type) {
                return false;
            }
            load.load_type = load_type;
            load.contract_lane_id = Some(lane.id);
            load.requires_manual_review = load_type == LoadType::Spot;
            load.suggested_lane_id = None;
            load.updated_at = Utc::now();
            true
        })?;

        let Some(load) = promoted else {
            return self.resume_promotion(ctx, load_id);
        };

        if !self.promote_invoice(ctx, &load, lane.id)? {
            tracing::warn!(load_id = %load_id, "Unmapped load had an invoice past MISSING_DATA");
        }
        self.matcher.record_match(lane.id)?;

        tracing::info!(
            load_id = %load_id,
            lane_id = %lane.id,
            load_type = %load_type,
            "Load promoted"
        );
        self.audit.log_action(
            AuditEntry::new(
                ctx,
                EntityType::Load,
                load_id,
                AuditAction::Promote,
                format!("UNMAPPED → {} via lane {}/{}", load_type, lane.hcr, lane.trip_number),
            )
            .with_changed_fields(["load_type", "contract_lane_id", "requires_manual_review"]),
        );

        Ok(PromotionOutcome::Promoted {
            load_type,
            lane_id: lane.id,
        })
    }

    /// Re-match an UNMAPPED load from its parsed route and promote it
    pub fn try_promote(&self, ctx: &OrgContext, load_id: Uuid) -> Result<PromotionOutcome> {
        let load: Load = self.storage.fetch(load_id)?;
        ctx.ensure_org("Load", load.org_id)?;
        if load.load_type != LoadType::Unmapped {
            return self.resume_promotion(ctx, load_id);
        }

        let lane_match = self.match_load(&load)?;
        self.promote_load(ctx, load_id, &lane_match)
    }

    /// Read a load, first promoting it if a lane has appeared.
    ///
    /// A SPOT load awaiting review keeps its type; an exact lane found for it
    /// is only recorded as `suggested_lane_id`.
    pub fn read_load(&self, ctx: &OrgContext, load_id: Uuid) -> Result<Load> {
        let load: Load = self.storage.fetch(load_id)?;
        ctx.ensure_org("Load", load.org_id)?;

        match load.load_type {
            LoadType::Unmapped => {
                if self.try_promote(ctx, load_id)?.is_promoted() {
                    return Ok(self.storage.fetch(load_id)?);
                }
                Ok(load)
            }
            LoadType::Spot if load.requires_manual_review => {
                let LaneMatch::Exact(lane) = self.match_load(&load)? else {
                    return Ok(load);
                };
                let updated = self.storage.update_if(load_id, |l: &mut Load| {
                    if l.load_type != LoadType::Spot || l.suggested_lane_id == Some(lane.id) {
                        return false;
                    }
                    l.suggested_lane_id = Some(lane.id);
                    l.updated_at = Utc::now();
                    true
                })?;
                match updated {
                    Some(load) => {
                        tracing::info!(load_id = %load_id, lane_id = %lane.id, "Exact lane suggested for spot load");
                        Ok(load)
                    }
                    None => Ok(load),
                }
            }
            LoadType::Spot | LoadType::Contract => Ok(load),
        }
    }

    /// Finish a promotion whose load write committed but whose invoice step
    /// did not. Loads promoted in full report `AlreadyClassified`.
    fn resume_promotion(&self, ctx: &OrgContext, load_id: Uuid) -> Result<PromotionOutcome> {
        let load: Load = self.storage.fetch(load_id)?;
        let lane_id = match (load.load_type, load.contract_lane_id) {
            (LoadType::Contract | LoadType::Spot, Some(lane_id)) => lane_id,
            (load_type, _) => return Ok(PromotionOutcome::AlreadyClassified(load_type)),
        };

        if !self.promote_invoice(ctx, &load, lane_id)? {
            tracing::debug!(load_id = %load_id, load_type = %load.load_type, "Load already classified");
            return Ok(PromotionOutcome::AlreadyClassified(load.load_type));
        }
        self.matcher.record_match(lane_id)?;

        tracing::info!(
            load_id = %load_id,
            lane_id = %lane_id,
            load_type = %load.load_type,
            "Interrupted promotion completed"
        );
        Ok(PromotionOutcome::Promoted {
            load_type: load.load_type,
            lane_id,
        })
    }

    fn match_load(&self, load: &Load) -> Result<LaneMatch> {
        match (&load.parsed_hcr, &load.parsed_trip_number) {
            (Some(hcr), Some(trip)) => self.matcher.match_lane(load.org_id, hcr, trip, load.pickup_date),
            _ => Ok(LaneMatch::None),
        }
    }

    /// Move the load's invoice out of MISSING_DATA, creating it if absent.
    /// Returns false when the invoice had already moved on.
    fn promote_invoice(&self, ctx: &OrgContext, load: &Load, lane_id: Uuid) -> Result<bool> {
        match self.storage.invoice_for_load(load.id)? {
            Some(invoice) if invoice.status == InvoiceStatus::MissingData => Ok(self
                .invoices
                .mark_draft(ctx, invoice.id, Some(lane_id))?
                .is_some()),
            Some(_) => Ok(false),
            None => {
                let invoice = Invoice::new(load, InvoiceStatus::Draft);
                self.storage.put(&invoice)?;
                self.stats
                    .update_invoice_count(load.org_id, None, InvoiceStatus::Draft);
                self.invoices.store_draft_snapshot(invoice.id)?;
                Ok(true)
            }
        }
    }
}
