//! Dispatch mutations
//!
//! Every change that can alter what a leg pays (who drives it, when its stops
//! happened, which attributes the load carries) writes the change and then
//! recalculates the affected legs.

use crate::{recalculator::PayRecalculator, Error, RecalcResult, Result};
use chrono::{DateTime, Utc};
use freight_core::{
    AuditAction, AuditEntry, AuditSink, CarrierPartnership, DispatchLeg, EntityType, LegStatus,
    Load, LoadStatus, OrgContext, StatsAggregate, Stop, Storage,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Recorded times for a stop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopTimes {
    /// Actual arrival
    pub check_in_at: Option<DateTime<Utc>>,
    /// Actual departure
    pub check_out_at: Option<DateTime<Utc>>,
    /// Dwell minutes; derived from arrival and departure when absent
    pub dwell_minutes: Option<Decimal>,
}

/// Pay-relevant load attributes; `None` leaves a field unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadAttributes {
    /// Hazardous materials
    pub is_hazmat: Option<bool>,
    /// Tarp required
    pub requires_tarp: Option<bool>,
}

/// Dispatch service
#[derive(Clone)]
pub struct DispatchService {
    storage: Arc<Storage>,
    recalculator: PayRecalculator,
    stats: Arc<dyn StatsAggregate>,
    audit: Arc<dyn AuditSink>,
}

impl DispatchService {
    /// Create service
    pub fn new(
        storage: Arc<Storage>,
        stats: Arc<dyn StatsAggregate>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            recalculator: PayRecalculator::new(storage.clone(), audit.clone()),
            storage,
            stats,
            audit,
        }
    }

    /// Underlying recalculator
    pub fn recalculator(&self) -> &PayRecalculator {
        &self.recalculator
    }

    /// Put a driver on a leg (or take them off with `None`).
    ///
    /// A leg is driven by a driver or a carrier, never both: assigning a
    /// driver removes the carrier.
    pub fn assign_driver(
        &self,
        ctx: &OrgContext,
        leg_id: Uuid,
        driver_id: Option<Uuid>,
    ) -> Result<Vec<RecalcResult>> {
        self.assign(ctx, leg_id, |leg| {
            leg.driver_id = driver_id;
            if driver_id.is_some() {
                leg.carrier_partnership_id = None;
            }
        })
    }

    /// Put a carrier partnership on a leg (or take it off with `None`).
    ///
    /// Inactive partnerships are rejected before anything is written.
    pub fn assign_carrier(
        &self,
        ctx: &OrgContext,
        leg_id: Uuid,
        partnership_id: Option<Uuid>,
    ) -> Result<Vec<RecalcResult>> {
        if let Some(id) = partnership_id {
            let partnership: CarrierPartnership = self.storage.fetch(id)?;
            ctx.ensure_org("CarrierPartnership", partnership.org_id)?;
            if !partnership.is_active {
                return Err(Error::InactivePartnership(id));
            }
        }

        self.assign(ctx, leg_id, |leg| {
            leg.carrier_partnership_id = partnership_id;
            if partnership_id.is_some() {
                leg.driver_id = None;
            }
        })
    }

    /// Record stop times and recalculate the legs covering the stop
    pub fn update_stop_times(
        &self,
        ctx: &OrgContext,
        stop_id: Uuid,
        times: StopTimes,
    ) -> Result<Vec<RecalcResult>> {
        let stop: Stop = self.storage.fetch(stop_id)?;
        ctx.ensure_org("Stop", stop.org_id)?;

        let stop = self.storage.update(stop_id, |s: &mut Stop| {
            s.check_in_at = times.check_in_at.or(s.check_in_at);
            s.check_out_at = times.check_out_at.or(s.check_out_at);
            s.dwell_minutes = match (times.dwell_minutes, s.check_in_at, s.check_out_at) {
                (Some(minutes), _, _) => minutes,
                (None, Some(check_in), Some(check_out)) if check_out > check_in => {
                    Decimal::from((check_out - check_in).num_minutes())
                }
                (None, _, _) => s.dwell_minutes,
            };
        })?;

        self.audit.log_action(
            AuditEntry::new(
                ctx,
                EntityType::Load,
                stop.load_id,
                AuditAction::Update,
                format!("Stop {} times updated", stop.sequence),
            )
            .with_changed_fields(["check_in_at", "check_out_at", "dwell_minutes"]),
        );

        let mut results = Vec::new();
        for leg in self.storage.legs_for_load(stop.load_id)? {
            if leg.covers_stop(stop.sequence) {
                results.extend(self.recalculator.recalculate_leg(ctx, leg.id)?);
            }
        }
        Ok(results)
    }

    /// Change hazmat/tarp flags and recalculate every leg of the load.
    ///
    /// Nothing is written or recalculated when the flags already match.
    pub fn update_load_attributes(
        &self,
        ctx: &OrgContext,
        load_id: Uuid,
        attributes: LoadAttributes,
    ) -> Result<Vec<RecalcResult>> {
        let mut changed = Vec::new();
        let updated = self.storage.update_if(load_id, |load: &mut Load| {
            if load.org_id != ctx.org_id {
                return false;
            }
            if let Some(hazmat) = attributes.is_hazmat {
                if load.is_hazmat != hazmat {
                    load.is_hazmat = hazmat;
                    changed.push("is_hazmat");
                }
            }
            if let Some(tarp) = attributes.requires_tarp {
                if load.requires_tarp != tarp {
                    load.requires_tarp = tarp;
                    changed.push("requires_tarp");
                }
            }
            if changed.is_empty() {
                return false;
            }
            load.updated_at = Utc::now();
            true
        })?;

        if updated.is_none() {
            let load: Load = self.storage.fetch(load_id)?;
            ctx.ensure_org("Load", load.org_id)?;
            return Ok(Vec::new());
        }

        self.audit.log_action(
            AuditEntry::new(ctx, EntityType::Load, load_id, AuditAction::Update, "Load attributes updated")
                .with_changed_fields(changed),
        );

        self.recalculator.recalculate_load(ctx, load_id)
    }

    fn assign<F>(&self, ctx: &OrgContext, leg_id: Uuid, f: F) -> Result<Vec<RecalcResult>>
    where
        F: FnOnce(&mut DispatchLeg),
    {
        let leg: DispatchLeg = self.storage.fetch(leg_id)?;
        ctx.ensure_org("DispatchLeg", leg.org_id)?;

        let leg = self.storage.update(leg_id, |leg: &mut DispatchLeg| {
            f(leg);
            leg.status = match (leg.status, leg.any_subject()) {
                (LegStatus::Planned, Some(_)) => LegStatus::Assigned,
                (LegStatus::Assigned, None) => LegStatus::Planned,
                (status, _) => status,
            };
            leg.updated_at = Utc::now();
        })?;

        tracing::info!(
            leg_id = %leg_id,
            subject = ?leg.any_subject(),
            "Leg assignment changed"
        );
        self.audit.log_action(
            AuditEntry::new(
                ctx,
                EntityType::DispatchLeg,
                leg_id,
                AuditAction::Update,
                "Leg assignment changed",
            )
            .with_changed_fields(["driver_id", "carrier_partnership_id"]),
        );

        if leg.any_subject().is_some() {
            self.advance_load_to_assigned(leg.load_id)?;
        }

        self.recalculator.recalculate_leg(ctx, leg_id)
    }

    fn advance_load_to_assigned(&self, load_id: Uuid) -> Result<()> {
        let updated = self.storage.update_if(load_id, |load: &mut Load| {
            if load.status != LoadStatus::Pending {
                return false;
            }
            load.status = LoadStatus::Assigned;
            load.updated_at = Utc::now();
            true
        })?;
        if let Some(load) = updated {
            self.stats
                .update_load_count(load.org_id, Some(LoadStatus::Pending), LoadStatus::Assigned);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freight_core::audit::MemoryAuditSink;
    use freight_core::{
        PaySubject, ProfileAssignment, ProfileType, RateProfile, RateRule, RuleCategory, StopType,
        StoredStats, TriggerEvent,
    };

    struct Fixture {
        storage: Arc<Storage>,
        stats: Arc<StoredStats>,
        service: DispatchService,
        ctx: OrgContext,
        load: Load,
        leg: DispatchLeg,
        stops: Vec<Stop>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(Storage::in_memory());
        let stats = Arc::new(StoredStats::new(storage.clone()));
        let service = DispatchService::new(
            storage.clone(),
            stats.clone(),
            Arc::new(MemoryAuditSink::new()),
        );
        let ctx = OrgContext::new(Uuid::now_v7(), Uuid::now_v7());

        let load = Load::new(ctx.org_id, "L-1");
        storage.put(&load).unwrap();
        stats.update_load_count(ctx.org_id, None, LoadStatus::Pending);

        let stops = vec![
            Stop::new(&load, 1, StopType::Pickup, "A"),
            Stop::new(&load, 2, StopType::Delivery, "B"),
        ];
        for stop in &stops {
            storage.put(stop).unwrap();
        }
        let mut leg = DispatchLeg::new(&load, 1, 1, 2);
        leg.leg_loaded_miles = Decimal::from(100);
        storage.put(&leg).unwrap();

        Fixture {
            storage,
            stats,
            service,
            ctx,
            load,
            leg,
            stops,
        }
    }

    fn profile_with(f: &Fixture, profile_type: ProfileType, rules: &[(TriggerEvent, i64)]) -> RateProfile {
        let profile = RateProfile::new(f.ctx.org_id, "P", profile_type);
        f.storage.put(&profile).unwrap();
        for (trigger, rate) in rules {
            f.storage
                .put(&RateRule::new(
                    &profile,
                    trigger.code(),
                    RuleCategory::Accessorial,
                    *trigger,
                    Decimal::from(*rate),
                ))
                .unwrap();
        }
        profile
    }

    fn assign_profile(f: &Fixture, subject: PaySubject, profile: &RateProfile) {
        f.storage
            .put(&ProfileAssignment {
                id: Uuid::now_v7(),
                org_id: f.ctx.org_id,
                subject,
                profile_id: profile.id,
                is_default: true,
                created_at: Utc::now(),
            })
            .unwrap();
    }

    #[test]
    fn test_assign_driver_recalculates_and_advances_load() {
        let f = fixture();
        let driver_id = Uuid::now_v7();
        let profile = profile_with(&f, ProfileType::Driver, &[(TriggerEvent::MileLoaded, 2)]);
        assign_profile(&f, PaySubject::Driver(driver_id), &profile);

        let results = f.service.assign_driver(&f.ctx, f.leg.id, Some(driver_id)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].total, Decimal::from(200));

        let leg: DispatchLeg = f.storage.fetch(f.leg.id).unwrap();
        assert_eq!(leg.status, LegStatus::Assigned);

        let load: Load = f.storage.fetch(f.load.id).unwrap();
        assert_eq!(load.status, LoadStatus::Assigned);
        assert_eq!(load.primary_driver_id, Some(driver_id));
        assert_eq!(
            f.stats.get(f.ctx.org_id).unwrap().load_counts[&LoadStatus::Assigned],
            1
        );
    }

    #[test]
    fn test_switching_to_carrier_moves_pay_and_cache() {
        let f = fixture();
        let driver_id = Uuid::now_v7();
        let driver_profile = profile_with(&f, ProfileType::Driver, &[(TriggerEvent::FlatLeg, 100)]);
        assign_profile(&f, PaySubject::Driver(driver_id), &driver_profile);
        f.service.assign_driver(&f.ctx, f.leg.id, Some(driver_id)).unwrap();

        let partnership = CarrierPartnership {
            id: Uuid::now_v7(),
            org_id: f.ctx.org_id,
            carrier_name: "Acme".to_string(),
            is_active: true,
        };
        f.storage.put(&partnership).unwrap();
        let carrier_profile = profile_with(&f, ProfileType::Carrier, &[(TriggerEvent::FlatLoad, 900)]);
        assign_profile(&f, PaySubject::Carrier(partnership.id), &carrier_profile);

        f.service
            .assign_carrier(&f.ctx, f.leg.id, Some(partnership.id))
            .unwrap();

        let lines = f.storage.payables_for_leg(f.leg.id).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].payee, PaySubject::Carrier(partnership.id));

        let load: Load = f.storage.fetch(f.load.id).unwrap();
        assert_eq!(load.primary_driver_id, None);
        assert_eq!(load.primary_carrier_id, Some(partnership.id));
    }

    #[test]
    fn test_assign_inactive_carrier_writes_nothing() {
        let f = fixture();
        let partnership = CarrierPartnership {
            id: Uuid::now_v7(),
            org_id: f.ctx.org_id,
            carrier_name: "Gone".to_string(),
            is_active: false,
        };
        f.storage.put(&partnership).unwrap();

        let err = f
            .service
            .assign_carrier(&f.ctx, f.leg.id, Some(partnership.id))
            .unwrap_err();
        assert!(matches!(err, Error::InactivePartnership(_)));

        let leg: DispatchLeg = f.storage.fetch(f.leg.id).unwrap();
        assert_eq!(leg.carrier_partnership_id, None);
    }

    #[test]
    fn test_stop_times_drive_waiting_pay() {
        let f = fixture();
        let driver_id = Uuid::now_v7();
        let profile = profile_with(&f, ProfileType::Driver, &[(TriggerEvent::TimeWaiting, 20)]);
        assign_profile(&f, PaySubject::Driver(driver_id), &profile);
        f.service.assign_driver(&f.ctx, f.leg.id, Some(driver_id)).unwrap();

        let arrived = Utc::now();
        let results = f
            .service
            .update_stop_times(
                &f.ctx,
                f.stops[1].id,
                StopTimes {
                    check_in_at: Some(arrived),
                    check_out_at: Some(arrived + chrono::Duration::minutes(90)),
                    dwell_minutes: None,
                },
            )
            .unwrap();

        let stop: Stop = f.storage.fetch(f.stops[1].id).unwrap();
        assert_eq!(stop.dwell_minutes, Decimal::from(90));
        assert_eq!(results[0].total, Decimal::from(30));
    }

    #[test]
    fn test_hazmat_flag_toggles_pay() {
        let f = fixture();
        let driver_id = Uuid::now_v7();
        let profile = profile_with(
            &f,
            ProfileType::Driver,
            &[(TriggerEvent::FlatLeg, 100), (TriggerEvent::AttrHazmat, 75)],
        );
        assign_profile(&f, PaySubject::Driver(driver_id), &profile);
        f.service.assign_driver(&f.ctx, f.leg.id, Some(driver_id)).unwrap();

        let attrs = LoadAttributes {
            is_hazmat: Some(true),
            requires_tarp: None,
        };
        let results = f.service.update_load_attributes(&f.ctx, f.load.id, attrs).unwrap();
        assert_eq!(results[0].total, Decimal::from(175));

        // Same flags again: no write, no recalculation
        let again = f.service.update_load_attributes(&f.ctx, f.load.id, attrs).unwrap();
        assert!(again.is_empty());
    }
}
