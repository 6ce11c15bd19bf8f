//! Pay recalculation
//!
//! Regenerates the engine-owned payable lines of one leg for one payee kind.
//! Lines are replaced, never patched: every run deletes the prior SYSTEM,
//! unlocked lines of the leg and payee kind and inserts a fresh set, so
//! repeated runs over unchanged data produce the same lines. MANUAL and
//! locked lines are never touched.

use crate::{
    evaluator::{evaluate_rule, RuleContext},
    selector::{select_profile, ProfileCandidate},
    Error, Result,
};
use chrono::Utc;
use freight_core::{
    AuditAction, AuditEntry, AuditSink, CarrierPartnership, DispatchLeg, EntityType, Load,
    LoadPayable, OrgContext, PayableSource, PayeeKind, PaySubject, RateProfile, RateRule,
    RuleCategory, Storage, TriggerEvent,
};
use invoicing::InvoiceCalculator;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one recalculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalcResult {
    /// Leg
    pub leg_id: Uuid,
    /// Subject paid, none when the leg has nobody of this kind
    pub payee: Option<PaySubject>,
    /// Selected profile
    pub profile_id: Option<Uuid>,
    /// Lines written
    pub lines: Vec<LoadPayable>,
    /// Sum of line totals
    pub total: Decimal,
    /// Configuration and data warnings
    pub warnings: Vec<String>,
}

impl RecalcResult {
    fn empty(leg_id: Uuid, warning: String) -> Self {
        Self {
            leg_id,
            payee: None,
            profile_id: None,
            lines: Vec::new(),
            total: Decimal::ZERO,
            warnings: vec![warning],
        }
    }
}

/// Pay recalculator
#[derive(Clone)]
pub struct PayRecalculator {
    storage: Arc<Storage>,
    invoices: InvoiceCalculator,
    audit: Arc<dyn AuditSink>,
}

impl PayRecalculator {
    /// Create recalculator
    pub fn new(storage: Arc<Storage>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            invoices: InvoiceCalculator::new(storage.clone()),
            storage,
            audit,
        }
    }

    /// Regenerate driver pay for a leg
    pub fn calculate_driver_pay(&self, ctx: &OrgContext, leg_id: Uuid) -> Result<RecalcResult> {
        self.recalculate(ctx, leg_id, PayeeKind::Driver)
    }

    /// Regenerate carrier pay for a leg
    pub fn calculate_carrier_pay(&self, ctx: &OrgContext, leg_id: Uuid) -> Result<RecalcResult> {
        self.recalculate(ctx, leg_id, PayeeKind::Carrier)
    }

    /// Recalculate every payee kind a leg has a subject or engine lines for
    pub fn recalculate_leg(&self, ctx: &OrgContext, leg_id: Uuid) -> Result<Vec<RecalcResult>> {
        let leg: DispatchLeg = self.storage.fetch(leg_id)?;
        let existing = self.storage.payables_for_leg(leg_id)?;

        let mut results = Vec::new();
        for kind in [PayeeKind::Driver, PayeeKind::Carrier] {
            let has_lines = existing
                .iter()
                .any(|line| line.payee.kind() == kind && line.is_engine_owned());
            if leg.subject(kind).is_some() || has_lines {
                results.push(self.recalculate(ctx, leg_id, kind)?);
            }
        }
        Ok(results)
    }

    /// Recalculate every leg of a load
    pub fn recalculate_load(&self, ctx: &OrgContext, load_id: Uuid) -> Result<Vec<RecalcResult>> {
        let mut results = Vec::new();
        for leg in self.storage.legs_for_load(load_id)? {
            results.extend(self.recalculate_leg(ctx, leg.id)?);
        }
        Ok(results)
    }

    fn recalculate(&self, ctx: &OrgContext, leg_id: Uuid, kind: PayeeKind) -> Result<RecalcResult> {
        let leg: DispatchLeg = self.storage.fetch(leg_id)?;
        ctx.ensure_org("DispatchLeg", leg.org_id)?;
        let load: Load = self.storage.fetch(leg.load_id)?;

        if leg.is_first_leg() {
            self.sync_primary_subject(&load, leg.any_subject())?;
        }

        let Some(subject) = leg.subject(kind) else {
            let removed = self.clear_engine_lines(&leg, kind)?;
            tracing::debug!(leg_id = %leg_id, kind = %kind, removed, "No subject on leg");
            return Ok(RecalcResult::empty(
                leg_id,
                format!("Leg {} has no {} assigned", leg.sequence, kind),
            ));
        };

        if let PaySubject::Carrier(partnership_id) = subject {
            let partnership: CarrierPartnership = self.storage.fetch(partnership_id)?;
            if !partnership.is_active {
                return Err(Error::InactivePartnership(partnership_id));
            }
        }

        let candidates = self.candidates(ctx, subject)?;
        let Some(profile_id) = select_profile(&candidates, leg.leg_loaded_miles) else {
            let warning = format!("No pay profile assigned to {}", subject);
            let line = self.line(
                &leg,
                subject,
                None,
                "No pay profile",
                Decimal::ZERO,
                Decimal::ZERO,
                Decimal::ZERO,
                Some(warning.clone()),
            );
            self.replace_lines(&leg, kind, std::slice::from_ref(&line))?;

            tracing::warn!(leg_id = %leg_id, subject = %subject, "No pay profile for subject");
            return Ok(RecalcResult {
                leg_id,
                payee: Some(subject),
                profile_id: None,
                lines: vec![line],
                total: Decimal::ZERO,
                warnings: vec![warning],
            });
        };

        let rules: Vec<RateRule> = self
            .storage
            .rules_for_profile(profile_id)?
            .into_iter()
            .filter(|rule| rule.is_active && rule.category != RuleCategory::ManualTemplate)
            .collect();

        let stops = self.storage.stops_for_leg(&leg)?;
        let invoice_total = if rules.iter().any(|r| r.trigger == TriggerEvent::PctOfLoad) {
            self.invoices.load_invoice_total(load.id)?
        } else {
            None
        };
        let rule_ctx = RuleContext {
            leg: &leg,
            load: &load,
            stops: &stops,
            invoice_total,
        };

        let mut lines = Vec::new();
        let mut warnings = Vec::new();
        for rule in &rules {
            let outcome = evaluate_rule(rule, &rule_ctx);
            if let Some(warning) = &outcome.warning {
                warnings.push(warning.clone());
            }
            if outcome.amount <= Decimal::ZERO {
                continue;
            }

            let total = match rule.category {
                RuleCategory::Deduction => -outcome.amount,
                _ => outcome.amount,
            };
            let description = format!(
                "{} ({} {} @ {})",
                rule.name,
                outcome.quantity,
                rule.trigger.unit(),
                rule.rate_amount
            );
            lines.push(self.line(
                &leg,
                subject,
                Some(rule.id),
                &description,
                outcome.quantity,
                rule.rate_amount,
                total,
                outcome.warning,
            ));
        }

        let rule_total: Decimal = lines.iter().map(|line| line.total_amount).sum();
        if rules.is_empty() {
            warnings.push(format!("Profile {} has no active rules", profile_id));
        } else if rule_total.is_zero() {
            let explanation = if !warnings.is_empty() {
                warnings.join("; ")
            } else if lines.is_empty() {
                "No rule applied to this leg".to_string()
            } else {
                "Pay lines total zero".to_string()
            };
            lines.push(self.line(
                &leg,
                subject,
                None,
                "No pay generated",
                Decimal::ZERO,
                Decimal::ZERO,
                Decimal::ZERO,
                Some(explanation),
            ));
        }

        self.replace_lines(&leg, kind, &lines)?;
        let total: Decimal = lines.iter().map(|line| line.total_amount).sum();

        tracing::info!(
            leg_id = %leg_id,
            subject = %subject,
            profile_id = %profile_id,
            lines = lines.len(),
            total = %total,
            "Pay recalculated"
        );
        self.audit.log_action(AuditEntry::new(
            ctx,
            EntityType::DispatchLeg,
            leg_id,
            AuditAction::Recalculate,
            format!("{} pay recalculated: {} lines, total {}", kind, lines.len(), total),
        ));

        Ok(RecalcResult {
            leg_id,
            payee: Some(subject),
            profile_id: Some(profile_id),
            lines,
            total,
            warnings,
        })
    }

    /// Assignments of `subject` with usable profiles of the right type
    fn candidates(&self, ctx: &OrgContext, subject: PaySubject) -> Result<Vec<ProfileCandidate>> {
        let mut candidates = Vec::new();
        for assignment in self.storage.assignments_for(ctx.org_id, subject)? {
            let Some(profile) = self.storage.get::<RateProfile>(assignment.profile_id)? else {
                tracing::warn!(
                    assignment_id = %assignment.id,
                    profile_id = %assignment.profile_id,
                    "Assignment points at a missing profile"
                );
                continue;
            };
            if !profile.is_active || profile.profile_type != subject.kind().profile_type() {
                continue;
            }

            let base_threshold = self
                .storage
                .rules_for_profile(profile.id)?
                .into_iter()
                .filter(|rule| rule.is_active && rule.category == RuleCategory::Base)
                .filter_map(|rule| rule.min_threshold)
                .max();

            candidates.push(ProfileCandidate {
                assignment_id: assignment.id,
                profile_id: profile.id,
                is_default: assignment.is_default,
                base_threshold,
            });
        }
        Ok(candidates)
    }

    fn sync_primary_subject(&self, load: &Load, subject: Option<PaySubject>) -> Result<()> {
        if load.primary_subject() == subject {
            return Ok(());
        }
        let updated = self
            .storage
            .update_if(load.id, |l: &mut Load| l.set_primary_subject(subject))?;
        if updated.is_some() {
            tracing::debug!(load_id = %load.id, "Primary subject cache updated");
        }
        Ok(())
    }

    fn clear_engine_lines(&self, leg: &DispatchLeg, kind: PayeeKind) -> Result<usize> {
        let leg_id = leg.id;
        Ok(self.storage.delete_where(|line: &LoadPayable| {
            line.leg_id == leg_id && line.payee.kind() == kind && line.is_engine_owned()
        })?)
    }

    fn replace_lines(&self, leg: &DispatchLeg, kind: PayeeKind, lines: &[LoadPayable]) -> Result<()> {
        self.clear_engine_lines(leg, kind)?;
        for line in lines {
            self.storage.put(line)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn line(
        &self,
        leg: &DispatchLeg,
        payee: PaySubject,
        rule_id: Option<Uuid>,
        description: &str,
        quantity: Decimal,
        rate: Decimal,
        total_amount: Decimal,
        warning_message: Option<String>,
    ) -> LoadPayable {
        LoadPayable {
            id: Uuid::now_v7(),
            org_id: leg.org_id,
            load_id: leg.load_id,
            leg_id: leg.id,
            payee,
            source: PayableSource::System,
            is_locked: false,
            rule_id,
            description: description.to_string(),
            quantity,
            rate,
            total_amount,
            warning_message,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freight_core::audit::MemoryAuditSink;
    use freight_core::{ProfileAssignment, ProfileType, StopType, Stop};

    struct Fixture {
        storage: Arc<Storage>,
        recalculator: PayRecalculator,
        ctx: OrgContext,
        load: Load,
        leg: DispatchLeg,
        driver_id: Uuid,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(Storage::in_memory());
        let audit = Arc::new(MemoryAuditSink::new());
        let recalculator = PayRecalculator::new(storage.clone(), audit);
        let ctx = OrgContext::new(Uuid::now_v7(), Uuid::now_v7());

        let load = Load::new(ctx.org_id, "L-1");
        storage.put(&load).unwrap();
        storage.put(&Stop::new(&load, 1, StopType::Pickup, "A")).unwrap();
        storage.put(&Stop::new(&load, 2, StopType::Delivery, "B")).unwrap();

        let driver_id = Uuid::now_v7();
        let mut leg = DispatchLeg::new(&load, 1, 1, 2);
        leg.driver_id = Some(driver_id);
        leg.leg_loaded_miles = Decimal::from(100);
        storage.put(&leg).unwrap();

        Fixture {
            storage,
            recalculator,
            ctx,
            load,
            leg,
            driver_id,
        }
    }

    fn assign(f: &Fixture, profile: &RateProfile, is_default: bool) {
        f.storage
            .put(&ProfileAssignment {
                id: Uuid::now_v7(),
                org_id: f.ctx.org_id,
                subject: PaySubject::Driver(f.driver_id),
                profile_id: profile.id,
                is_default,
                created_at: Utc::now(),
            })
            .unwrap();
    }

    fn driver_profile(f: &Fixture) -> RateProfile {
        let profile = RateProfile::new(f.ctx.org_id, "Standard", ProfileType::Driver);
        f.storage.put(&profile).unwrap();
        f.storage
            .put(&RateRule::new(
                &profile,
                "Loaded miles",
                RuleCategory::Base,
                TriggerEvent::MileLoaded,
                Decimal::new(200, 2),
            ))
            .unwrap();
        f.storage
            .put(&RateRule::new(
                &profile,
                "Escrow",
                RuleCategory::Deduction,
                TriggerEvent::FlatLeg,
                Decimal::from(15),
            ))
            .unwrap();
        profile
    }

    #[test]
    fn test_driver_pay_with_deduction() {
        let f = fixture();
        let profile = driver_profile(&f);
        assign(&f, &profile, true);

        let result = f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();
        assert_eq!(result.profile_id, Some(profile.id));
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.total, Decimal::from(185));

        let deduction = result
            .lines
            .iter()
            .find(|line| line.total_amount < Decimal::ZERO)
            .unwrap();
        assert_eq!(deduction.total_amount, Decimal::from(-15));

        let load: Load = f.storage.fetch(f.load.id).unwrap();
        assert_eq!(load.primary_driver_id, Some(f.driver_id));
    }

    #[test]
    fn test_recalculation_replaces_lines() {
        let f = fixture();
        let profile = driver_profile(&f);
        assign(&f, &profile, true);

        let first = f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();
        let second = f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();

        let stored = f.storage.payables_for_leg(f.leg.id).unwrap();
        assert_eq!(stored.len(), 2);

        let summary = |r: &RecalcResult| {
            let mut lines: Vec<_> = r
                .lines
                .iter()
                .map(|l| (l.description.clone(), l.total_amount, l.warning_message.clone()))
                .collect();
            lines.sort();
            lines
        };
        assert_eq!(summary(&first), summary(&second));
        assert_eq!(first.warnings, second.warnings);
    }

    #[test]
    fn test_manual_and_locked_lines_survive() {
        let f = fixture();
        let profile = driver_profile(&f);
        assign(&f, &profile, true);

        let first = f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();
        let locked_id = first.lines[0].id;
        f.storage
            .update(locked_id, |l: &mut LoadPayable| l.is_locked = true)
            .unwrap();

        let mut manual = first.lines[1].clone();
        manual.id = Uuid::now_v7();
        manual.source = PayableSource::Manual;
        manual.description = "Lumper reimbursement".to_string();
        f.storage.put(&manual).unwrap();

        f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();

        let stored = f.storage.payables_for_leg(f.leg.id).unwrap();
        assert!(stored.iter().any(|l| l.id == locked_id));
        assert!(stored.iter().any(|l| l.id == manual.id));
        assert_eq!(stored.len(), 4);
    }

    #[test]
    fn test_no_profile_yields_warning_line() {
        let f = fixture();
        let result = f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();

        assert_eq!(result.profile_id, None);
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].total_amount, Decimal::ZERO);
        assert!(result.lines[0].warning_message.is_some());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_zero_total_gets_explanatory_line() {
        let f = fixture();
        let profile = RateProfile::new(f.ctx.org_id, "Hazmat only", ProfileType::Driver);
        f.storage.put(&profile).unwrap();
        f.storage
            .put(&RateRule::new(
                &profile,
                "Hazmat",
                RuleCategory::Accessorial,
                TriggerEvent::AttrHazmat,
                Decimal::from(75),
            ))
            .unwrap();
        f.storage
            .put(&RateRule::new(
                &profile,
                "Detention",
                RuleCategory::Accessorial,
                TriggerEvent::TimeWaiting,
                Decimal::from(20),
            ))
            .unwrap();
        assign(&f, &profile, true);

        let result = f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.total, Decimal::ZERO);
        let explanation = result.lines[0].warning_message.clone().unwrap();
        assert!(explanation.contains("dwell"));
    }

    #[test]
    fn test_offsetting_lines_get_explanatory_line() {
        let f = fixture();
        let profile = RateProfile::new(f.ctx.org_id, "Break-even", ProfileType::Driver);
        f.storage.put(&profile).unwrap();
        f.storage
            .put(&RateRule::new(
                &profile,
                "Leg flat",
                RuleCategory::Base,
                TriggerEvent::FlatLeg,
                Decimal::from(15),
            ))
            .unwrap();
        f.storage
            .put(&RateRule::new(
                &profile,
                "Escrow",
                RuleCategory::Deduction,
                TriggerEvent::FlatLeg,
                Decimal::from(15),
            ))
            .unwrap();
        assign(&f, &profile, true);

        let result = f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();
        assert_eq!(result.total, Decimal::ZERO);
        assert_eq!(result.lines.len(), 3);
        let explanation = result
            .lines
            .iter()
            .find(|l| l.rule_id.is_none())
            .unwrap();
        assert_eq!(explanation.total_amount, Decimal::ZERO);
        assert_eq!(explanation.warning_message.as_deref(), Some("Pay lines total zero"));
    }

    #[test]
    fn test_manual_template_rules_are_not_evaluated() {
        let f = fixture();
        let profile = driver_profile(&f);
        f.storage
            .put(&RateRule::new(
                &profile,
                "Lumper",
                RuleCategory::ManualTemplate,
                TriggerEvent::FlatLoad,
                Decimal::from(60),
            ))
            .unwrap();
        assign(&f, &profile, true);

        let result = f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();
        assert_eq!(result.lines.len(), 2);
        assert!(result.lines.iter().all(|l| !l.description.starts_with("Lumper")));
    }

    #[test]
    fn test_unassigned_leg_clears_engine_lines() {
        let f = fixture();
        let profile = driver_profile(&f);
        assign(&f, &profile, true);
        f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();

        f.storage
            .update(f.leg.id, |l: &mut DispatchLeg| l.driver_id = None)
            .unwrap();
        let result = f.recalculator.calculate_driver_pay(&f.ctx, f.leg.id).unwrap();

        assert!(result.lines.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(f.storage.payables_for_leg(f.leg.id).unwrap().is_empty());

        let load: Load = f.storage.fetch(f.load.id).unwrap();
        assert_eq!(load.primary_subject(), None);
    }

    #[test]
    fn test_inactive_partnership_is_an_error() {
        let f = fixture();
        let partnership = CarrierPartnership {
            id: Uuid::now_v7(),
            org_id: f.ctx.org_id,
            carrier_name: "Acme Freight".to_string(),
            is_active: false,
        };
        f.storage.put(&partnership).unwrap();
        f.storage
            .update(f.leg.id, |l: &mut DispatchLeg| {
                l.driver_id = None;
                l.carrier_partnership_id = Some(partnership.id);
            })
            .unwrap();

        let err = f.recalculator.calculate_carrier_pay(&f.ctx, f.leg.id).unwrap_err();
        assert!(matches!(err, Error::InactivePartnership(id) if id == partnership.id));
    }

    #[test]
    fn test_missing_leg_is_an_error() {
        let f = fixture();
        let err = f
            .recalculator
            .calculate_driver_pay(&f.ctx, Uuid::now_v7())
            .unwrap_err();
        assert!(matches!(err, Error::Core(e) if e.is_not_found()));
    }
}
