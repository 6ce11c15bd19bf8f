//! Manual payables and line locking

use crate::{Error, Result};
use chrono::Utc;
use freight_core::{
    round_money, AuditAction, AuditEntry, AuditSink, DispatchLeg, EntityType, LoadPayable,
    OrgContext, PayableSource, Storage,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Operator-entered pay line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualPayable {
    /// Description
    pub description: String,
    /// Quantity
    pub quantity: Decimal,
    /// Rate (negative for a deduction)
    pub rate: Decimal,
}

/// Payable line operations outside recalculation
#[derive(Clone)]
pub struct PayableLedger {
    storage: Arc<Storage>,
    audit: Arc<dyn AuditSink>,
}

impl PayableLedger {
    /// Create ledger
    pub fn new(storage: Arc<Storage>, audit: Arc<dyn AuditSink>) -> Self {
        Self { storage, audit }
    }

    /// Add a MANUAL line for the leg's current subject
    pub fn add_manual_payable(
        &self,
        ctx: &OrgContext,
        leg_id: Uuid,
        entry: ManualPayable,
    ) -> Result<LoadPayable> {
        let leg: DispatchLeg = self.storage.fetch(leg_id)?;
        ctx.ensure_org("DispatchLeg", leg.org_id)?;

        let payee = leg.any_subject().ok_or_else(|| {
            Error::InvalidInput(format!("Leg {} has nobody assigned to pay", leg_id))
        })?;
        if entry.description.trim().is_empty() {
            return Err(Error::InvalidInput("Manual payable needs a description".to_string()));
        }

        let line = LoadPayable {
            id: Uuid::now_v7(),
            org_id: leg.org_id,
            load_id: leg.load_id,
            leg_id,
            payee,
            source: PayableSource::Manual,
            is_locked: false,
            rule_id: None,
            description: entry.description,
            quantity: entry.quantity,
            rate: entry.rate,
            total_amount: round_money(entry.quantity * entry.rate),
            warning_message: None,
            created_at: Utc::now(),
        };
        self.storage.put(&line)?;

        self.audit.log_action(AuditEntry::new(
            ctx,
            EntityType::LoadPayable,
            line.id,
            AuditAction::Create,
            format!("Manual payable {} added", line.total_amount),
        ));
        Ok(line)
    }

    /// Lock or unlock a SYSTEM line; locked lines survive recalculation
    pub fn set_payable_lock(
        &self,
        ctx: &OrgContext,
        payable_id: Uuid,
        locked: bool,
    ) -> Result<LoadPayable> {
        let line: LoadPayable = self.storage.fetch(payable_id)?;
        ctx.ensure_org("LoadPayable", line.org_id)?;
        if line.source == PayableSource::Manual {
            return Err(Error::InvalidInput(
                "Manual payables are never recalculated and cannot be locked".to_string(),
            ));
        }

        let updated = self
            .storage
            .update(payable_id, |l: &mut LoadPayable| l.is_locked = locked)?;

        self.audit.log_action(
            AuditEntry::new(
                ctx,
                EntityType::LoadPayable,
                payable_id,
                AuditAction::Update,
                if locked { "Locked" } else { "Unlocked" },
            )
            .with_changed_fields(["is_locked"]),
        );
        Ok(updated)
    }

    /// Delete a MANUAL or locked line
    pub fn remove_payable(&self, ctx: &OrgContext, payable_id: Uuid) -> Result<()> {
        let line: LoadPayable = self.storage.fetch(payable_id)?;
        ctx.ensure_org("LoadPayable", line.org_id)?;
        if line.is_engine_owned() {
            return Err(Error::NotEditable(payable_id));
        }
        self.storage.delete::<LoadPayable>(payable_id)?;
        self.audit.log_action(AuditEntry::new(
            ctx,
            EntityType::LoadPayable,
            payable_id,
            AuditAction::Delete,
            "Payable removed",
        ));
        Ok(())
    }

    /// Lines of a leg
    pub fn list_leg_payables(&self, ctx: &OrgContext, leg_id: Uuid) -> Result<Vec<LoadPayable>> {
        let mut lines = self.storage.payables_for_leg(leg_id)?;
        lines.retain(|line| line.org_id == ctx.org_id);
        Ok(lines)
    }

    /// Sum of every line of every leg of a load
    pub fn load_pay_total(&self, ctx: &OrgContext, load_id: Uuid) -> Result<Decimal> {
        Ok(self
            .storage
            .scan(|line: &LoadPayable| line.org_id == ctx.org_id && line.load_id == load_id)?
            .iter()
            .map(|line| line.total_amount)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freight_core::audit::MemoryAuditSink;
    use freight_core::Load;

    fn setup() -> (Arc<Storage>, PayableLedger, OrgContext, DispatchLeg) {
        let storage = Arc::new(Storage::in_memory());
        let ledger = PayableLedger::new(storage.clone(), Arc::new(MemoryAuditSink::new()));
        let ctx = OrgContext::new(Uuid::now_v7(), Uuid::now_v7());
        let load = Load::new(ctx.org_id, "L-1");
        storage.put(&load).unwrap();
        let mut leg = DispatchLeg::new(&load, 1, 1, 2);
        leg.driver_id = Some(Uuid::now_v7());
        storage.put(&leg).unwrap();
        (storage, ledger, ctx, leg)
    }

    #[test]
    fn test_manual_lines_count_toward_load_total() {
        let (_storage, ledger, ctx, leg) = setup();
        ledger
            .add_manual_payable(
                &ctx,
                leg.id,
                ManualPayable {
                    description: "Lumper".to_string(),
                    quantity: Decimal::ONE,
                    rate: Decimal::new(6500, 2),
                },
            )
            .unwrap();
        ledger
            .add_manual_payable(
                &ctx,
                leg.id,
                ManualPayable {
                    description: "Advance".to_string(),
                    quantity: Decimal::ONE,
                    rate: Decimal::from(-20),
                },
            )
            .unwrap();

        assert_eq!(ledger.list_leg_payables(&ctx, leg.id).unwrap().len(), 2);
        assert_eq!(ledger.load_pay_total(&ctx, leg.load_id).unwrap(), Decimal::from(45));
    }

    #[test]
    fn test_manual_line_needs_subject() {
        let (storage, ledger, ctx, leg) = setup();
        storage
            .update(leg.id, |l: &mut DispatchLeg| l.driver_id = None)
            .unwrap();
        let err = ledger
            .add_manual_payable(
                &ctx,
                leg.id,
                ManualPayable {
                    description: "Lumper".to_string(),
                    quantity: Decimal::ONE,
                    rate: Decimal::ONE,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_engine_lines_cannot_be_removed_until_locked() {
        let (storage, ledger, ctx, leg) = setup();
        let line = LoadPayable {
            id: Uuid::now_v7(),
            org_id: ctx.org_id,
            load_id: leg.load_id,
            leg_id: leg.id,
            payee: leg.any_subject().unwrap(),
            source: PayableSource::System,
            is_locked: false,
            rule_id: None,
            description: "Loaded miles".to_string(),
            quantity: Decimal::from(100),
            rate: Decimal::from(2),
            total_amount: Decimal::from(200),
            warning_message: None,
            created_at: Utc::now(),
        };
        storage.put(&line).unwrap();

        assert!(matches!(
            ledger.remove_payable(&ctx, line.id).unwrap_err(),
            Error::NotEditable(_)
        ));
        assert!(ledger.set_payable_lock(&ctx, line.id, true).unwrap().is_locked);
        ledger.remove_payable(&ctx, line.id).unwrap();
        assert!(storage.get::<LoadPayable>(line.id).unwrap().is_none());
    }
}
