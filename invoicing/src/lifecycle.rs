//! Invoice status lifecycle
//!
//! ```text
//! MISSING_DATA → DRAFT → BILLED → PENDING_PAYMENT → PAID
//!       └──────────┴────────┴────────────┴──────→ VOID
//! ```
//!
//! Each transition is a guarded single-document write: the status is re-read
//! inside the write and the transition is refused if another writer moved it
//! first. Finalization writes the line items before flipping the status, so a
//! crash in between leaves a DRAFT invoice that finalizes cleanly on retry.

use crate::{
    calculator::{InvoiceAmounts, InvoiceCalculator},
    line_items::build_line_items,
    Error, Result,
};
use chrono::Utc;
use freight_core::{
    AuditAction, AuditEntry, AuditSink, EntityType, Invoice, InvoiceLineItem, InvoiceStatus,
    OrgContext, StatsAggregate, Storage,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Invoice lifecycle operations
#[derive(Clone)]
pub struct InvoiceService {
    storage: Arc<Storage>,
    calculator: InvoiceCalculator,
    stats: Arc<dyn StatsAggregate>,
    audit: Arc<dyn AuditSink>,
}

impl InvoiceService {
    /// Create service
    pub fn new(
        storage: Arc<Storage>,
        stats: Arc<dyn StatsAggregate>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            calculator: InvoiceCalculator::new(storage.clone()),
            storage,
            stats,
            audit,
        }
    }

    /// Amount calculator over the same store
    pub fn calculator(&self) -> &InvoiceCalculator {
        &self.calculator
    }

    /// Line items: stored for finalized and void invoices, synthesized otherwise
    pub fn get_line_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLineItem>> {
        let invoice: Invoice = self.storage.fetch(invoice_id)?;
        if invoice.status.is_frozen() || invoice.status == InvoiceStatus::Void {
            return Ok(self.storage.line_items_for_invoice(invoice_id)?);
        }
        let pricing = self.calculator.price_invoice(&invoice)?;
        Ok(build_line_items(&invoice, &pricing))
    }

    /// Persist current amounts and line items on an unbilled invoice
    pub fn store_draft_snapshot(&self, invoice_id: Uuid) -> Result<InvoiceAmounts> {
        let invoice: Invoice = self.storage.fetch(invoice_id)?;
        if invoice.status.is_frozen() || invoice.status == InvoiceStatus::Void {
            return Err(Error::Frozen(invoice_id));
        }

        let pricing = self.calculator.price_invoice(&invoice)?;
        self.replace_line_items(invoice_id, build_line_items(&invoice, &pricing))?;

        let written = self.storage.update_if(invoice_id, |inv: &mut Invoice| {
            if inv.status.is_frozen() || inv.status == InvoiceStatus::Void {
                return false;
            }
            pricing.amounts.apply_to(inv);
            inv.updated_at = Utc::now();
            true
        })?;
        if written.is_none() {
            return Err(Error::Frozen(invoice_id));
        }

        Ok(pricing.amounts)
    }

    /// MISSING_DATA → DRAFT, linking `lane_id`.
    ///
    /// Returns `None` without writing when the invoice already left
    /// MISSING_DATA, so repeated promotion is a no-op.
    pub fn mark_draft(
        &self,
        ctx: &OrgContext,
        invoice_id: Uuid,
        lane_id: Option<Uuid>,
    ) -> Result<Option<Invoice>> {
        let updated = self.storage.update_if(invoice_id, |inv: &mut Invoice| {
            if inv.org_id != ctx.org_id || inv.status != InvoiceStatus::MissingData {
                return false;
            }
            inv.status = InvoiceStatus::Draft;
            if lane_id.is_some() {
                inv.contract_lane_id = lane_id;
            }
            inv.updated_at = Utc::now();
            true
        })?;

        let Some(invoice) = updated else {
            return Ok(None);
        };

        self.record_transition(ctx, &invoice, InvoiceStatus::MissingData);
        self.store_draft_snapshot(invoice_id)?;

        Ok(Some(self.storage.fetch(invoice_id)?))
    }

    /// DRAFT → BILLED; amounts and line items freeze
    pub fn finalize(&self, ctx: &OrgContext, invoice_id: Uuid) -> Result<Invoice> {
        let invoice: Invoice = self.storage.fetch(invoice_id)?;
        ctx.ensure_org("Invoice", invoice.org_id)?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(Error::InvalidTransition {
                invoice_id,
                from: invoice.status,
                to: InvoiceStatus::Billed,
            });
        }

        let pricing = self.calculator.price_invoice(&invoice)?;
        self.replace_line_items(invoice_id, build_line_items(&invoice, &pricing))?;

        let mut observed = invoice.status;
        let now = Utc::now();
        let updated = self.storage.update_if(invoice_id, |inv: &mut Invoice| {
            observed = inv.status;
            if inv.status != InvoiceStatus::Draft {
                return false;
            }
            pricing.amounts.apply_to(inv);
            inv.status = InvoiceStatus::Billed;
            inv.billed_at = Some(now);
            inv.updated_at = now;
            true
        })?;

        let Some(billed) = updated else {
            return Err(Error::InvalidTransition {
                invoice_id,
                from: observed,
                to: InvoiceStatus::Billed,
            });
        };

        tracing::info!(
            invoice_id = %invoice_id,
            total = %billed.total_amount,
            "Invoice finalized"
        );
        self.record_transition(ctx, &billed, InvoiceStatus::Draft);
        Ok(billed)
    }

    /// BILLED → PENDING_PAYMENT
    pub fn mark_pending_payment(&self, ctx: &OrgContext, invoice_id: Uuid) -> Result<Invoice> {
        self.transition(ctx, invoice_id, InvoiceStatus::PendingPayment, |_| {})
    }

    /// BILLED or PENDING_PAYMENT → PAID
    pub fn mark_paid(&self, ctx: &OrgContext, invoice_id: Uuid) -> Result<Invoice> {
        self.transition(ctx, invoice_id, InvoiceStatus::Paid, |inv| {
            inv.paid_at = Some(Utc::now())
        })
    }

    /// Any state except PAID → VOID; stored amounts are kept as they are
    pub fn void(&self, ctx: &OrgContext, invoice_id: Uuid) -> Result<Invoice> {
        self.transition(ctx, invoice_id, InvoiceStatus::Void, |inv| {
            inv.voided_at = Some(Utc::now())
        })
    }

    /// Set the pass-through tax on an unbilled invoice
    pub fn set_tax_amount(
        &self,
        ctx: &OrgContext,
        invoice_id: Uuid,
        tax_amount: Decimal,
    ) -> Result<InvoiceAmounts> {
        let updated = self.storage.update_if(invoice_id, |inv: &mut Invoice| {
            if inv.org_id != ctx.org_id
                || inv.status.is_frozen()
                || inv.status == InvoiceStatus::Void
            {
                return false;
            }
            inv.tax_amount = tax_amount;
            inv.updated_at = Utc::now();
            true
        })?;

        let Some(invoice) = updated else {
            return Err(Error::Frozen(invoice_id));
        };

        self.audit.log_action(
            AuditEntry::new(
                ctx,
                EntityType::Invoice,
                invoice_id,
                AuditAction::Update,
                format!("Tax set to {}", tax_amount),
            )
            .with_changed_fields(["tax_amount"]),
        );

        self.calculator.amounts_for(&invoice)
    }

    fn transition<F>(
        &self,
        ctx: &OrgContext,
        invoice_id: Uuid,
        to: InvoiceStatus,
        stamp: F,
    ) -> Result<Invoice>
    where
        F: FnOnce(&mut Invoice),
    {
        let mut observed = None;
        let updated = self.storage.update_if(invoice_id, |inv: &mut Invoice| {
            observed = Some(inv.status);
            if inv.org_id != ctx.org_id || !inv.status.can_transition_to(to) {
                return false;
            }
            inv.status = to;
            inv.updated_at = Utc::now();
            stamp(inv);
            true
        })?;

        let from = observed.unwrap_or(to);
        let Some(invoice) = updated else {
            return Err(Error::InvalidTransition {
                invoice_id,
                from,
                to,
            });
        };

        self.record_transition(ctx, &invoice, from);
        Ok(invoice)
    }

    fn replace_line_items(&self, invoice_id: Uuid, items: Vec<InvoiceLineItem>) -> Result<()> {
        self.storage
            .delete_where(|item: &InvoiceLineItem| item.invoice_id == invoice_id)?;
        for item in &items {
            self.storage.put(item)?;
        }
        Ok(())
    }

    fn record_transition(&self, ctx: &OrgContext, invoice: &Invoice, from: InvoiceStatus) {
        self.stats
            .update_invoice_count(invoice.org_id, Some(from), invoice.status);
        self.audit.log_action(
            AuditEntry::new(
                ctx,
                EntityType::Invoice,
                invoice.id,
                AuditAction::StatusChange,
                format!("{} → {}", from, invoice.status),
            )
            .with_changed_fields(["status"]),
        );
    }
}
