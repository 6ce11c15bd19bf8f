//! Shipment reconciliation
//!
//! Pulls shipments updated within a lookback window from an org's feed and
//! folds them into loads:
//!
//! ```text
//! shipment ─┬─ no HCR/trip ─────────────────────────→ skipped
//!           ├─ unknown external id ──→ classify ─┬──→ processed
//!           │                                    └──→ quarantined (UNMAPPED)
//!           └─ known load ─┬─ UNMAPPED + lane now ──→ promoted
//!                          ├─ same updated_at ──────→ skipped (no writes)
//!                          └─ changed ──→ refresh + recalculate pay → processed
//! ```
//!
//! Shipments are handled one at a time; a failing shipment is counted and
//! bucketed, never fatal to the batch. Pages are pulled `chunk_size` at a
//! time, at most `max_pages_per_run` per invocation. The continuation cursor
//! is persisted per org so the next invocation resumes where this one stopped.

use crate::{
    diagnostics::{BatchSummary, FailureCollector},
    metrics::{BATCH_DURATION, FETCH_FAILURES_TOTAL, SHIPMENTS_TOTAL},
    source::ShipmentSource,
    types::{Credentials, ExternalShipment},
    Error, Result,
};
use chrono::{Duration, Utc};
use freight_core::{
    AuditSink, InvoiceStatus, LoadType, OrgContext, StatsAggregate, Storage, SyncCursor,
};
use lane_classifier::{LoadClassifier, NewLoad, Promoter};
use pay_engine::PayRecalculator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Paging limits of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Shipments requested per page
    pub chunk_size: usize,
    /// Pages pulled per invocation
    pub max_pages_per_run: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            max_pages_per_run: 10,
        }
    }
}

/// Result of [`ShipmentReconciler::process_shipment_batch`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Counters
    pub summary: BatchSummary,
    /// Human-readable report
    pub report: String,
}

/// What happened to one shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipmentOutcome {
    /// New CONTRACT or SPOT load
    Created,
    /// Existing load refreshed
    Updated,
    /// New UNMAPPED load
    Quarantined,
    /// Existing UNMAPPED load promoted
    Promoted,
    /// Nothing to do
    Skipped,
}

impl ShipmentOutcome {
    fn label(&self) -> &'static str {
        match self {
            ShipmentOutcome::Created => "created",
            ShipmentOutcome::Updated => "updated",
            ShipmentOutcome::Quarantined => "quarantined",
            ShipmentOutcome::Promoted => "promoted",
            ShipmentOutcome::Skipped => "skipped",
        }
    }

    fn count(&self, summary: &mut BatchSummary) {
        match self {
            ShipmentOutcome::Created | ShipmentOutcome::Updated => summary.processed += 1,
            ShipmentOutcome::Quarantined => summary.quarantined += 1,
            ShipmentOutcome::Promoted => summary.promoted += 1,
            ShipmentOutcome::Skipped => summary.skipped += 1,
        }
    }
}

/// Folds an external shipment feed into loads
#[derive(Clone)]
pub struct ShipmentReconciler {
    storage: Arc<Storage>,
    classifier: LoadClassifier,
    promoter: Promoter,
    recalculator: PayRecalculator,
    source: Arc<dyn ShipmentSource>,
    options: BatchOptions,
}

impl ShipmentReconciler {
    /// Create reconciler
    pub fn new(
        storage: Arc<Storage>,
        stats: Arc<dyn StatsAggregate>,
        audit: Arc<dyn AuditSink>,
        source: Arc<dyn ShipmentSource>,
        options: BatchOptions,
    ) -> Self {
        Self {
            classifier: LoadClassifier::new(storage.clone(), stats.clone(), audit.clone()),
            promoter: Promoter::new(storage.clone(), stats, audit.clone()),
            recalculator: PayRecalculator::new(storage.clone(), audit),
            storage,
            source,
            options,
        }
    }

    /// Pull and reconcile one batch of shipments for `ctx.org_id`.
    ///
    /// Fetch and per-shipment failures end up in the summary. Only failures
    /// to read or write the sync cursor are returned as errors.
    pub async fn process_shipment_batch(
        &self,
        ctx: &OrgContext,
        credentials: &Credentials,
        lookback_hours: u32,
    ) -> Result<BatchReport> {
        let timer = BATCH_DURATION
            .with_label_values(&[&ctx.org_id.to_string()])
            .start_timer();
        let mut summary = BatchSummary::default();
        let mut failures = FailureCollector::new();

        let stored = self.storage.get::<SyncCursor>(ctx.org_id)?;
        let mut cursor_stored = stored.is_some();
        let (since, mut cursor) = match stored {
            Some(SyncCursor {
                since,
                cursor: Some(cursor),
                ..
            }) => {
                info!(org_id = %ctx.org_id, since = %since, "Resuming shipment sync");
                (since, Some(cursor))
            }
            _ => (Utc::now() - Duration::hours(i64::from(lookback_hours)), None),
        };

        for page_number in 0..self.options.max_pages_per_run {
            let page = match self
                .source
                .fetch_shipments(credentials, since, cursor.as_deref(), self.options.chunk_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(org_id = %ctx.org_id, page = page_number, error = %e, "Shipment fetch failed");
                    FETCH_FAILURES_TOTAL
                        .with_label_values(&[fetch_failure_kind(&e)])
                        .inc();
                    summary.errors += 1;
                    failures.record(e.to_string());
                    break;
                }
            };

            debug!(
                org_id = %ctx.org_id,
                page = page_number,
                shipments = page.shipments.len(),
                "Fetched shipment page"
            );

            for shipment in &page.shipments {
                match self.process_shipment(ctx, shipment) {
                    Ok(outcome) => {
                        outcome.count(&mut summary);
                        SHIPMENTS_TOTAL.with_label_values(&[outcome.label()]).inc();
                    }
                    Err(e) => {
                        warn!(
                            org_id = %ctx.org_id,
                            shipment_id = %shipment.id,
                            error = %e,
                            "Shipment failed"
                        );
                        SHIPMENTS_TOTAL.with_label_values(&["error"]).inc();
                        summary.errors += 1;
                        failures.record_item(&shipment.id, &e.to_string());
                    }
                }
            }

            match page.next_cursor {
                Some(next) => {
                    self.storage.put(&SyncCursor {
                        org_id: ctx.org_id,
                        since,
                        cursor: Some(next.clone()),
                        updated_at: Utc::now(),
                    })?;
                    cursor_stored = true;
                    cursor = Some(next);
                }
                None => {
                    if cursor_stored {
                        self.storage.delete::<SyncCursor>(ctx.org_id)?;
                    }
                    break;
                }
            }
        }

        timer.observe_duration();
        info!(
            org_id = %ctx.org_id,
            processed = summary.processed,
            quarantined = summary.quarantined,
            promoted = summary.promoted,
            skipped = summary.skipped,
            errors = summary.errors,
            "Shipment batch complete"
        );

        Ok(BatchReport {
            report: failures.render_report(&summary),
            summary,
        })
    }

    /// Reconcile one shipment
    pub fn process_shipment(
        &self,
        ctx: &OrgContext,
        shipment: &ExternalShipment,
    ) -> Result<ShipmentOutcome> {
        let Some((hcr, trip)) = shipment.route() else {
            debug!(shipment_id = %shipment.id, "Shipment has no HCR/trip, skipped");
            return Ok(ShipmentOutcome::Skipped);
        };
        let input = shipment.to_new_load()?;

        let Some(existing) = self.storage.load_by_external_id(ctx.org_id, &shipment.id)? else {
            return self.create(ctx, input);
        };

        // An earlier run stopped between writing the load and its invoice
        let Some(invoice) = self.storage.invoice_for_load(existing.id)? else {
            return self.create(ctx, input);
        };

        let mut promoted = false;
        if existing.load_type == LoadType::Unmapped {
            let lane_match = self.classifier.matcher().match_lane(
                ctx.org_id,
                hcr,
                trip,
                input.pickup_date,
            )?;
            if lane_match.lane().is_some() {
                promoted = self
                    .promoter
                    .promote_load(ctx, existing.id, &lane_match)?
                    .is_promoted();
            }
        } else if invoice.status == InvoiceStatus::MissingData {
            // Load was promoted but its invoice step did not commit
            promoted = self.promoter.try_promote(ctx, existing.id)?.is_promoted();
        }

        let unchanged = input.external_updated_at.is_some()
            && input.external_updated_at == existing.external_updated_at;
        if unchanged && !promoted {
            return Ok(ShipmentOutcome::Skipped);
        }

        if !unchanged {
            self.classifier.refresh_load(ctx, existing.id, &input)?;
        }
        let results = self.recalculator.recalculate_load(ctx, existing.id)?;
        debug!(load_id = %existing.id, results = results.len(), "Pay recalculated");

        Ok(if promoted {
            ShipmentOutcome::Promoted
        } else {
            ShipmentOutcome::Updated
        })
    }

    fn create(&self, ctx: &OrgContext, input: NewLoad) -> Result<ShipmentOutcome> {
        let created = self.classifier.create_load(ctx, input)?;
        Ok(if created.load.load_type == LoadType::Unmapped {
            ShipmentOutcome::Quarantined
        } else {
            ShipmentOutcome::Created
        })
    }
}

fn fetch_failure_kind(error: &Error) -> &'static str {
    match error {
        Error::Unauthorized { .. } => "auth",
        Error::RateLimited { .. } => "rate_limit",
        Error::Timeout(_) => "timeout",
        Error::Parse(_) => "parse",
        Error::Source { .. } | Error::Http(_) => "source",
        _ => "other",
    }
}
