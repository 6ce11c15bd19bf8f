//! Per-organization status counters
//!
//! Counters are maintained incrementally by every status-changing mutation.
//! Incremental updates can drift when a workflow fails between steps, so the
//! counters are never treated as authoritative: [`StoredStats::repair`]
//! recomputes them from the source documents and logs any drift it corrects.

use crate::{
    storage::Storage,
    types::{Invoice, InvoiceStatus, Load, LoadStatus, OrgStats},
    Result,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Incremental counter updates
pub trait StatsAggregate: Send + Sync {
    /// Move one load from `old` (none for a new load) to `new`
    fn update_load_count(&self, org_id: Uuid, old: Option<LoadStatus>, new: LoadStatus);

    /// Move one invoice from `old` (none for a new invoice) to `new`
    fn update_invoice_count(&self, org_id: Uuid, old: Option<InvoiceStatus>, new: InvoiceStatus);
}

/// One corrected counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDrift {
    /// Counter label
    pub counter: String,
    /// Value before repair
    pub stored: i64,
    /// Value recomputed from source
    pub actual: i64,
}

/// Outcome of a repair pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Organization
    pub org_id: Uuid,
    /// Counters that disagreed with source data
    pub drift: Vec<CounterDrift>,
}

impl DriftReport {
    /// Any counter was wrong
    pub fn has_drift(&self) -> bool {
        !self.drift.is_empty()
    }
}

/// Counters persisted as [`OrgStats`] documents
#[derive(Debug, Clone)]
pub struct StoredStats {
    storage: Arc<Storage>,
}

impl StoredStats {
    /// Create over a store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Current counters for an org
    pub fn get(&self, org_id: Uuid) -> Result<OrgStats> {
        Ok(self
            .storage
            .get::<OrgStats>(org_id)?
            .unwrap_or_else(|| OrgStats::new(org_id)))
    }

    /// Recompute counters from loads and invoices, correcting drift
    pub fn repair(&self, org_id: Uuid) -> Result<DriftReport> {
        let mut load_counts: BTreeMap<LoadStatus, i64> = BTreeMap::new();
        for load in self.storage.scan(|load: &Load| load.org_id == org_id)? {
            *load_counts.entry(load.status).or_insert(0) += 1;
        }

        let mut invoice_counts: BTreeMap<InvoiceStatus, i64> = BTreeMap::new();
        for invoice in self.storage.scan(|invoice: &Invoice| invoice.org_id == org_id)? {
            *invoice_counts.entry(invoice.status).or_insert(0) += 1;
        }

        let stored = self.get(org_id)?;
        let mut drift = Vec::new();

        for status in LoadStatus::ALL {
            let was = stored.load_counts.get(&status).copied().unwrap_or(0);
            let actual = load_counts.get(&status).copied().unwrap_or(0);
            if was != actual {
                drift.push(CounterDrift {
                    counter: format!("loads.{:?}", status),
                    stored: was,
                    actual,
                });
            }
        }
        for status in InvoiceStatus::ALL {
            let was = stored.invoice_counts.get(&status).copied().unwrap_or(0);
            let actual = invoice_counts.get(&status).copied().unwrap_or(0);
            if was != actual {
                drift.push(CounterDrift {
                    counter: format!("invoices.{}", status),
                    stored: was,
                    actual,
                });
            }
        }

        for d in &drift {
            tracing::warn!(
                org_id = %org_id,
                counter = %d.counter,
                stored = d.stored,
                actual = d.actual,
                "Stats drift corrected"
            );
        }

        self.storage.upsert(
            org_id,
            || OrgStats::new(org_id),
            |stats: &mut OrgStats| {
                stats.load_counts = load_counts;
                stats.invoice_counts = invoice_counts;
                stats.last_repaired_at = Some(Utc::now());
            },
        )?;

        Ok(DriftReport { org_id, drift })
    }

    fn bump<F>(&self, org_id: Uuid, f: F)
    where
        F: FnOnce(&mut OrgStats),
    {
        // Counter failures must not fail the mutation; repair fixes the drift
        if let Err(e) = self.storage.upsert(org_id, || OrgStats::new(org_id), f) {
            tracing::warn!(org_id = %org_id, "Failed to update stats counter: {}", e);
        }
    }
}

impl StatsAggregate for StoredStats {
    fn update_load_count(&self, org_id: Uuid, old: Option<LoadStatus>, new: LoadStatus) {
        if old == Some(new) {
            return;
        }
        self.bump(org_id, |stats| {
            if let Some(old) = old {
                *stats.load_counts.entry(old).or_insert(0) -= 1;
            }
            *stats.load_counts.entry(new).or_insert(0) += 1;
        });
    }

    fn update_invoice_count(&self, org_id: Uuid, old: Option<InvoiceStatus>, new: InvoiceStatus) {
        if old == Some(new) {
            return;
        }
        self.bump(org_id, |stats| {
            if let Some(old) = old {
                *stats.invoice_counts.entry(old).or_insert(0) -= 1;
            }
            *stats.invoice_counts.entry(new).or_insert(0) += 1;
        });
    }
}
