//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `freight_storage_reads_total{collection}` - Document reads and scans
//! - `freight_storage_writes_total{collection}` - Document writes and deletes
//!
//! Collectors live in a per-store [`Registry`] so several stores (tests, the
//! worker) can coexist in one process.

use crate::storage::Collection;
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Storage metrics
#[derive(Clone)]
pub struct StorageMetrics {
    /// Reads per collection
    pub reads_total: IntCounterVec,

    /// Writes per collection
    pub writes_total: IntCounterVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl StorageMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let reads_total = IntCounterVec::new(
            Opts::new("freight_storage_reads_total", "Document reads and scans"),
            &["collection"],
        )
        .expect("static metric definition");
        let writes_total = IntCounterVec::new(
            Opts::new("freight_storage_writes_total", "Document writes and deletes"),
            &["collection"],
        )
        .expect("static metric definition");

        // Fresh registry: registration only fails on duplicate names
        let _ = registry.register(Box::new(reads_total.clone()));
        let _ = registry.register(Box::new(writes_total.clone()));

        Self {
            reads_total,
            writes_total,
            registry,
        }
    }

    /// Record a read
    pub fn record_read(&self, collection: Collection) {
        self.reads_total.with_label_values(&[collection.name()]).inc();
    }

    /// Record a write
    pub fn record_write(&self, collection: Collection) {
        self.writes_total.with_label_values(&[collection.name()]).inc();
    }

    /// Writes recorded for a collection
    pub fn writes(&self, collection: Collection) -> u64 {
        self.writes_total.with_label_values(&[collection.name()]).get()
    }

    /// Total writes across collections
    pub fn total_writes(&self) -> u64 {
        Collection::ALL.iter().map(|c| self.writes(*c)).sum()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for StorageMetrics {
    fn default() -> Self {
        Self::new()
    }
}
