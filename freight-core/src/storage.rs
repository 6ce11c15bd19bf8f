//! Document storage
//!
//! Typed documents are bincode-encoded and keyed by UUID bytes inside a
//! [`Collection`]. The byte-level [`Backend`] is either the in-process
//! [`MemoryBackend`] or RocksDB (`rocksdb` feature, one column family per
//! collection).
//!
//! # Atomicity
//!
//! Each single-document write and read-modify-write ([`Storage::update`],
//! [`Storage::update_if`], [`Storage::upsert`]) commits atomically. There are
//! no cross-document transactions: workflows touching several documents are
//! sequences of independent steps and must re-read before acting.

use crate::{
    config::{StorageBackend, StorageConfig},
    error::{Error, Result},
    metrics::StorageMetrics,
    types::*,
};
use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Document collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Rate profiles
    RateProfiles,
    /// Rate rules
    RateRules,
    /// Profile assignments
    ProfileAssignments,
    /// Carrier partnerships
    CarrierPartnerships,
    /// Contract lanes
    ContractLanes,
    /// Loads
    Loads,
    /// Stops
    Stops,
    /// Dispatch legs
    DispatchLegs,
    /// Payable lines
    LoadPayables,
    /// Invoices
    Invoices,
    /// Stored invoice line items
    InvoiceLineItems,
    /// Per-org counters (keyed by org ID)
    OrgStats,
    /// Reconciliation cursors (keyed by org ID)
    SyncCursors,
}

impl Collection {
    /// Every collection
    pub const ALL: [Collection; 13] = [
        Collection::RateProfiles,
        Collection::RateRules,
        Collection::ProfileAssignments,
        Collection::CarrierPartnerships,
        Collection::ContractLanes,
        Collection::Loads,
        Collection::Stops,
        Collection::DispatchLegs,
        Collection::LoadPayables,
        Collection::Invoices,
        Collection::InvoiceLineItems,
        Collection::OrgStats,
        Collection::SyncCursors,
    ];

    /// Column family / metric label
    pub fn name(&self) -> &'static str {
        match self {
            Collection::RateProfiles => "rate_profiles",
            Collection::RateRules => "rate_rules",
            Collection::ProfileAssignments => "profile_assignments",
            Collection::CarrierPartnerships => "carrier_partnerships",
            Collection::ContractLanes => "contract_lanes",
            Collection::Loads => "loads",
            Collection::Stops => "stops",
            Collection::DispatchLegs => "dispatch_legs",
            Collection::LoadPayables => "load_payables",
            Collection::Invoices => "invoices",
            Collection::InvoiceLineItems => "invoice_line_items",
            Collection::OrgStats => "org_stats",
            Collection::SyncCursors => "sync_cursors",
        }
    }
}

/// A storable document
pub trait Document: Serialize + DeserializeOwned {
    /// Collection the document lives in
    const COLLECTION: Collection;

    /// Entity name used in errors and logs
    const ENTITY: &'static str;

    /// Document key
    fn key(&self) -> Uuid;
}

macro_rules! impl_document {
    ($ty:ty, $collection:expr, $entity:literal, $field:ident) => {
        impl Document for $ty {
            const COLLECTION: Collection = $collection;
            const ENTITY: &'static str = $entity;

            fn key(&self) -> Uuid {
                self.$field
            }
        }
    };
}

impl_document!(RateProfile, Collection::RateProfiles, "RateProfile", id);
impl_document!(RateRule, Collection::RateRules, "RateRule", id);
impl_document!(ProfileAssignment, Collection::ProfileAssignments, "ProfileAssignment", id);
impl_document!(CarrierPartnership, Collection::CarrierPartnerships, "CarrierPartnership", id);
impl_document!(ContractLane, Collection::ContractLanes, "ContractLane", id);
impl_document!(Load, Collection::Loads, "Load", id);
impl_document!(Stop, Collection::Stops, "Stop", id);
impl_document!(DispatchLeg, Collection::DispatchLegs, "DispatchLeg", id);
impl_document!(LoadPayable, Collection::LoadPayables, "LoadPayable", id);
impl_document!(Invoice, Collection::Invoices, "Invoice", id);
impl_document!(InvoiceLineItem, Collection::InvoiceLineItems, "InvoiceLineItem", id);
impl_document!(OrgStats, Collection::OrgStats, "OrgStats", org_id);
impl_document!(SyncCursor, Collection::SyncCursors, "SyncCursor", org_id);

/// Raw key-value backend
///
/// Keys within a collection iterate in byte order. UUIDv7 keys therefore
/// iterate in creation order.
pub trait Backend: Send + Sync {
    /// Read a value
    fn get(&self, collection: Collection, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Write a value
    fn put(&self, collection: Collection, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a value, returning whether it existed
    fn delete(&self, collection: Collection, key: &[u8]) -> Result<bool>;

    /// Every entry of a collection in key order
    fn scan(&self, collection: Collection) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// In-process backend
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<Collection, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, collection: Collection, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .collections
            .read()
            .get(&collection)
            .and_then(|entries| entries.get(key).cloned()))
    }

    fn put(&self, collection: Collection, key: &[u8], value: &[u8]) -> Result<()> {
        self.collections
            .write()
            .entry(collection)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, collection: Collection, key: &[u8]) -> Result<bool> {
        Ok(self
            .collections
            .write()
            .get_mut(&collection)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false))
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .collections
            .read()
            .get(&collection)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Typed document store
pub struct Storage {
    backend: Arc<dyn Backend>,
    /// Serializes writers so read-modify-write is atomic per document
    write_lock: Mutex<()>,
    metrics: StorageMetrics,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    /// Open the backend named by `config`
    pub fn open(config: &StorageConfig) -> Result<Self> {
        match config.backend {
            StorageBackend::Memory => {
                tracing::info!("Opened in-memory document store");
                Ok(Self::in_memory())
            }
            #[cfg(feature = "rocksdb")]
            StorageBackend::RocksDb => {
                let backend = crate::rocks::RocksBackend::open(&config.data_dir)?;
                Ok(Self::with_backend(Arc::new(backend)))
            }
            #[cfg(not(feature = "rocksdb"))]
            StorageBackend::RocksDb => Err(Error::Config(
                "RocksDB backend requested but freight-core was built without the `rocksdb` feature"
                    .to_string(),
            )),
        }
    }

    /// Fresh in-memory store
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    /// Store over an explicit backend
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
            metrics: StorageMetrics::new(),
        }
    }

    /// Storage metrics
    pub fn metrics(&self) -> &StorageMetrics {
        &self.metrics
    }

    /// Get document by key
    pub fn get<D: Document>(&self, id: Uuid) -> Result<Option<D>> {
        self.metrics.record_read(D::COLLECTION);
        match self.backend.get(D::COLLECTION, id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get document by key, failing when absent
    pub fn fetch<D: Document>(&self, id: Uuid) -> Result<D> {
        self.get(id)?.ok_or(Error::NotFound {
            entity: D::ENTITY,
            id,
        })
    }

    /// Insert or overwrite a document
    pub fn put<D: Document>(&self, doc: &D) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write(doc)
    }

    /// Delete a document, returning whether it existed
    pub fn delete<D: Document>(&self, id: Uuid) -> Result<bool> {
        let _guard = self.write_lock.lock();
        self.metrics.record_write(D::COLLECTION);
        self.backend.delete(D::COLLECTION, id.as_bytes())
    }

    /// Atomically read, modify and write one document
    pub fn update<D, F>(&self, id: Uuid, f: F) -> Result<D>
    where
        D: Document,
        F: FnOnce(&mut D),
    {
        let _guard = self.write_lock.lock();
        let mut doc: D = self.fetch(id)?;
        f(&mut doc);
        self.write(&doc)?;
        Ok(doc)
    }

    /// Guarded read-modify-write.
    ///
    /// `f` sees the freshly read document and returns whether to write it.
    /// Returns the written document, or `None` when the guard declined.
    pub fn update_if<D, F>(&self, id: Uuid, f: F) -> Result<Option<D>>
    where
        D: Document,
        F: FnOnce(&mut D) -> bool,
    {
        let _guard = self.write_lock.lock();
        let mut doc: D = self.fetch(id)?;
        if !f(&mut doc) {
            return Ok(None);
        }
        self.write(&doc)?;
        Ok(Some(doc))
    }

    /// Read-modify-write, creating the document from `init` when absent
    pub fn upsert<D, I, F>(&self, id: Uuid, init: I, f: F) -> Result<D>
    where
        D: Document,
        I: FnOnce() -> D,
        F: FnOnce(&mut D),
    {
        let _guard = self.write_lock.lock();
        let mut doc: D = self.get(id)?.unwrap_or_else(init);
        f(&mut doc);
        self.write(&doc)?;
        Ok(doc)
    }

    /// All documents of a collection matching `filter`, in key order
    pub fn scan<D, F>(&self, mut filter: F) -> Result<Vec<D>>
    where
        D: Document,
        F: FnMut(&D) -> bool,
    {
        self.metrics.record_read(D::COLLECTION);
        let mut docs = Vec::new();
        for (_, bytes) in self.backend.scan(D::COLLECTION)? {
            let doc: D = bincode::deserialize(&bytes)?;
            if filter(&doc) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Delete every document matching `filter`, returning how many were removed
    pub fn delete_where<D, F>(&self, filter: F) -> Result<usize>
    where
        D: Document,
        F: FnMut(&D) -> bool,
    {
        let doomed = self.scan::<D, F>(filter)?;
        let _guard = self.write_lock.lock();
        let mut removed = 0;
        for doc in doomed {
            self.metrics.record_write(D::COLLECTION);
            if self.backend.delete(D::COLLECTION, doc.key().as_bytes())? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn write<D: Document>(&self, doc: &D) -> Result<()> {
        let value = bincode::serialize(doc)?;
        self.backend.put(D::COLLECTION, doc.key().as_bytes(), &value)?;
        self.metrics.record_write(D::COLLECTION);

        tracing::trace!(
            collection = D::COLLECTION.name(),
            key = %doc.key(),
            "Document written"
        );

        Ok(())
    }

    // Common lookups

    /// Loads of an org matching `filter`
    pub fn loads_where<F>(&self, org_id: Uuid, mut filter: F) -> Result<Vec<Load>>
    where
        F: FnMut(&Load) -> bool,
    {
        self.scan(|load: &Load| load.org_id == org_id && filter(load))
    }

    /// Load by external shipment ID
    pub fn load_by_external_id(&self, org_id: Uuid, external_id: &str) -> Result<Option<Load>> {
        Ok(self
            .loads_where(org_id, |load| load.external_id.as_deref() == Some(external_id))?
            .into_iter()
            .next())
    }

    /// Stops of a load ordered by sequence
    pub fn stops_for_load(&self, load_id: Uuid) -> Result<Vec<Stop>> {
        let mut stops = self.scan(|stop: &Stop| stop.load_id == load_id)?;
        stops.sort_by_key(|stop| stop.sequence);
        Ok(stops)
    }

    /// Stops covered by a leg, ordered by sequence
    pub fn stops_for_leg(&self, leg: &DispatchLeg) -> Result<Vec<Stop>> {
        let mut stops = self.stops_for_load(leg.load_id)?;
        stops.retain(|stop| leg.covers_stop(stop.sequence));
        Ok(stops)
    }

    /// Legs of a load ordered by sequence
    pub fn legs_for_load(&self, load_id: Uuid) -> Result<Vec<DispatchLeg>> {
        let mut legs = self.scan(|leg: &DispatchLeg| leg.load_id == load_id)?;
        legs.sort_by_key(|leg| leg.sequence);
        Ok(legs)
    }

    /// Invoice of a load
    pub fn invoice_for_load(&self, load_id: Uuid) -> Result<Option<Invoice>> {
        Ok(self
            .scan(|invoice: &Invoice| invoice.load_id == load_id)?
            .into_iter()
            .next())
    }

    /// Stored line items of an invoice
    pub fn line_items_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLineItem>> {
        self.scan(|item: &InvoiceLineItem| item.invoice_id == invoice_id)
    }

    /// Payable lines of a leg
    pub fn payables_for_leg(&self, leg_id: Uuid) -> Result<Vec<LoadPayable>> {
        self.scan(|line: &LoadPayable| line.leg_id == leg_id)
    }

    /// Assignments of a subject, oldest first
    pub fn assignments_for(&self, org_id: Uuid, subject: PaySubject) -> Result<Vec<ProfileAssignment>> {
        self.scan(|a: &ProfileAssignment| a.org_id == org_id && a.subject == subject)
    }

    /// Rules of a profile
    pub fn rules_for_profile(&self, profile_id: Uuid) -> Result<Vec<RateRule>> {
        self.scan(|rule: &RateRule| rule.profile_id == profile_id)
    }

    /// Active lanes of an org
    pub fn active_lanes(&self, org_id: Uuid) -> Result<Vec<ContractLane>> {
        self.scan(|lane: &ContractLane| lane.org_id == org_id && lane.is_active)
    }
}
