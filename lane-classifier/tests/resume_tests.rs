//! Multi-step workflows resuming after a write failed partway through

use freight_core::audit::MemoryAuditSink;
use freight_core::storage::{Backend, Collection, MemoryBackend};
use freight_core::{
    ContractLane, InvoiceStatus, LoadType, OrgContext, RateType, StopType, Storage, StoredStats,
};
use lane_classifier::{LoadClassifier, NewLoad, NewStop, Promoter, PromotionOutcome};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Fails writes to one collection once `allow` of them have gone through
struct WriteFault {
    collection: Collection,
    allow: usize,
}

#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    fault: Mutex<Option<WriteFault>>,
}

impl FlakyBackend {
    fn fail_after(&self, collection: Collection, allow: usize) {
        *self.fault.lock().unwrap() = Some(WriteFault { collection, allow });
    }

    fn heal(&self) {
        *self.fault.lock().unwrap() = None;
    }
}

impl Backend for FlakyBackend {
    fn get(&self, collection: Collection, key: &[u8]) -> freight_core::Result<Option<Vec<u8>>> {
        self.inner.get(collection, key)
    }

    fn put(&self, collection: Collection, key: &[u8], value: &[u8]) -> freight_core::Result<()> {
        if let Some(fault) = self.fault.lock().unwrap().as_mut() {
            if fault.collection == collection {
                if fault.allow == 0 {
                    return Err(freight_core::Error::Storage(format!(
                        "write to {} failed",
                        collection.name()
                    )));
                }
                fault.allow -= 1;
            }
        }
        self.inner.put(collection, key, value)
    }

    fn delete(&self, collection: Collection, key: &[u8]) -> freight_core::Result<bool> {
        self.inner.delete(collection, key)
    }

    fn scan(&self, collection: Collection) -> freight_core::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan(collection)
    }
}

struct Fixture {
    backend: Arc<FlakyBackend>,
    storage: Arc<Storage>,
    classifier: LoadClassifier,
    promoter: Promoter,
    ctx: OrgContext,
}

fn fixture() -> Fixture {
    let backend = Arc::new(FlakyBackend::default());
    let storage = Arc::new(Storage::with_backend(backend.clone()));
    let stats = Arc::new(StoredStats::new(storage.clone()));
    let audit = Arc::new(MemoryAuditSink::new());
    Fixture {
        classifier: LoadClassifier::new(storage.clone(), stats.clone(), audit.clone()),
        promoter: Promoter::new(storage.clone(), stats, audit),
        backend,
        storage,
        ctx: OrgContext::new(Uuid::now_v7(), Uuid::now_v7()),
    }
}

fn stop(sequence: u32, stop_type: StopType, location: &str) -> NewStop {
    NewStop {
        sequence,
        stop_type,
        location: location.to_string(),
        window_start: None,
        window_end: None,
        check_in_at: None,
        check_out_at: None,
        dwell_minutes: Decimal::ZERO,
    }
}

fn input(external_id: &str) -> NewLoad {
    let mut input = NewLoad::new(format!("L-{}", external_id));
    input.external_id = Some(external_id.to_string());
    input.parsed_hcr = Some("ABC123".to_string());
    input.parsed_trip_number = Some("7".to_string());
    input.effective_miles = Some(Decimal::from(120));
    input.stops = vec![
        stop(1, StopType::Pickup, "Depot"),
        stop(2, StopType::Delivery, "Plant"),
    ];
    input
}

#[test]
fn test_promotion_finishes_invoice_step_on_retry() {
    let f = fixture();
    let load = f.classifier.create_load(&f.ctx, input("s-1")).unwrap().load;
    assert_eq!(load.load_type, LoadType::Unmapped);

    let lane = ContractLane::new(f.ctx.org_id, "ABC123", "7", Decimal::new(250, 2), RateType::PerMile);
    f.storage.put(&lane).unwrap();

    f.backend.fail_after(Collection::Invoices, 0);
    assert!(f.promoter.try_promote(&f.ctx, load.id).is_err());

    // The load flipped; its invoice did not
    let flipped: freight_core::Load = f.storage.fetch(load.id).unwrap();
    assert_eq!(flipped.load_type, LoadType::Contract);
    let stuck = f.storage.invoice_for_load(load.id).unwrap().unwrap();
    assert_eq!(stuck.status, InvoiceStatus::MissingData);

    f.backend.heal();
    let retried = f.promoter.try_promote(&f.ctx, load.id).unwrap();
    assert_eq!(
        retried,
        PromotionOutcome::Promoted {
            load_type: LoadType::Contract,
            lane_id: lane.id
        }
    );

    let invoice = f.storage.invoice_for_load(load.id).unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.contract_lane_id, Some(lane.id));
    assert_eq!(invoice.total_amount, Decimal::new(30000, 2));

    let matched: ContractLane = f.storage.fetch(lane.id).unwrap();
    assert_eq!(matched.import_match_count, 1);
    assert!(matched.last_import_match_at.is_some());

    assert_eq!(
        f.promoter.try_promote(&f.ctx, load.id).unwrap(),
        PromotionOutcome::AlreadyClassified(LoadType::Contract)
    );
}

#[test]
fn test_promote_load_with_match_also_resumes() {
    let f = fixture();
    let load = f.classifier.create_load(&f.ctx, input("s-1")).unwrap().load;
    let lane = ContractLane::new(f.ctx.org_id, "ABC123", "*", Decimal::new(250, 2), RateType::PerMile);
    f.storage.put(&lane).unwrap();
    let lane_match = f
        .classifier
        .matcher()
        .match_lane(f.ctx.org_id, "ABC123", "7", None)
        .unwrap();

    f.backend.fail_after(Collection::Invoices, 0);
    assert!(f.promoter.promote_load(&f.ctx, load.id, &lane_match).is_err());
    f.backend.heal();

    let retried = f.promoter.promote_load(&f.ctx, load.id, &lane_match).unwrap();
    assert_eq!(
        retried,
        PromotionOutcome::Promoted {
            load_type: LoadType::Spot,
            lane_id: lane.id
        }
    );
    let invoice = f.storage.invoice_for_load(load.id).unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Draft);
}

#[test]
fn test_create_load_replaces_partial_stops_on_retry() {
    let f = fixture();

    f.backend.fail_after(Collection::Stops, 1);
    assert!(f.classifier.create_load(&f.ctx, input("s-1")).is_err());

    let load = f
        .storage
        .load_by_external_id(f.ctx.org_id, "s-1")
        .unwrap()
        .unwrap();
    assert_eq!(f.storage.stops_for_load(load.id).unwrap().len(), 1);

    f.backend.heal();
    let resumed = f.classifier.create_load(&f.ctx, input("s-1")).unwrap();
    assert!(!resumed.created);
    assert_eq!(resumed.load.id, load.id);

    let stops = f.storage.stops_for_load(load.id).unwrap();
    let shape: Vec<(u32, StopType, &str)> = stops
        .iter()
        .map(|s| (s.sequence, s.stop_type, s.location.as_str()))
        .collect();
    assert_eq!(
        shape,
        vec![(1, StopType::Pickup, "Depot"), (2, StopType::Delivery, "Plant")]
    );

    // Nothing left to resume: a further retry writes nothing
    let writes = f.storage.metrics().total_writes();
    f.classifier.create_load(&f.ctx, input("s-1")).unwrap();
    assert_eq!(f.storage.metrics().total_writes(), writes);
}
