//! Periodic reconciliation and stats repair

use crate::{
    config::FeedConfig,
    reconcile::{BatchReport, ShipmentReconciler},
};
use freight_core::{stats::DriftReport, OrgContext, StoredStats};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs every feed on the poll interval and repairs counters on a slower one
pub struct ReconcileScheduler {
    reconciler: ShipmentReconciler,
    stats: Arc<StoredStats>,
    feeds: Vec<FeedConfig>,
    lookback_hours: u32,
    poll_interval: Duration,
    repair_interval: Duration,
}

impl ReconcileScheduler {
    /// Create scheduler
    pub fn new(
        reconciler: ShipmentReconciler,
        stats: Arc<StoredStats>,
        feeds: Vec<FeedConfig>,
        lookback_hours: u32,
        poll_interval: Duration,
        repair_interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            stats,
            feeds,
            lookback_hours,
            poll_interval,
            repair_interval,
        }
    }

    /// Loop until `shutdown` resolves. Both jobs fire once immediately.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut repair = tokio::time::interval(self.repair_interval);
        repair.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            feeds = self.feeds.len(),
            poll_secs = self.poll_interval.as_secs(),
            repair_secs = self.repair_interval.as_secs(),
            "Reconcile scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Reconcile scheduler stopping");
                    break;
                }
                _ = poll.tick() => {
                    self.run_feeds_once().await;
                }
                _ = repair.tick() => {
                    self.repair_once();
                }
            }
        }
    }

    /// Run one batch per feed
    pub async fn run_feeds_once(&self) -> Vec<(Uuid, BatchReport)> {
        let mut reports = Vec::with_capacity(self.feeds.len());
        for feed in &self.feeds {
            let ctx = OrgContext::system(feed.org_id);
            match self
                .reconciler
                .process_shipment_batch(&ctx, &feed.credentials, self.lookback_hours)
                .await
            {
                Ok(report) => {
                    if report.summary.errors > 0 {
                        warn!(org_id = %feed.org_id, "Batch finished with errors\n{}", report.report);
                    }
                    reports.push((feed.org_id, report));
                }
                Err(e) => {
                    error!(org_id = %feed.org_id, error = %e, "Batch aborted");
                }
            }
        }
        reports
    }

    /// Recompute status counters of every configured org
    pub fn repair_once(&self) -> Vec<DriftReport> {
        let orgs: BTreeSet<Uuid> = self.feeds.iter().map(|feed| feed.org_id).collect();
        let mut reports = Vec::with_capacity(orgs.len());
        for org_id in orgs {
            match self.stats.repair(org_id) {
                Ok(report) => reports.push(report),
                Err(e) => error!(org_id = %org_id, error = %e, "Stats repair failed"),
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        reconcile::BatchOptions,
        source::ShipmentSource,
        types::{Credentials, ShipmentPage},
        Result,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use freight_core::{audit::MemoryAuditSink, LoadStatus, StatsAggregate, Storage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ShipmentSource for CountingSource {
        async fn fetch_shipments(
            &self,
            _credentials: &Credentials,
            _since: DateTime<Utc>,
            _cursor: Option<&str>,
            _limit: usize,
        ) -> Result<ShipmentPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ShipmentPage::default())
        }
    }

    fn scheduler(source: Arc<CountingSource>, orgs: &[Uuid]) -> (ReconcileScheduler, Arc<StoredStats>) {
        let storage = Arc::new(Storage::in_memory());
        let stats = Arc::new(StoredStats::new(storage.clone()));
        let reconciler = ShipmentReconciler::new(
            storage,
            stats.clone(),
            Arc::new(MemoryAuditSink::new()),
            source,
            BatchOptions::default(),
        );
        let feeds = orgs
            .iter()
            .map(|org_id| FeedConfig {
                org_id: *org_id,
                credentials: Credentials {
                    base_url: "http://localhost".to_string(),
                    api_key: "k".to_string(),
                },
            })
            .collect();
        (
            ReconcileScheduler::new(
                reconciler,
                stats.clone(),
                feeds,
                24,
                Duration::from_secs(3600),
                Duration::from_secs(3600),
            ),
            stats,
        )
    }

    #[tokio::test]
    async fn test_run_feeds_once_covers_every_feed() {
        let source = Arc::new(CountingSource::default());
        let (scheduler, _) = scheduler(source.clone(), &[Uuid::now_v7(), Uuid::now_v7()]);

        let reports = scheduler.run_feeds_once().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repair_once_fixes_phantom_counts() {
        let org_id = Uuid::now_v7();
        let (scheduler, stats) = scheduler(Arc::new(CountingSource::default()), &[org_id, org_id]);
        stats.update_load_count(org_id, None, LoadStatus::Delivered);

        let reports = scheduler.repair_once();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].has_drift());
        assert!(!scheduler.repair_once()[0].has_drift());
    }

    #[tokio::test]
    async fn test_run_ticks_then_stops() {
        let source = Arc::new(CountingSource::default());
        let (scheduler, _) = scheduler(source.clone(), &[Uuid::now_v7()]);

        scheduler
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
