//! Reconcile worker
//!
//! Configuration comes from the TOML file named by `FREIGHT_CONFIG`, or from
//! `FREIGHT_*` environment variables when unset. `FREIGHT_LOG_FORMAT=json`
//! switches log output to JSON lines.

use anyhow::Context;
use freight_core::{audit::ChannelAuditSink, audit::TracingAuditSink, Storage, StoredStats};
use reconciler::{HttpShipmentSource, ReconcileConfig, ReconcileScheduler, ShipmentReconciler};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match std::env::var("FREIGHT_CONFIG") {
        Ok(path) => ReconcileConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => ReconcileConfig::from_env().context("loading configuration from environment")?,
    };

    info!(
        service = %config.core.service_name,
        version = %config.core.service_version,
        feeds = config.feeds.len(),
        "Reconcile worker starting"
    );
    if config.feeds.is_empty() {
        tracing::warn!("No feeds configured; only stats repair will run");
    }

    let storage = Arc::new(Storage::open(&config.core.storage).context("opening document store")?);
    let stats = Arc::new(StoredStats::new(storage.clone()));
    let (audit, audit_task) = ChannelAuditSink::spawn(Arc::new(TracingAuditSink));
    let source = Arc::new(HttpShipmentSource::new(config.request_timeout())?);

    let reconciler = ShipmentReconciler::new(
        storage,
        stats.clone(),
        Arc::new(audit),
        source,
        config.batch_options(),
    );
    let scheduler = ReconcileScheduler::new(
        reconciler,
        stats,
        config.feeds.clone(),
        config.lookback_hours,
        config.poll_interval(),
        config.repair_interval(),
    );

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await;

    // Scheduler dropped: every audit sender is gone, let the mailbox drain
    audit_task.await.context("draining audit mailbox")?;
    info!("Reconcile worker stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("FREIGHT_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
