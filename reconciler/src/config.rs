//! Reconcile worker configuration
//!
//! ```toml
//! lookback_hours = 24
//! chunk_size = 100
//! max_pages_per_run = 10
//! poll_interval_secs = 300
//! repair_interval_secs = 3600
//! request_timeout_secs = 30
//!
//! [core.storage]
//! backend = "rocksdb"
//! data_dir = "/var/lib/freight"
//!
//! [[feeds]]
//! org_id = "0191c6a2-7a3e-7c1b-9d2e-5a4b3c2d1e0f"
//! base_url = "https://tms.example.com/api"
//! api_key = "..."
//! ```

use crate::{reconcile::BatchOptions, types::Credentials, Error, Result};
use freight_core::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// One org's shipment feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Organization the shipments belong to
    pub org_id: Uuid,
    /// Feed endpoint and key
    #[serde(flatten)]
    pub credentials: Credentials,
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Core (storage) configuration
    pub core: Config,
    /// Window pulled on a fresh sync
    pub lookback_hours: u32,
    /// Shipments per page
    pub chunk_size: usize,
    /// Pages per invocation
    pub max_pages_per_run: usize,
    /// Seconds between batch runs
    pub poll_interval_secs: u64,
    /// Seconds between stats repair passes
    pub repair_interval_secs: u64,
    /// HTTP request timeout
    pub request_timeout_secs: u64,
    /// Feeds to reconcile
    pub feeds: Vec<FeedConfig>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        let batch = BatchOptions::default();
        Self {
            core: Config::default(),
            lookback_hours: 24,
            chunk_size: batch.chunk_size,
            max_pages_per_run: batch.max_pages_per_run,
            poll_interval_secs: 300,
            repair_interval_secs: 3600,
            request_timeout_secs: 30,
            feeds: Vec::new(),
        }
    }
}

impl ReconcileConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `FREIGHT_*` environment variables.
    ///
    /// A single feed is configured through `FREIGHT_FEED_ORG_ID`,
    /// `FREIGHT_FEED_BASE_URL` and `FREIGHT_FEED_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let mut config = ReconcileConfig {
            core: Config::from_env()?,
            ..Default::default()
        };

        if let Some(hours) = env_parse("FREIGHT_LOOKBACK_HOURS")? {
            config.lookback_hours = hours;
        }
        if let Some(size) = env_parse("FREIGHT_CHUNK_SIZE")? {
            config.chunk_size = size;
        }
        if let Some(pages) = env_parse("FREIGHT_MAX_PAGES_PER_RUN")? {
            config.max_pages_per_run = pages;
        }
        if let Some(secs) = env_parse("FREIGHT_POLL_INTERVAL_SECS")? {
            config.poll_interval_secs = secs;
        }
        if let Some(secs) = env_parse("FREIGHT_REPAIR_INTERVAL_SECS")? {
            config.repair_interval_secs = secs;
        }
        if let Some(secs) = env_parse("FREIGHT_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = secs;
        }

        if let Some(org_id) = env_parse::<Uuid>("FREIGHT_FEED_ORG_ID")? {
            let base_url = std::env::var("FREIGHT_FEED_BASE_URL")
                .map_err(|_| Error::Config("FREIGHT_FEED_BASE_URL is not set".to_string()))?;
            let api_key = std::env::var("FREIGHT_FEED_API_KEY")
                .map_err(|_| Error::Config("FREIGHT_FEED_API_KEY is not set".to_string()))?;
            config.feeds.push(FeedConfig {
                org_id,
                credentials: Credentials { base_url, api_key },
            });
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.lookback_hours == 0 {
            return Err(Error::Config("lookback_hours must be positive".to_string()));
        }
        if self.chunk_size == 0 || self.max_pages_per_run == 0 {
            return Err(Error::Config(
                "chunk_size and max_pages_per_run must be positive".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 || self.repair_interval_secs == 0 {
            return Err(Error::Config("intervals must be positive".to_string()));
        }
        Ok(())
    }

    /// Paging limits
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            chunk_size: self.chunk_size,
            max_pages_per_run: self.max_pages_per_run,
        }
    }

    /// Poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Repair interval
    pub fn repair_interval(&self) -> Duration {
        Duration::from_secs(self.repair_interval_secs)
    }

    /// Request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}
