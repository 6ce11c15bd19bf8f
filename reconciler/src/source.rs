//! Shipment feed interface

use crate::{
    types::{Credentials, ShipmentPage},
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Source of shipments updated since a point in time
#[async_trait]
pub trait ShipmentSource: Send + Sync {
    /// Fetch one page of shipments updated at or after `since`
    async fn fetch_shipments(
        &self,
        credentials: &Credentials,
        since: DateTime<Utc>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ShipmentPage>;
}

/// HTTPS JSON feed: `GET {base_url}/shipments?updated_since=..&limit=..&cursor=..`
#[derive(Debug, Clone)]
pub struct HttpShipmentSource {
    client: Client,
    timeout: Duration,
}

impl HttpShipmentSource {
    /// Create source with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl ShipmentSource for HttpShipmentSource {
    async fn fetch_shipments(
        &self,
        credentials: &Credentials,
        since: DateTime<Utc>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ShipmentPage> {
        let url = format!("{}/shipments", credentials.base_url.trim_end_matches('/'));
        let mut query = vec![
            ("updated_since", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        debug!(url = %url, cursor = ?cursor, "Fetching shipments");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&credentials.api_key)
            .header(header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("no response within {}s", self.timeout.as_secs()))
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(Error::Unauthorized {
                    status: status.as_u16(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(Error::RateLimited { retry_after });
            }
            s if !s.is_success() => {
                let message = response.text().await.unwrap_or_default();
                return Err(Error::Source {
                    status: s.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::Parse(format!("shipment page from {}: {}", url, e)))
    }
}
