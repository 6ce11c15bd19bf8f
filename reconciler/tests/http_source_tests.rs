use chrono::{TimeZone, Utc};
use freight_core::audit::MemoryAuditSink;
use freight_core::{ContractLane, LoadType, OrgContext, RateType, Storage, StoredStats};
use reconciler::{
    BatchOptions, Credentials, Error, HttpShipmentSource, ShipmentReconciler, ShipmentSource,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn credentials(server: &MockServer) -> Credentials {
    Credentials {
        base_url: format!("{}/api/", server.uri()),
        api_key: "feed-key-123".to_string(),
    }
}

fn source() -> HttpShipmentSource {
    HttpShipmentSource::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_fetch_sends_auth_and_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/shipments"))
        .and(header("authorization", "Bearer feed-key-123"))
        .and(query_param("updated_since", "2026-10-01T06:00:00Z"))
        .and(query_param("limit", "50"))
        .and(query_param("cursor", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "shipments": [{
                "id": "S-1",
                "hcr": "ABC123",
                "trip_number": "7",
                "miles": 88.5,
                "stops": [{ "type": "pickup", "location": "Depot" }]
            }],
            "next_cursor": "def"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let since = Utc.with_ymd_and_hms(2026, 10, 1, 6, 0, 0).unwrap();
    let page = source()
        .fetch_shipments(&credentials(&server), since, Some("abc"), 50)
        .await
        .unwrap();

    assert_eq!(page.shipments.len(), 1);
    assert_eq!(page.shipments[0].id, "S-1");
    assert_eq!(page.shipments[0].miles, Some(88.5));
    assert_eq!(page.next_cursor.as_deref(), Some("def"));
}

#[tokio::test]
async fn test_unauthorized_is_typed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/shipments"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = source()
        .fetch_shipments(&credentials(&server), Utc::now(), None, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { status: 401 }));
    assert!(err.is_source_failure());
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/shipments"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let err = source()
        .fetch_shipments(&credentials(&server), Utc::now(), None, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RateLimited { retry_after: Some(30) }));
}

#[tokio::test]
async fn test_server_error_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/shipments"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = source()
        .fetch_shipments(&credentials(&server), Utc::now(), None, 10)
        .await
        .unwrap_err();
    match err {
        Error::Source { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/shipments"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = source()
        .fetch_shipments(&credentials(&server), Utc::now(), None, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
}

#[tokio::test]
async fn test_batch_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/shipments"))
        .and(query_param("limit", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "shipments": [
                {
                    "id": "S-1",
                    "status": "dispatched",
                    "hcr": "ABC123",
                    "trip": "7",
                    "totalDistanceInMeters": 160934.4,
                    "updated_at": "2026-10-01T06:00:00Z",
                    "stops": [
                        { "type": "pickup", "location": "Depot" },
                        { "type": "delivery", "location": "Plant" }
                    ]
                },
                { "id": "S-2", "hcr": "ZZZ", "trip_number": "1" }
            ]
        })))
        .mount(&server)
        .await;

    let storage = Arc::new(Storage::in_memory());
    let ctx = OrgContext::system(Uuid::now_v7());
    storage
        .put(&ContractLane::new(
            ctx.org_id,
            "ABC123",
            "7",
            Decimal::new(200, 2),
            RateType::PerMile,
        ))
        .unwrap();
    let reconciler = ShipmentReconciler::new(
        storage.clone(),
        Arc::new(StoredStats::new(storage.clone())),
        Arc::new(MemoryAuditSink::new()),
        Arc::new(source()),
        BatchOptions {
            chunk_size: 25,
            max_pages_per_run: 5,
        },
    );

    let batch = reconciler
        .process_shipment_batch(&ctx, &credentials(&server), 24)
        .await
        .unwrap();
    assert_eq!(batch.summary.processed, 1);
    assert_eq!(batch.summary.quarantined, 1);
    assert_eq!(batch.summary.errors, 0);

    let load = storage
        .load_by_external_id(ctx.org_id, "S-1")
        .unwrap()
        .unwrap();
    assert_eq!(load.load_type, LoadType::Contract);
    assert_eq!(load.effective_miles, Some(Decimal::from(100)));
    assert_eq!(
        load.external_updated_at.as_deref(),
        Some("2026-10-01T06:00:00Z")
    );
}
