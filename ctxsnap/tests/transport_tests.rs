use std::time::Duration;

use ctxsnap::report::{assemble_report, generate_report_id};
use ctxsnap::{
    CapturedAppState, ContextReport, ContextScreenshot, DeliveryMethod, DeliveryTransport,
    ElementSnapshot, Page, SnapshotConfig,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(endpoint: &str) -> SnapshotConfig {
    SnapshotConfig {
        endpoint: endpoint.to_string(),
        health_timeout_ms: 300,
        report_timeout_ms: 1000,
        ..Default::default()
    }
}

fn sample_report() -> ContextReport {
    assemble_report(
        &Page::new("http://localhost:3000/checkout").with_viewport(1440, 900),
        generate_report_id(),
        ElementSnapshot {
            tag_name: "button".to_string(),
            selector: "#save-btn".to_string(),
            ..Default::default()
        },
        Vec::new(),
        CapturedAppState::default(),
        Some("Save does nothing".to_string()),
        None,
    )
}

async fn healthy(server: &MockServer, probes: u64) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(probes)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_reachable_endpoint_uses_remote_path() {
    let server = MockServer::start().await;
    healthy(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/report"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "r", "filename": "1700000000000_r.json"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let transport = DeliveryTransport::new(&config_for(&server.uri())).unwrap();
    let report = sample_report();

    let first = transport.send_report(&report).await;
    assert_eq!(first.method, DeliveryMethod::Remote);
    assert!(first.success);
    assert_eq!(first.filename.as_deref(), Some("1700000000000_r.json"));

    // second send within the TTL reuses the cached probe
    let second = transport.send_report(&report).await;
    assert_eq!(second.method, DeliveryMethod::Remote);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_probed_once_within_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let transport = DeliveryTransport::new(&config_for(&server.uri())).unwrap();
    let report = sample_report();

    for _ in 0..2 {
        let result = transport.send_report(&report).await;
        assert_eq!(result.method, DeliveryMethod::Console);
        assert!(result.success);
        assert_eq!(result.filename, None);
    }
}

#[tokio::test]
async fn test_closed_port_falls_back_to_console() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let transport = DeliveryTransport::new(&config_for(&uri)).unwrap();
    let result = transport.send_report(&sample_report()).await;
    assert_eq!(result.method, DeliveryMethod::Console);
    assert!(result.success);
}

#[tokio::test]
async fn test_slow_health_check_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
        .mount(&server)
        .await;

    let transport = DeliveryTransport::new(&config_for(&server.uri())).unwrap();
    assert!(!transport.is_available().await);
}

#[tokio::test]
async fn test_rejected_report_falls_back_without_retry() {
    let server = MockServer::start().await;
    healthy(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/report"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "disk full"})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = DeliveryTransport::new(&config_for(&server.uri())).unwrap();
    let report = sample_report();

    let first = transport.send_report(&report).await;
    assert_eq!(first.method, DeliveryMethod::Console);
    assert!(first.success);

    // the failure marked the endpoint unavailable, so nothing is re-sent
    let second = transport.send_report(&report).await;
    assert_eq!(second.method, DeliveryMethod::Console);
}

#[tokio::test]
async fn test_clearing_cache_forces_new_probe() {
    let server = MockServer::start().await;
    healthy(&server, 2).await;

    let transport = DeliveryTransport::new(&config_for(&server.uri())).unwrap();
    assert!(transport.is_available().await);
    assert!(transport.is_available().await);
    transport.clear_availability_cache();
    assert!(transport.is_available().await);
}

#[tokio::test]
async fn test_cached_result_expires() {
    let server = MockServer::start().await;
    healthy(&server, 2).await;

    let config = SnapshotConfig {
        availability_ttl_ms: 50,
        ..config_for(&server.uri())
    };
    let transport = DeliveryTransport::new(&config).unwrap();
    assert!(transport.is_available().await);
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(transport.is_available().await);
}

#[tokio::test]
async fn test_screenshot_delivery() {
    let server = MockServer::start().await;
    healthy(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/screenshot"))
        .and(body_partial_json(json!({"reportId": "ctx_1_abcdef01"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"filename": "ctx_1_abcdef01.png"})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = DeliveryTransport::new(&config_for(&server.uri())).unwrap();
    let result = transport
        .send_screenshot(&ContextScreenshot {
            report_id: "ctx_1_abcdef01".to_string(),
            data: "data:image/png;base64,iVBORw0KGgo=".to_string(),
        })
        .await;
    assert_eq!(result.method, DeliveryMethod::Remote);
    assert_eq!(result.filename.as_deref(), Some("ctx_1_abcdef01.png"));
}

#[tokio::test]
async fn test_force_local_skips_endpoint() {
    let server = MockServer::start().await;
    healthy(&server, 0).await;

    let config = SnapshotConfig {
        force_local: true,
        ..config_for(&server.uri())
    };
    let transport = DeliveryTransport::new(&config).unwrap();
    let result = transport.send_report(&sample_report()).await;
    assert_eq!(result.method, DeliveryMethod::Console);
}
