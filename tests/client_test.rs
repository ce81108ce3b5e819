//! Forward API client tests against a mock HTTP server.
//!
//! Run with: cargo test --test client_test

use forward_db::forward::client::ForwardClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ForwardClient {
    ForwardClient::new(&server.uri(), Some("token-1"), true, None, None)
        .expect("client should build")
}

#[tokio::test]
async fn nqe_pagination_issues_one_call_per_page() {
    let server = MockServer::start().await;

    // Total of 5 records at page size 2: offsets 0, 2 and 4.
    let pages = [
        (0, json!([{"n": 1}, {"n": 2}])),
        (2, json!([{"n": 3}, {"n": 4}])),
        (4, json!([{"n": 5}])),
    ];
    for (offset, items) in pages {
        Mock::given(method("POST"))
            .and(path("/api/nqe"))
            .and(body_partial_json(json!({
                "queryId": "FQ_device_basic_info",
                "queryOptions": {"offset": offset, "limit": 2},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": items,
                "totalNumItems": 5,
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client_for(&server);
    let records = client
        .collect_nqe_records("FQ_device_basic_info", 2)
        .await
        .expect("pagination should converge");

    assert_eq!(records.len(), 5);
    assert_eq!(records[4], json!({"n": 5}));
    // Mock expectations assert exactly ceil(5/2) = 3 calls on drop.
}

#[tokio::test]
async fn nqe_pagination_handles_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/nqe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [],
            "totalNumItems": 0,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let records = client.collect_nqe_records("FQ_sites", 1000).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn nqe_pagination_stops_on_short_page_despite_larger_total() {
    let server = MockServer::start().await;

    // The server claims 100 records but only ever returns two, then an
    // empty page. The loop must terminate instead of spinning.
    Mock::given(method("POST"))
        .and(path("/api/nqe"))
        .and(body_partial_json(json!({"queryOptions": {"offset": 0}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"n": 1}, {"n": 2}],
            "totalNumItems": 100,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/nqe"))
        .and(body_partial_json(json!({"queryOptions": {"offset": 2}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [],
            "totalNumItems": 100,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let records = client.collect_nqe_records("FQ_device_roles", 2).await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn nqe_rejects_payload_without_record_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/nqe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.run_nqe_query("FQ_sites", 0, 10).await.unwrap_err();
    assert!(err.message.contains("Unexpected NQE response format"));
}

#[tokio::test]
async fn list_snapshots_unwraps_both_response_shapes() {
    let flat_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/snapshots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"snapshot_id": "601", "status": "done"},
            {"snapshot_id": "600", "status": "processing"},
        ])))
        .mount(&flat_server)
        .await;

    let snapshots = client_for(&flat_server).list_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots[0].is_loaded());
    assert!(!snapshots[1].is_loaded());

    let wrapped_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/snapshots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"ref": "$prev"}, {"snapshot_id": "599", "finishState": "loaded"}],
        })))
        .mount(&wrapped_server)
        .await;

    let snapshots = client_for(&wrapped_server).list_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots[0].is_sentinel());
    assert!(snapshots[1].is_loaded());
}

#[tokio::test]
async fn network_scoped_sources_use_the_network_snapshot_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/networks/net-7/snapshots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"snapshot_id": "42", "status": "loaded"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ForwardClient::new(
        &server.uri(),
        Some("token-1"),
        true,
        None,
        Some("net-7".to_string()),
    )
    .unwrap();
    let snapshots = client.list_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 1);
}

#[tokio::test]
async fn unauthorized_maps_to_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/snapshots"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client_for(&server).list_snapshots().await.unwrap_err();
    assert_eq!(err.status, Some(401));
    assert!(err.message.contains("Authentication failed"));
}

#[tokio::test]
async fn server_errors_carry_the_status_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/snapshots/901"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client_for(&server).get_snapshot("901").await.unwrap_err();
    assert_eq!(err.status, Some(503));
    assert!(err.message.contains("maintenance"));
}

#[tokio::test]
async fn get_snapshot_unwraps_the_data_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/snapshots/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"snapshot_id": "42", "name": "nightly", "status": "loaded"},
        })))
        .mount(&server)
        .await;

    let snapshot = client_for(&server).get_snapshot("42").await.unwrap();
    assert_eq!(snapshot.id(), Some("42"));
    assert_eq!(snapshot.display_name(), Some("nightly"));
}

#[tokio::test]
async fn site_topology_posts_the_site_and_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/diagram/site"))
        .and(body_partial_json(json!({"site": "fra1", "snapshot": "42"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nodes": [{"id": "core-sw-01"}],
            "links": [],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let topology = client_for(&server)
        .get_site_topology("fra1", "42", None)
        .await
        .unwrap();
    assert_eq!(topology["nodes"][0]["id"], "core-sw-01");
}
