//! HTTP tests for the REST API
//!
//! Requests are driven straight into the router with `tower::ServiceExt`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use spk::api::{router, AppState};
use spk::core::audit::FixedAuditor;
use spk::core::search::SqliteSearchIndex;
use spk::core::service::ResourceService;
use spk::core::store::PrimaryStore;

struct TestApp {
    _tmp: TempDir,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let store = PrimaryStore::open(tmp.path().join("parking.db")).unwrap();
        let index = SqliteSearchIndex::open(tmp.path().join("search.db")).unwrap();
        let service = ResourceService::new(store, index, Arc::new(FixedAuditor::new("tester")));
        let router = router(AppState::new(service, "smartParkingApp"));
        Self { _tmp: tmp, router }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> Reply {
        self.send_as(method, uri, body, "application/json").await
    }

    async fn send_as(&self, method: Method, uri: &str, body: Option<Value>, content_type: &str) -> Reply {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, content_type);
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply { status, headers, body }
    }

    async fn create(&self, collection: &str, body: Value) -> i64 {
        let reply = self.send(Method::POST, &format!("/api/{}", collection), Some(body)).await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.body["id"].as_i64().unwrap()
    }
}

struct Reply {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Value,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

// ============================================================================
// Create / Read
// ============================================================================

#[tokio::test]
async fn test_create_returns_201_with_location_and_alert() {
    let app = TestApp::new();
    let reply = app
        .send(
            Method::POST,
            "/api/car-parks",
            Some(json!({"name": "Central", "owner": "City"})),
        )
        .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    let id = reply.body["id"].as_i64().unwrap();
    assert_eq!(reply.header("location"), Some(format!("/api/car-parks/{}", id).as_str()));
    assert_eq!(
        reply.header("x-smartparkingapp-alert"),
        Some("smartParkingApp.carPark.created")
    );
    assert_eq!(reply.header("x-smartparkingapp-params"), Some(id.to_string().as_str()));
}

#[tokio::test]
async fn test_create_with_id_is_bad_request() {
    let app = TestApp::new();
    let reply = app
        .send(Method::POST, "/api/addresses", Some(json!({"id": 3, "streetAddress": "x"})))
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errorKey"], "idexists");
    assert_eq!(reply.body["entityName"], "address");
    assert_eq!(reply.body["message"], "error.idexists");
    assert_eq!(reply.header("x-smartparkingapp-error"), Some("error.idexists"));
}

#[tokio::test]
async fn test_missing_required_field_is_validation_error() {
    let app = TestApp::new();
    let reply = app
        .send(Method::POST, "/api/parking-spots", Some(json!({"floor": 2})))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errorKey"], "validation");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/addresses")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_and_list() {
    let app = TestApp::new();
    let first = app.create("addresses", json!({"streetAddress": "Main St 1"})).await;
    let second = app.create("addresses", json!({"streetAddress": "Main St 2"})).await;

    let reply = app.send(Method::GET, &format!("/api/addresses/{}", second), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["streetAddress"], "Main St 2");

    let reply = app.send(Method::GET, "/api/addresses", None).await;
    let ids: Vec<i64> = reply
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![first, second]);
}

#[tokio::test]
async fn test_get_missing_is_404() {
    let app = TestApp::new();
    let reply = app.send(Method::GET, "/api/user-extras/99", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["errorKey"], "notfound");
}

#[tokio::test]
async fn test_non_numeric_id_is_bad_request() {
    let app = TestApp::new();
    let reply = app.send(Method::GET, "/api/addresses/abc", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Update / Patch / Delete
// ============================================================================

#[tokio::test]
async fn test_put_replaces_entity() {
    let app = TestApp::new();
    let id = app
        .create("addresses", json!({"streetAddress": "Old Rd", "city": "Oulu"}))
        .await;

    let reply = app
        .send(
            Method::PUT,
            &format!("/api/addresses/{}", id),
            Some(json!({"id": id, "streetAddress": "New Rd"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["streetAddress"], "New Rd");
    assert!(reply.body["city"].is_null());
    assert_eq!(
        reply.header("x-smartparkingapp-alert"),
        Some("smartParkingApp.address.updated")
    );
}

#[tokio::test]
async fn test_put_id_errors() {
    let app = TestApp::new();
    let id = app.create("addresses", json!({"streetAddress": "A"})).await;

    let reply = app
        .send(Method::PUT, &format!("/api/addresses/{}", id), Some(json!({"streetAddress": "B"})))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errorKey"], "idnull");

    let reply = app
        .send(
            Method::PUT,
            &format!("/api/addresses/{}", id),
            Some(json!({"id": id + 1, "streetAddress": "B"})),
        )
        .await;
    assert_eq!(reply.body["errorKey"], "idinvalid");

    let reply = app
        .send(Method::PUT, "/api/addresses/500", Some(json!({"id": 500, "streetAddress": "B"})))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errorKey"], "idnotfound");
}

#[tokio::test]
async fn test_patch_merges_only_present_fields() {
    let app = TestApp::new();
    let id = app
        .create(
            "parking-spots",
            json!({"available": true, "floor": 1, "accessableParking": true}),
        )
        .await;

    let reply = app
        .send_as(
            Method::PATCH,
            &format!("/api/parking-spots/{}", id),
            Some(json!({"id": id, "available": false})),
            "application/merge-patch+json",
        )
        .await;

    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["available"], false);
    assert_eq!(reply.body["floor"], 1);
    assert_eq!(reply.body["accessableParking"], true);
}

#[tokio::test]
async fn test_delete_returns_204_and_removes() {
    let app = TestApp::new();
    let id = app.create("car-parks", json!({"name": "Gone", "owner": "x"})).await;

    let reply = app.send(Method::DELETE, &format!("/api/car-parks/{}", id), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert_eq!(
        reply.header("x-smartparkingapp-alert"),
        Some("smartParkingApp.carPark.deleted")
    );

    let reply = app.send(Method::GET, &format!("/api/car-parks/{}", id), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    // Deleting again is a no-op
    let reply = app.send(Method::DELETE, &format!("/api/car-parks/{}", id), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_reflects_writes() {
    let app = TestApp::new();
    let id = app.create("car-parks", json!({"name": "Central", "owner": "City"})).await;
    app.create("car-parks", json!({"name": "Harbour", "owner": "Port"})).await;

    let reply = app.send(Method::GET, "/api/_search/car-parks?query=central", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let hits = reply.body.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], id);

    let reply = app.send(Method::GET, "/api/_search/car-parks?query=*", None).await;
    assert_eq!(reply.body.as_array().unwrap().len(), 2);

    app.send(
        Method::PUT,
        &format!("/api/car-parks/{}", id),
        Some(json!({"id": id, "name": "Riverside", "owner": "City"})),
    )
    .await;
    let reply = app.send(Method::GET, "/api/_search/car-parks?query=central", None).await;
    assert!(reply.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_search_is_bad_query() {
    let app = TestApp::new();
    app.create("car-parks", json!({"name": "Central", "owner": "City"})).await;
    let reply = app
        .send(Method::GET, "/api/_search/car-parks?query=%22open", None)
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errorKey"], "badquery");
}

// ============================================================================
// Associations
// ============================================================================

#[tokio::test]
async fn test_association_set_add_remove() {
    let app = TestApp::new();
    let park = app.create("car-parks", json!({"name": "Central", "owner": "City"})).await;
    let a = app.create("parking-spots", json!({"available": true})).await;
    let b = app.create("parking-spots", json!({"available": true})).await;

    let base = format!("/api/car-parks/{}/parking-spots", park);
    let reply = app.send(Method::PUT, &base, Some(json!([a]))).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let reply = app.send(Method::POST, &format!("{}/{}", base, b), None).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app.send(Method::GET, &base, None).await;
    let ids: Vec<i64> = reply
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![a, b]);

    let reply = app.send(Method::DELETE, &format!("{}/{}", base, a), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = app.send(Method::GET, &format!("/api/parking-spots/{}", a), None).await;
    assert!(reply.body["carPark"].is_null());
}

#[tokio::test]
async fn test_association_errors() {
    let app = TestApp::new();
    let park = app.create("car-parks", json!({"name": "Central", "owner": "City"})).await;

    let reply = app
        .send(Method::POST, &format!("/api/car-parks/{}/open-hours/77", park), None)
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errorKey"], "relationnotfound");

    let reply = app.send(Method::GET, "/api/car-parks/404/open-hours", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_one_to_one_claim_moves_holder() {
    let app = TestApp::new();
    let spot = app.create("parking-spots", json!({"available": false})).await;
    let first = app
        .create("user-extras", json!({"currentParkingSpot": "A1", "parkingSpot": {"id": spot}}))
        .await;
    let second = app
        .create("user-extras", json!({"currentParkingSpot": "A1", "parkingSpot": {"id": spot}}))
        .await;

    let reply = app.send(Method::GET, &format!("/api/user-extras/{}", first), None).await;
    assert!(reply.body["parkingSpot"].is_null());
    let reply = app.send(Method::GET, &format!("/api/user-extras/{}", second), None).await;
    assert_eq!(reply.body["parkingSpot"]["id"], spot);

    let reply = app
        .send(Method::PUT, &format!("/api/parking-spots/{}/user-extra", spot), Some(json!([first, second])))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errorKey"], "validation");
}

#[tokio::test]
async fn test_graph_returns_children() {
    let app = TestApp::new();
    let address = app.create("addresses", json!({"streetAddress": "Main St 1"})).await;
    let park = app
        .create("car-parks", json!({"name": "Central", "owner": "City", "address": {"id": address}}))
        .await;

    let reply = app.send(Method::GET, &format!("/api/addresses/{}/graph", address), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["entity"]["id"], address);
    assert_eq!(reply.body["children"]["carParks"][0]["id"], park);

    let reply = app.send(Method::GET, "/api/addresses/999/graph", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_second_extra_for_same_user_is_conflict() {
    let app = TestApp::new();
    app.create("user-extras", json!({"currentParkingSpot": "A1", "user": {"id": 7}}))
        .await;

    let reply = app
        .send(
            Method::POST,
            "/api/user-extras",
            Some(json!({"currentParkingSpot": "B2", "user": {"id": 7}})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["errorKey"], "conflict");

    let reply = app.send(Method::GET, "/api/user-extras", None).await;
    assert_eq!(reply.body.as_array().unwrap().len(), 1);
}
