//! In-process API tests against the in-memory store

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use rental_server::{
    api,
    config::AppConfig,
    models::{EquipmentStock, TenantClaims},
    repository::memory::MemoryStore,
    services::Services,
    AppState,
};

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    tenant_id: Uuid,
    token: String,
    secret: String,
}

impl TestApp {
    fn new() -> Self {
        let config = AppConfig::default();
        let store = Arc::new(MemoryStore::default());
        let services = Services::new(store.clone(), config.scheduling.clone(), &config.cache);
        let secret = config.auth.jwt_secret.clone();
        let tenant_id = Uuid::new_v4();
        let token = token_for(tenant_id, &secret);

        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        };

        Self {
            router: api::create_router(state),
            store,
            tenant_id,
            token,
            secret,
        }
    }

    async fn add_equipment(&self, name: &str, total: i32, maintenance: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .put_equipment(EquipmentStock {
                id,
                tenant_id: self.tenant_id,
                name: name.to_string(),
                total_quantity: total,
                rented_quantity: 0,
                maintenance_quantity: maintenance,
                crea_date: Some(Utc::now()),
                modif_date: None,
            })
            .await;
        id
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_as(&self.token, method, uri, body).await
    }

    async fn send_as(&self, token: &str, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri))
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
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
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

fn token_for(tenant_id: Uuid, secret: &str) -> String {
    let now = Utc::now().timestamp();
    TenantClaims {
        sub: "dispatcher".to_string(),
        tenant_id,
        exp: now + 3600,
        iat: now,
    }
    .create_token(secret)
    .unwrap()
}

fn booking(equipment_id: Uuid, quantity: i32, start: &str, end: &str) -> Value {
    json!({
        "client_ref": "CRM-1042",
        "start_date": start,
        "end_date": end,
        "items": [{ "equipment_id": equipment_id, "quantity": quantity }]
    })
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = app.send(Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_responses_are_gzipped_on_request() {
    let app = TestApp::new();
    let gzipped = app
        .router
        .clone()
        .oneshot(
            Request::get("/api-docs/openapi.json")
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(gzipped.status(), StatusCode::OK);
    assert_eq!(gzipped.headers()[header::CONTENT_ENCODING], "gzip");

    let plain = app
        .router
        .clone()
        .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(plain.headers().get(header::CONTENT_ENCODING).is_none());
}

#[tokio::test]
async fn test_missing_or_bad_token_is_rejected() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/api/v1/bookings").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = token_for(app.tenant_id, "not-the-secret");
    let (status, _) = app.send_as(&forged, Method::GET, "/bookings", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tent_scenario_over_http() {
    let app = TestApp::new();
    let tent = app.add_equipment("Tent-A", 5, 1).await;

    let (status, created) = app
        .send(Method::POST, "/bookings", Some(booking(tent, 3, "2025-06-10", "2025-06-15")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending_installation");

    let (status, check) = app
        .send(
            Method::POST,
            "/availability/check",
            Some(json!({
                "equipment_id": tent,
                "quantity": 2,
                "start_date": "2025-06-12",
                "end_date": "2025-06-20"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["result"]["available"], true);
    assert_eq!(check["result"]["available_quantity"], 1);

    let (status, rejected) = app
        .send(Method::POST, "/bookings", Some(booking(tent, 2, "2025-06-12", "2025-06-20")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(rejected["error"], "CapacityExceeded");
    assert_eq!(rejected["results"][0]["available_quantity"], 1);
    assert!(rejected["message"].as_str().unwrap().contains("Tent-A"));

    let (status, later) = app
        .send(Method::POST, "/bookings", Some(booking(tent, 2, "2025-06-16", "2025-06-20")))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", later);
}

#[tokio::test]
async fn test_lifecycle_over_http() {
    let app = TestApp::new();
    let tent = app.add_equipment("Tent", 2, 0).await;

    let (_, created) = app
        .send(Method::POST, "/bookings", Some(booking(tent, 1, "2025-06-01", "2025-06-03")))
        .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, moved) = app
        .send(
            Method::PUT,
            &format!("/bookings/{}/schedule", id),
            Some(json!({ "start_date": "2025-06-02", "end_date": "2025-06-05" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["end_date"], "2025-06-05");

    let (status, installed) = app.send(Method::POST, &format!("/bookings/{}/install", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(installed["status"], "active");

    let (status, error) = app.send(Method::POST, &format!("/bookings/{}/install", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "InvalidTransition");

    let (status, removed) = app.send(Method::POST, &format!("/bookings/{}/remove", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["status"], "completed");

    let (status, listed) = app.send(Method::GET, "/bookings?status=completed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_input_is_bad_request() {
    let app = TestApp::new();
    let tent = app.add_equipment("Tent", 2, 0).await;

    let (status, body) = app
        .send(Method::POST, "/bookings", Some(booking(tent, 0, "2025-06-01", "2025-06-03")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, _) = app
        .send(Method::POST, "/bookings", Some(booking(tent, 1, "2025-06-05", "2025-06-03")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::GET, "/bookings?from=2025-06-01", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recurring_series_over_http() {
    let app = TestApp::new();
    let tent = app.add_equipment("Tent", 3, 0).await;

    let mut template = booking(tent, 2, "2025-01-06", "2025-01-08");
    template["recurrence"] = json!({ "unit": "weekly", "interval": 2 });
    let (status, created) = app.send(Method::POST, "/bookings", Some(template)).await;
    assert_eq!(status, StatusCode::CREATED);
    let series = created["id"].as_str().unwrap().to_string();

    let (status, report) = app
        .send(Method::POST, &format!("/series/{}/expand?batch_size=2", series), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let generated = report["generated"].as_array().unwrap();
    assert_eq!(generated.len(), 2);
    assert_eq!(generated[0]["start_date"], "2025-01-20");
    assert_eq!(generated[0]["end_date"], "2025-01-22");
    assert_eq!(generated[1]["start_date"], "2025-02-03");
    assert_eq!(generated[1]["end_date"], "2025-02-05");

    let (status, paused) = app.send(Method::POST, &format!("/series/{}/pause", series), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["status"], "paused");

    let (_, idle) = app
        .send(Method::POST, &format!("/series/{}/expand", series), None)
        .await;
    assert!(idle["generated"].as_array().unwrap().is_empty());

    let (status, occurrences) = app
        .send(Method::GET, &format!("/series/{}/occurrences", series), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(occurrences.as_array().unwrap().len(), 2);

    let first = generated[0]["id"].as_str().unwrap();
    let (status, installed) = app
        .send(Method::POST, &format!("/occurrences/{}/install", first), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(installed["status"], "active");

    let (_, check) = app
        .send(
            Method::POST,
            "/availability/check",
            Some(json!({
                "equipment_id": tent,
                "quantity": 2,
                "start_date": "2025-01-21",
                "end_date": "2025-01-21"
            })),
        )
        .await;
    assert_eq!(check["result"]["available"], false);
    assert_eq!(check["result"]["available_quantity"], 1);
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let app = TestApp::new();
    let tent = app.add_equipment("Tent", 2, 0).await;

    let (_, created) = app
        .send(Method::POST, "/bookings", Some(booking(tent, 1, "2025-06-01", "2025-06-03")))
        .await;
    let id = created["id"].as_str().unwrap();

    let stranger = token_for(Uuid::new_v4(), &app.secret);
    let (status, _) = app
        .send_as(&stranger, Method::GET, &format!("/bookings/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = app.send_as(&stranger, Method::GET, "/equipment", None).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ledger_reports_commitments() {
    let app = TestApp::new();
    let tent = app.add_equipment("Tent", 6, 1).await;

    let (_, created) = app
        .send(Method::POST, "/bookings", Some(booking(tent, 2, "2025-06-01", "2025-06-03")))
        .await;
    let id = created["id"].as_str().unwrap();
    app.send(Method::POST, &format!("/bookings/{}/install", id), None).await;

    let (status, ledger) = app
        .send(Method::GET, &format!("/equipment/{}/ledger?date=2025-06-02", tent), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["derived_rented_quantity"], 2);
    assert_eq!(ledger["drift"], -2);
    assert_eq!(ledger["free_quantity"], 3);

    let (status, _) = app
        .send(Method::GET, &format!("/equipment/{}/ledger", Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
