use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower::ServiceExt;

use carwash::config::AppConfig;
use carwash::db::{self, queries};
use carwash::handlers;
use carwash::models::{AdminRole, QueueEvent};
use carwash::services::notify::NotificationSink;
use carwash::state::AppState;

// ── Mock Sink ──

struct RecordingSink {
    events: Arc<Mutex<Vec<QueueEvent>>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, event: &QueueEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct BrokenSink;

#[async_trait]
impl NotificationSink for BrokenSink {
    async fn publish(&self, _event: &QueueEvent) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("webhook unreachable"))
    }
}

struct StalledSink;

#[async_trait]
impl NotificationSink for StalledSink {
    async fn publish(&self, _event: &QueueEvent) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

// ── Helpers ──

const ADMIN: &str = "admin-token";
const STAFF: &str = "staff-token";
const CS: &str = "cs-token";
const DATE: &str = "2099-06-15";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: ":memory:".to_string(),
        admin_token: ADMIN.to_string(),
        ..AppConfig::default()
    }
}

fn build_state(sinks: Vec<Box<dyn NotificationSink>>) -> Arc<AppState> {
    let conn = db::init_db(":memory:").unwrap();
    queries::upsert_admin(&conn, "admin", "Administrator", AdminRole::Admin, ADMIN).unwrap();
    queries::upsert_admin(&conn, "bay1", "Bay Staff", AdminRole::Staff, STAFF).unwrap();
    queries::upsert_admin(&conn, "desk", "Front Desk", AdminRole::CustomerService, CS).unwrap();

    let (events_tx, _) = broadcast::channel(16);
    Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(),
        events_tx,
        notifiers: sinks,
    })
}

fn test_state() -> (Arc<AppState>, Arc<Mutex<Vec<QueueEvent>>>) {
    let events = Arc::new(Mutex::new(vec![]));
    let sink = RecordingSink {
        events: Arc::clone(&events),
    };
    (build_state(vec![Box::new(sink)]), events)
}

/// Notifications are delivered from a background task; wait for `count` of them.
async fn wait_for_events(events: &Arc<Mutex<Vec<QueueEvent>>>, count: usize) -> Vec<QueueEvent> {
    for _ in 0..200 {
        let seen = events.lock().unwrap().clone();
        if seen.len() >= count {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    events.lock().unwrap().clone()
}

fn test_app(state: Arc<AppState>) -> Router {
    handlers::router(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_as(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn booking_body(service_id: i64, time: &str, phone: &str) -> Value {
    json!({
        "service_id": service_id,
        "customer_name": "Mwila Banda",
        "customer_phone": phone,
        "customer_email": "mwila@example.com",
        "vehicle_model": "Toyota Corolla",
        "vehicle_number_plate": "ABC 1234",
        "scheduled_date": DATE,
        "scheduled_time": time,
    })
}

async fn create(app: &Router, service_id: i64, time: &str) -> Value {
    let (status, body) = send(
        app,
        post_json("/api/bookings", None, booking_body(service_id, time, "0977000111")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["booking"].clone()
}

async fn verify(app: &Router, booking_id: &str) -> (StatusCode, Value) {
    send(
        app,
        post_json(
            "/api/admin/verify-payment",
            Some(CS),
            json!({"booking_id": booking_id, "payment_method": "mobile_money"}),
        ),
    )
    .await
}

// ── Public API ──

#[tokio::test]
async fn test_health() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_services_ordered_by_price() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (status, body) = send(&app, get("/api/services")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let prices: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["price_cents"].as_i64().unwrap())
        .collect();
    assert_eq!(prices, vec![5000, 7000, 10000, 20000]);
}

#[tokio::test]
async fn test_slots_for_open_day() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (status, body) = send(&app, get(&format!("/api/slots?date={DATE}&service_id=1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["duration_minutes"], 60);

    let slots = body["data"]["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 23);
    assert_eq!(slots[0], "07:00");
    assert_eq!(slots[22], "18:00");
}

#[tokio::test]
async fn test_slots_shrink_after_booking() {
    let (state, _) = test_state();
    let app = test_app(state);

    create(&app, 1, "09:00").await;

    let (_, body) = send(&app, get(&format!("/api/slots?date={DATE}&service_id=1"))).await;
    let slots: Vec<&str> = body["data"]["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();
    assert!(slots.contains(&"08:00"));
    assert!(!slots.contains(&"08:30"));
    assert!(!slots.contains(&"09:00"));
    assert!(!slots.contains(&"09:30"));
    assert!(slots.contains(&"10:00"));
}

#[tokio::test]
async fn test_slots_validation() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (status, body) = send(&app, get("/api/slots?service_id=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app, get(&format!("/api/slots?date={DATE}&service_id=99"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/slots?date=15-06-2099&service_id=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_booking() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (status, body) = send(
        &app,
        post_json("/api/bookings", None, booking_body(2, "10:30", "0977000111")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let number = body["data"]["booking_number"].as_str().unwrap();
    assert!(number.starts_with("CW"));
    assert_eq!(number.len(), 14);
    assert_eq!(body["data"]["amount_cents"], 10000);

    let booking = &body["data"]["booking"];
    assert_eq!(booking["status"], "pending_payment");
    assert_eq!(booking["scheduled_time"], "10:30");
    assert_eq!(booking["duration_minutes"], 90);
    assert!(booking["slot_number"].is_null());
}

#[tokio::test]
async fn test_create_booking_conflicts_and_validation() {
    let (state, _) = test_state();
    let app = test_app(state);

    create(&app, 1, "09:00").await;

    let (status, body) = send(
        &app,
        post_json("/api/bookings", None, booking_body(1, "09:30", "0966000000")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let mut missing = booking_body(1, "12:00", "0966000000");
    missing["customer_name"] = json!("");
    let (status, body) = send(&app, post_json("/api/bookings", None, missing)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "customer_name is required");
}

#[tokio::test]
async fn test_search_booking() {
    let (state, _) = test_state();
    let app = test_app(state);

    let booking = create(&app, 1, "09:00").await;
    let number = booking["booking_number"].as_str().unwrap();

    let (status, body) = send(&app, get(&format!("/api/bookings/search?booking_number={number}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], booking["id"]);

    let (status, body) = send(&app, get("/api/bookings/search?phone=0977000111")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["booking_number"], number);

    let (status, _) = send(&app, get("/api/bookings/search")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/api/bookings/search?booking_number=CW000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_business_hours() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (status, body) = send(&app, get("/api/business-hours")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hours"].as_array().unwrap().len(), 7);
    assert_eq!(body["data"]["hours"][0]["open_time"], "07:00");
    assert!(body["data"]["summary"]
        .as_str()
        .unwrap()
        .starts_with("Mon: 07:00-19:00"));
}

#[tokio::test]
async fn test_location() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (status, body) = send(&app, get("/api/location")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Copperway Car Wash");
}

// ── Admin Auth ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (status, _) = send(&app, get("/api/admin/queue")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get_as("/api/admin/queue", "wrong-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get_as("/api/admin/queue", CS)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_role_checks() {
    let (state, _) = test_state();
    let app = test_app(state);

    let booking = create(&app, 1, "09:00").await;

    let (status, _) = send(
        &app,
        post_json(
            "/api/admin/update-status",
            Some(CS),
            json!({"booking_id": booking["id"], "status": "cancelled"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, get_as("/api/admin/stats", CS)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, get_as("/api/admin/stats", STAFF)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_bookings"], 1);
}

#[tokio::test]
async fn test_events_stream_requires_token() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (status, _) = send(&app, get("/api/admin/events")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get("/api/admin/events?token=nope")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ── Queue Flow ──

#[tokio::test]
async fn test_pending_payments_listed() {
    let (state, _) = test_state();
    let app = test_app(state);

    let booking = create(&app, 1, "09:00").await;

    let (status, body) = send(&app, get_as("/api/admin/pending-payments", CS)).await;
    assert_eq!(status, StatusCode::OK);
    let pending = body["data"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["id"], booking["id"]);

    verify(&app, booking["id"].as_str().unwrap()).await;
    let (_, body) = send(&app, get_as("/api/admin/pending-payments", CS)).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_verify_payment_assigns_sequential_slots() {
    let (state, events) = test_state();
    let app = test_app(state);

    let first = create(&app, 1, "09:00").await;
    let second = create(&app, 2, "11:00").await;

    let (status, body) = verify(&app, first["id"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["slot_number"], 1);
    assert_eq!(body["data"]["estimated_completion_time"], "2099-06-15T10:00:00");
    assert_eq!(body["data"]["queue_position"], 1);
    assert_eq!(body["data"]["booking"]["status"], "payment_verified");
    assert_eq!(body["data"]["booking"]["payment_confirmed"], true);

    let (status, body) = verify(&app, second["id"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["slot_number"], 2);
    assert_eq!(body["data"]["estimated_completion_time"], "2099-06-15T12:30:00");

    let recorded = wait_for_events(&events, 4).await;
    let names: Vec<&str> = recorded.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec!["queue:update", "booking:status-update", "queue:update", "booking:status-update"]
    );
    match &recorded[2] {
        QueueEvent::QueueUpdated { queue } => assert_eq!(queue.len(), 2),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_verify_payment_twice_is_rejected() {
    let (state, events) = test_state();
    let app = test_app(state);

    let booking = create(&app, 1, "09:00").await;
    let id = booking["id"].as_str().unwrap();

    let (status, _) = verify(&app, id).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = verify(&app, id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(wait_for_events(&events, 2).await.len(), 2);

    let (status, _) = verify(&app, "no-such-booking").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verify_rejected_payment_keeps_pending() {
    let (state, events) = test_state();
    let app = test_app(state);

    let booking = create(&app, 1, "09:00").await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/admin/verify-payment",
            Some(ADMIN),
            json!({"booking_id": booking["id"], "verified": false, "notes": "amount mismatch"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["slot_number"].is_null());
    assert_eq!(body["data"]["booking"]["status"], "pending_payment");
    assert_eq!(body["data"]["booking"]["payment_notes"], "amount mismatch");
    tokio::task::yield_now().await;
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_queue_ordered_by_slot() {
    let (state, _) = test_state();
    let app = test_app(state);

    let late = create(&app, 1, "15:00").await;
    let early = create(&app, 1, "08:00").await;
    verify(&app, late["id"].as_str().unwrap()).await;
    verify(&app, early["id"].as_str().unwrap()).await;

    let (status, body) = send(&app, get_as(&format!("/api/admin/queue?date={DATE}"), STAFF)).await;
    assert_eq!(status, StatusCode::OK);
    let queue = body["data"].as_array().unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0]["id"], late["id"]);
    assert_eq!(queue[0]["slot_number"], 1);
    assert_eq!(queue[1]["id"], early["id"]);

    let (_, body) = send(&app, get_as("/api/admin/queue?date=2099-06-16", STAFF)).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_status_flow() {
    let (state, events) = test_state();
    let app = test_app(state);

    let booking = create(&app, 1, "09:00").await;
    let id = booking["id"].as_str().unwrap();
    verify(&app, id).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/admin/update-status",
            Some(STAFF),
            json!({"booking_id": id, "status": "bogus"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid status: bogus");

    let (status, body) = send(
        &app,
        post_json(
            "/api/admin/update-status",
            Some(STAFF),
            json!({"booking_id": id, "status": "completed", "notes": "done at bay 2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert!(body["data"]["completed_at"].is_string());

    let (status, body) = send(&app, get_as(&format!("/api/admin/bookings/{id}/history"), CS)).await;
    assert_eq!(status, StatusCode::OK);
    let history = body["data"]["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["status_change"], "payment_verified");
    assert_eq!(history[1]["status_change"], "completed");
    assert_eq!(history[1]["notes"], "done at bay 2");

    let recorded = wait_for_events(&events, 4).await;
    match recorded.last() {
        Some(QueueEvent::BookingStatusChanged { status, .. }) => {
            assert_eq!(status.as_str(), "completed")
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Completed bookings leave the default queue
    let (_, body) = send(&app, get_as("/api/admin/queue", ADMIN)).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_history_unknown_booking() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (status, _) = send(&app, get_as("/api/admin/bookings/missing/history", ADMIN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failing_sink_does_not_fail_request() {
    let events = Arc::new(Mutex::new(vec![]));
    let state = build_state(vec![
        Box::new(BrokenSink),
        Box::new(RecordingSink {
            events: Arc::clone(&events),
        }),
    ]);
    let app = test_app(state);

    let booking = create(&app, 1, "09:00").await;
    let (status, body) = verify(&app, booking["id"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["slot_number"], 1);
    assert_eq!(wait_for_events(&events, 2).await.len(), 2);
}

#[tokio::test]
async fn test_slow_sink_does_not_delay_response() {
    let app = test_app(build_state(vec![Box::new(StalledSink)]));

    let booking = create(&app, 1, "09:00").await;
    let (status, body) = tokio::time::timeout(
        Duration::from_secs(2),
        verify(&app, booking["id"].as_str().unwrap()),
    )
    .await
    .expect("verify-payment waited on a notification sink");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["slot_number"], 1);
}
