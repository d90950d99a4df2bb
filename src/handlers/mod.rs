use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub mod admin;
pub mod events;
pub mod health;
pub mod public;

#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/services", get(public::list_services))
        .route("/api/slots", get(public::list_slots))
        .route("/api/bookings", post(public::create_booking))
        .route("/api/bookings/search", get(public::search_booking))
        .route("/api/business-hours", get(public::get_business_hours))
        .route("/api/location", get(public::get_location))
        .route("/api/admin/pending-payments", get(admin::pending_payments))
        .route("/api/admin/verify-payment", post(admin::verify_payment))
        .route("/api/admin/queue", get(admin::get_queue))
        .route("/api/admin/update-status", post(admin::update_status))
        .route("/api/admin/bookings/:id/history", get(admin::booking_history))
        .route("/api/admin/stats", get(admin::get_stats))
        .route("/api/admin/events", get(events::events_stream))
        .with_state(state)
}

/// Wall-clock time at the wash, which is what booking dates are written in.
pub(crate) fn local_now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}
