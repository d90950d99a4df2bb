use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{local_now, ok, Envelope};
use crate::db::queries::{self, BookingStats};
use crate::errors::{AppError, AppResult};
use crate::models::{AdminRole, AdminUser, Booking, QueueHistoryEntry};
use crate::services::booking::parse_date;
use crate::services::notify;
use crate::services::queue::{self, Verification, VerifyPaymentRequest};
use crate::services::status::{self, UpdateStatusRequest};
use crate::state::AppState;

const ALL_ROLES: &[AdminRole] = &[AdminRole::Admin, AdminRole::Staff, AdminRole::CustomerService];
const OPERATORS: &[AdminRole] = &[AdminRole::Admin, AdminRole::Staff];

fn bearer_token(headers: &HeaderMap) -> &str {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("")
}

/// Resolves an API token to an active admin account with one of `allowed` roles.
pub(crate) fn authenticate(
    state: &AppState,
    token: &str,
    allowed: &[AdminRole],
) -> AppResult<AdminUser> {
    if token.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let admin = {
        let conn = state.conn()?;
        queries::get_admin_by_token(&conn, token)?
    };
    let Some(admin) = admin else {
        tracing::warn!("rejected admin request with unknown token");
        return Err(AppError::Unauthorized);
    };

    if !allowed.contains(&admin.role) {
        tracing::warn!(admin = %admin.username, role = admin.role.as_str(), "admin role not permitted");
        return Err(AppError::Forbidden);
    }
    Ok(admin)
}

fn check_auth(state: &AppState, headers: &HeaderMap, allowed: &[AdminRole]) -> AppResult<AdminUser> {
    authenticate(state, bearer_token(headers), allowed)
}

// GET /api/admin/pending-payments
pub async fn pending_payments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Envelope<Vec<Booking>>>> {
    check_auth(&state, &headers, ALL_ROLES)?;

    let bookings = {
        let conn = state.conn()?;
        queries::get_pending_payments(&conn)?
    };
    Ok(ok(bookings))
}

// POST /api/admin/verify-payment
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<VerifyPaymentRequest>,
) -> AppResult<Json<Envelope<Verification>>> {
    let actor = check_auth(&state, &headers, ALL_ROLES)?;

    let verification = {
        let mut conn = state.conn()?;
        queue::verify_payment(&mut conn, &request, &actor, &state.config.queue, local_now())?
    };

    if verification.slot_number.is_some() {
        let changed = (
            verification.booking.booking_number.clone(),
            verification.booking.status,
        );
        notify::announce(&state, Some(changed));
    }

    Ok(ok(verification))
}

// GET /api/admin/queue?date=
#[derive(Deserialize)]
pub struct QueueQuery {
    pub date: Option<String>,
}

pub async fn get_queue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<QueueQuery>,
) -> AppResult<Json<Envelope<Vec<Booking>>>> {
    check_auth(&state, &headers, ALL_ROLES)?;

    let date = match query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => Some(parse_date(raw)?),
        None => None,
    };

    let bookings = {
        let conn = state.conn()?;
        match date {
            Some(date) => {
                queries::get_bookings_by_status(&conn, &state.config.queue.queue_statuses, Some(&date))?
            }
            None => queue::current_queue(&conn, &state.config.queue)?,
        }
    };
    Ok(ok(bookings))
}

// POST /api/admin/update-status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<UpdateStatusRequest>,
) -> AppResult<Json<Envelope<Booking>>> {
    let actor = check_auth(&state, &headers, OPERATORS)?;

    let booking = {
        let mut conn = state.conn()?;
        status::update_status(&mut conn, &request, &actor, local_now())?
    };

    notify::announce(&state, Some((booking.booking_number.clone(), booking.status)));

    Ok(ok(booking))
}

// GET /api/admin/bookings/:id/history
#[derive(Serialize)]
pub struct BookingHistory {
    booking: Booking,
    history: Vec<QueueHistoryEntry>,
}

pub async fn booking_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope<BookingHistory>>> {
    check_auth(&state, &headers, ALL_ROLES)?;

    let (booking, history) = {
        let conn = state.conn()?;
        let booking = queries::get_booking_by_id(&conn, &id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
        (booking, queries::get_history(&conn, &id)?)
    };
    Ok(ok(BookingHistory { booking, history }))
}

// GET /api/admin/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Envelope<BookingStats>>> {
    check_auth(&state, &headers, OPERATORS)?;

    let stats = {
        let conn = state.conn()?;
        queries::get_booking_stats(&conn)?
    };
    Ok(ok(stats))
}
