use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{local_now, ok, Envelope};
use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::booking::hhmm;
use crate::models::business_hours::to_human_readable;
use crate::models::{Booking, BusinessHours, LocationSettings, Service};
use crate::services::booking::{self, CreateBookingRequest};
use crate::state::AppState;

// GET /api/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Envelope<Vec<Service>>>> {
    let services = {
        let conn = state.conn()?;
        queries::list_active_services(&conn)?
    };
    Ok(ok(services))
}

// GET /api/slots?date=&service_id=
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: Option<String>,
    pub service_id: Option<i64>,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    date: String,
    service_id: i64,
    duration_minutes: i32,
    slots: Vec<String>,
}

pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> AppResult<Json<Envelope<SlotsResponse>>> {
    let raw_date = query
        .date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::Validation("date is required".to_string()))?;
    let service_id = query
        .service_id
        .ok_or_else(|| AppError::Validation("service_id is required".to_string()))?;
    let date = booking::parse_date(raw_date)?;

    let (service, open) = {
        let conn = state.conn()?;
        booking::open_slots(&conn, date, service_id, local_now(), &state.config.slots)?
    };

    Ok(ok(SlotsResponse {
        date: date.format(queries::DATE_FORMAT).to_string(),
        service_id: service.id,
        duration_minutes: service.duration_minutes,
        slots: open
            .iter()
            .map(|t| t.format(hhmm::FORMAT).to_string())
            .collect(),
    }))
}

// POST /api/bookings
#[derive(Serialize)]
pub struct CreatedBooking {
    booking_number: String,
    amount_cents: i64,
    booking: Booking,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateBookingRequest>,
) -> AppResult<(StatusCode, Json<Envelope<CreatedBooking>>)> {
    let now = local_now();
    let prefix = state.config.booking_prefix.clone();

    let created = {
        let conn = state.conn()?;
        booking::create_booking(&conn, &request, &state.config, now, || {
            booking::generate_booking_number(&prefix, now.date())
        })?
    };

    Ok((
        StatusCode::CREATED,
        ok(CreatedBooking {
            booking_number: created.booking_number.clone(),
            amount_cents: created.amount_cents,
            booking: created,
        }),
    ))
}

// GET /api/bookings/search?booking_number=|phone=
#[derive(Deserialize)]
pub struct SearchQuery {
    pub booking_number: Option<String>,
    pub phone: Option<String>,
}

pub async fn search_booking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Envelope<Booking>>> {
    let found = {
        let conn = state.conn()?;
        booking::search(&conn, query.booking_number.as_deref(), query.phone.as_deref())?
    };
    Ok(ok(found))
}

// GET /api/business-hours
#[derive(Serialize)]
pub struct HoursResponse {
    summary: String,
    hours: Vec<BusinessHours>,
}

pub async fn get_business_hours(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Envelope<HoursResponse>>> {
    let hours = {
        let conn = state.conn()?;
        queries::get_business_hours(&conn)?
    };
    Ok(ok(HoursResponse {
        summary: to_human_readable(&hours),
        hours,
    }))
}

// GET /api/location
pub async fn get_location(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Envelope<LocationSettings>>> {
    let location = {
        let conn = state.conn()?;
        queries::get_active_location(&conn)?
    };
    location
        .map(ok)
        .ok_or_else(|| AppError::NotFound("location".to_string()))
}
