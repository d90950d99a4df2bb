use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;
use rusqlite::Connection;
use serde::Deserialize;

use crate::config::{AppConfig, SlotPolicy};
use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::booking::hhmm;
use crate::models::business_hours::weekday_index;
use crate::models::{Booking, NewBooking, Service};
use crate::services::slots;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_number_plate: Option<String>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub pickup_required: bool,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
}

/// `PREFIX` + `YYYYMMDD` + four random digits.
pub fn generate_booking_number(prefix: &str, today: NaiveDate) -> String {
    let suffix: u32 = rand::rng().random_range(0..10_000);
    format!("{prefix}{}{suffix:04}", today.format("%Y%m%d"))
}

pub fn sanitize(input: &str) -> String {
    input.trim().replace(['<', '>'], "")
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

fn required(field: &Option<String>, name: &str) -> AppResult<String> {
    field
        .as_deref()
        .map(sanitize)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn optional(field: &Option<String>) -> Option<String> {
    field.as_deref().map(sanitize).filter(|v| !v.is_empty())
}

pub fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), queries::DATE_FORMAT)
        .map_err(|_| AppError::Validation(format!("invalid date: {raw}")))
}

/// Free start times for an active service on `date`.
pub fn open_slots(
    conn: &Connection,
    date: NaiveDate,
    service_id: i64,
    now: NaiveDateTime,
    policy: &SlotPolicy,
) -> AppResult<(Service, Vec<NaiveTime>)> {
    let service = queries::get_service(conn, service_id)?
        .filter(|s| s.is_active)
        .ok_or_else(|| AppError::NotFound(format!("service {service_id}")))?;

    let hours = queries::get_business_hours_for_day(conn, weekday_index(date))?;
    let day = queries::get_bookings_on_date(conn, &date)?;
    let taken = slots::blocking_intervals(&day, policy);
    let open = slots::available_slots(
        date,
        hours.as_ref(),
        &taken,
        service.duration_minutes,
        now,
        policy,
    );
    Ok((service, open))
}

/// Validates the request, checks the requested start is still free and
/// stores a new `pending_payment` booking.
///
/// `next_number` supplies candidate booking numbers. A candidate that
/// collides with an existing number is retried, up to
/// `config.booking_number_attempts` times, before giving up with
/// `AppError::Conflict`.
pub fn create_booking(
    conn: &Connection,
    request: &CreateBookingRequest,
    config: &AppConfig,
    now: NaiveDateTime,
    mut next_number: impl FnMut() -> String,
) -> AppResult<Booking> {
    let service_id = request
        .service_id
        .ok_or_else(|| AppError::Validation("service_id is required".to_string()))?;
    let customer_name = required(&request.customer_name, "customer_name")?;
    let customer_phone = required(&request.customer_phone, "customer_phone")?;
    let vehicle_model = required(&request.vehicle_model, "vehicle_model")?;
    let vehicle_number_plate = required(&request.vehicle_number_plate, "vehicle_number_plate")?;
    let scheduled_date = parse_date(&required(&request.scheduled_date, "scheduled_date")?)?;
    if scheduled_date < now.date() {
        return Err(AppError::Validation(format!(
            "scheduled_date {scheduled_date} is in the past"
        )));
    }
    let raw_time = required(&request.scheduled_time, "scheduled_time")?;
    let scheduled_time = hhmm::parse(&raw_time)
        .map_err(|_| AppError::Validation(format!("invalid time: {raw_time}")))?;

    let customer_email = optional(&request.customer_email);
    if let Some(email) = &customer_email {
        if !is_valid_email(email) {
            return Err(AppError::Validation("invalid email format".to_string()));
        }
    }

    let (service, open) = open_slots(conn, scheduled_date, service_id, now, &config.slots)?;
    if !open.contains(&scheduled_time) {
        return Err(AppError::Conflict(format!(
            "{} {} is not available",
            scheduled_date,
            scheduled_time.format(hhmm::FORMAT)
        )));
    }

    let new_booking = NewBooking {
        customer_name,
        customer_phone,
        customer_email,
        vehicle_model,
        vehicle_number_plate,
        service_id: service.id,
        scheduled_date,
        scheduled_time,
        duration_minutes: service.duration_minutes,
        pickup_required: request.pickup_required,
        pickup_address: optional(&request.pickup_address),
        dropoff_address: optional(&request.dropoff_address),
        amount_cents: service.price_cents,
    };

    let id = uuid::Uuid::new_v4().to_string();
    for attempt in 1..=config.booking_number_attempts {
        let number = next_number();
        match queries::insert_booking(conn, &id, &number, &new_booking, &now) {
            Ok(()) => {
                tracing::info!(booking_number = %number, service = %service.name, "booking created");
                return queries::get_booking_by_id(conn, &id)?
                    .ok_or_else(|| AppError::NotFound(format!("booking {id}")));
            }
            Err(e) if queries::is_unique_violation(&e, "bookings.booking_number") => {
                tracing::warn!(booking_number = %number, attempt, "booking number collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Conflict(
        "could not generate a unique booking number".to_string(),
    ))
}

/// Latest booking matching the booking number and/or phone.
pub fn search(
    conn: &Connection,
    booking_number: Option<&str>,
    phone: Option<&str>,
) -> AppResult<Booking> {
    let booking_number = booking_number.map(str::trim).filter(|v| !v.is_empty());
    let phone = phone.map(str::trim).filter(|v| !v.is_empty());
    if booking_number.is_none() && phone.is_none() {
        return Err(AppError::Validation(
            "booking_number or phone is required".to_string(),
        ));
    }

    queries::find_latest_booking(conn, booking_number, phone)?
        .ok_or_else(|| AppError::NotFound("booking".to_string()))
}
