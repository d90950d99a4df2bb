use chrono::{Duration, NaiveDateTime};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::config::QueuePolicy;
use crate::db::queries::{self, SlotAssignment};
use crate::errors::{AppError, AppResult};
use crate::models::{AdminUser, Booking, BookingStatus};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyPaymentRequest {
    pub booking_id: Option<String>,
    /// `false` only records the notes; defaults to `true`.
    pub verified: Option<bool>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub booking: Booking,
    pub slot_number: Option<i32>,
    pub estimated_completion_time: Option<NaiveDateTime>,
    /// 1-based place among the day's queued bookings at verification time.
    pub queue_position: Option<i64>,
}

pub fn next_slot_number(max_assigned: Option<i32>) -> i32 {
    max_assigned.unwrap_or(0) + 1
}

/// Scheduled start plus the booking's own service duration.
pub fn estimated_completion(booking: &Booking) -> NaiveDateTime {
    booking.starts_at() + Duration::minutes(booking.duration_minutes as i64)
}

/// Verifies payment for a `pending_payment` booking: assigns the next slot
/// number for its date, stamps the estimated completion time, moves it to
/// `payment_verified` and appends the history row, all in one transaction.
///
/// The transaction takes SQLite's write lock before reading the current
/// maximum, so concurrent verifications for the same date serialise instead
/// of racing to the same number.
pub fn verify_payment(
    conn: &mut Connection,
    request: &VerifyPaymentRequest,
    actor: &AdminUser,
    policy: &QueuePolicy,
    now: NaiveDateTime,
) -> AppResult<Verification> {
    let booking_id = request
        .booking_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation("booking_id is required".to_string()))?;
    let notes = request.notes.as_deref().map(str::trim).filter(|v| !v.is_empty());
    let payment_method = request
        .payment_method
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    if booking.status != BookingStatus::PendingPayment {
        return Err(AppError::InvalidState(format!(
            "booking {} is {}, not pending_payment",
            booking.booking_number, booking.status
        )));
    }

    if !request.verified.unwrap_or(true) {
        queries::update_payment_notes(&tx, booking_id, notes, &now)?;
        tx.commit()?;
        let booking = queries::get_booking_by_id(conn, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        return Ok(Verification {
            booking,
            slot_number: None,
            estimated_completion_time: None,
            queue_position: None,
        });
    }

    // A booking moved back to pending_payment keeps the slot it was given
    if let Some(existing) = booking.slot_number {
        return Err(AppError::InvalidState(format!(
            "booking {} already holds slot {existing} on {}",
            booking.booking_number, booking.scheduled_date
        )));
    }

    let ahead = queries::count_on_date_with_status(
        &tx,
        &booking.scheduled_date,
        &policy.queue_statuses,
    )?;
    let slot_number = next_slot_number(queries::max_slot_number(&tx, &booking.scheduled_date)?);
    let eta = estimated_completion(&booking);

    let assignment = SlotAssignment {
        slot_number,
        estimated_completion_time: eta,
        payment_method,
        notes,
    };
    match queries::assign_slot(&tx, booking_id, &assignment, &now) {
        Ok(1) => {}
        Ok(_) => {
            return Err(AppError::InvalidState(format!(
                "booking {} already has a slot assigned",
                booking.booking_number
            )))
        }
        Err(e) if queries::is_unique_violation(&e, "bookings.slot_number") => {
            return Err(AppError::Conflict(format!(
                "slot {slot_number} on {} is already assigned",
                booking.scheduled_date
            )))
        }
        Err(e) => return Err(e.into()),
    }

    queries::insert_history(
        &tx,
        booking_id,
        BookingStatus::PaymentVerified,
        Some(actor.id),
        Some(notes.unwrap_or("Payment verified")),
        &now,
    )?;
    tx.commit()?;

    tracing::info!(
        booking_number = %booking.booking_number,
        slot_number,
        admin = %actor.username,
        "payment verified"
    );

    let booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    Ok(Verification {
        booking,
        slot_number: Some(slot_number),
        estimated_completion_time: Some(eta),
        queue_position: Some(ahead + 1),
    })
}

/// Every queued booking, day by day, each day in slot order.
pub fn current_queue(conn: &Connection, policy: &QueuePolicy) -> AppResult<Vec<Booking>> {
    Ok(queries::get_bookings_by_status(conn, &policy.queue_statuses, None)?)
}
