use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{AdminUser, Booking, BookingStatus};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStatusRequest {
    pub booking_id: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// Applies an admin status change and logs it in the same transaction.
///
/// Any of the seven statuses may follow any other. `completed_at` is set the
/// first time a booking reaches `completed` and is left alone afterwards.
pub fn update_status(
    conn: &mut Connection,
    request: &UpdateStatusRequest,
    actor: &AdminUser,
    now: NaiveDateTime,
) -> AppResult<Booking> {
    let booking_id = request
        .booking_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation("booking_id is required".to_string()))?;
    let raw_status = request
        .status
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Validation("status is required".to_string()))?;
    let status = BookingStatus::parse(raw_status)
        .ok_or_else(|| AppError::Validation(format!("invalid status: {raw_status}")))?;

    let notes = request
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Status changed to {status}"));

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let previous = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    queries::update_booking_status(&tx, booking_id, status, &now)?;
    queries::insert_history(&tx, booking_id, status, Some(actor.id), Some(&notes), &now)?;
    tx.commit()?;

    tracing::info!(
        booking_number = %previous.booking_number,
        from = %previous.status,
        to = %status,
        admin = %actor.username,
        "booking status updated"
    );

    queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}
