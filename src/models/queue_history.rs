use chrono::NaiveDateTime;
use serde::Serialize;

use super::BookingStatus;

/// One row of the append-only status audit log.
#[derive(Debug, Clone, Serialize)]
pub struct QueueHistoryEntry {
    pub id: i64,
    pub booking_id: String,
    pub status_change: BookingStatus,
    pub changed_by: Option<i64>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}
