use serde::Serialize;

use super::{Booking, BookingStatus};

/// Outbound notification for dashboards and other observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    QueueUpdated {
        queue: Vec<Booking>,
    },
    BookingStatusChanged {
        booking_number: String,
        status: BookingStatus,
    },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::QueueUpdated { .. } => "queue:update",
            QueueEvent::BookingStatusChanged { .. } => "booking:status-update",
        }
    }
}
