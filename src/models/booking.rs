use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub booking_number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub vehicle_model: String,
    pub vehicle_number_plate: String,
    pub service_id: i64,
    pub scheduled_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub scheduled_time: NaiveTime,
    pub duration_minutes: i32,
    pub pickup_required: bool,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub status: BookingStatus,
    pub amount_cents: i64,
    pub payment_confirmed: bool,
    pub payment_method: Option<String>,
    pub payment_screenshot: Option<String>,
    pub payment_notes: Option<String>,
    pub slot_number: Option<i32>,
    pub estimated_completion_time: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.scheduled_date.and_time(self.scheduled_time)
    }
}

/// Fields of a booking that has not been stored yet. Price and duration are
/// copied from the service at creation so later catalogue edits do not
/// rewrite history.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub vehicle_model: String,
    pub vehicle_number_plate: String,
    pub service_id: i64,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub duration_minutes: i32,
    pub pickup_required: bool,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    PaymentVerified,
    Confirmed,
    InQueue,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 7] = [
        BookingStatus::PendingPayment,
        BookingStatus::PaymentVerified,
        BookingStatus::Confirmed,
        BookingStatus::InQueue,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::PaymentVerified => "payment_verified",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InQueue => "in_queue",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Strict parse: unknown names are rejected rather than defaulted.
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|status| status.as_str() == wanted)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialises a time of day as `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Accepts `HH:MM` and `HH:MM:SS`.
    pub fn parse(s: &str) -> anyhow::Result<NaiveTime> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map_err(|_| anyhow::anyhow!("invalid time format: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in BookingStatus::ALL {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert_eq!(BookingStatus::parse("bogus"), None);
        assert_eq!(BookingStatus::parse(""), None);
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(
            BookingStatus::parse("IN_PROGRESS"),
            Some(BookingStatus::InProgress)
        );
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&BookingStatus::PaymentVerified).unwrap();
        assert_eq!(json, "\"payment_verified\"");
    }

    #[test]
    fn test_hhmm_parse_accepts_seconds() {
        assert_eq!(
            hhmm::parse("07:30:00").unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        assert!(hhmm::parse("25:00").is_err());
        assert!(hhmm::parse("noon").is_err());
    }
}
