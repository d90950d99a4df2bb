use std::env;

use crate::models::BookingStatus;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub booking_prefix: String,
    pub booking_number_attempts: u32,
    pub slots: SlotPolicy,
    pub queue: QueuePolicy,
    pub notify_webhook_url: Option<String>,
    pub notify_webhook_secret: String,
    pub notify_timeout_secs: u64,
}

/// Parameters of the slot grid.
#[derive(Clone, Debug)]
pub struct SlotPolicy {
    pub step_minutes: i64,
    pub same_day_buffer_minutes: i64,
    /// Bookings in these statuses do not occupy their time.
    pub free_statuses: Vec<BookingStatus>,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            step_minutes: 30,
            same_day_buffer_minutes: 30,
            free_statuses: vec![BookingStatus::Cancelled],
        }
    }
}

impl SlotPolicy {
    pub fn blocks(&self, status: BookingStatus) -> bool {
        !self.free_statuses.contains(&status)
    }
}

#[derive(Clone, Debug)]
pub struct QueuePolicy {
    /// Statuses that count as waiting in, or being served from, the day's queue.
    pub queue_statuses: Vec<BookingStatus>,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            queue_statuses: vec![
                BookingStatus::PaymentVerified,
                BookingStatus::Confirmed,
                BookingStatus::InQueue,
                BookingStatus::InProgress,
            ],
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "carwash.db".to_string(),
            admin_token: "changeme".to_string(),
            booking_prefix: "CW".to_string(),
            booking_number_attempts: 10,
            slots: SlotPolicy::default(),
            queue: QueuePolicy::default(),
            notify_webhook_url: None,
            notify_webhook_secret: String::new(),
            notify_timeout_secs: 5,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parse_var("PORT").unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or(defaults.admin_token),
            booking_prefix: env::var("BOOKING_PREFIX").unwrap_or(defaults.booking_prefix),
            booking_number_attempts: parse_var("BOOKING_NUMBER_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.booking_number_attempts),
            slots: SlotPolicy {
                step_minutes: parse_var("SLOT_STEP_MINUTES")
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.slots.step_minutes),
                same_day_buffer_minutes: parse_var("SAME_DAY_BUFFER_MINUTES")
                    .unwrap_or(defaults.slots.same_day_buffer_minutes),
                free_statuses: env::var("SLOT_FREE_STATUSES")
                    .map(|v| parse_status_list("SLOT_FREE_STATUSES", &v))
                    .unwrap_or(defaults.slots.free_statuses),
            },
            queue: QueuePolicy {
                queue_statuses: env::var("QUEUE_STATUSES")
                    .map(|v| parse_status_list("QUEUE_STATUSES", &v))
                    .unwrap_or(defaults.queue.queue_statuses),
            },
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            notify_webhook_secret: env::var("NOTIFY_WEBHOOK_SECRET").unwrap_or_default(),
            notify_timeout_secs: parse_var("NOTIFY_TIMEOUT_SECS")
                .unwrap_or(defaults.notify_timeout_secs),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

pub fn parse_status_list(var: &str, raw: &str) -> Vec<BookingStatus> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            let status = BookingStatus::parse(s);
            if status.is_none() {
                tracing::warn!(var, value = s, "ignoring unknown booking status");
            }
            status
        })
        .collect()
}
