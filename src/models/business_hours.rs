use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::booking::hhmm;

/// Opening window for one weekday. `day_of_week` counts from Sunday = 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessHours {
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub open_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub close_time: NaiveTime,
    pub is_open: bool,
}

impl BusinessHours {
    pub fn new(day_of_week: u8, open: &str, close: &str, is_open: bool) -> anyhow::Result<Self> {
        if day_of_week > 6 {
            return Err(anyhow::anyhow!("invalid weekday: {day_of_week}"));
        }
        let open_time = hhmm::parse(open)?;
        let close_time = hhmm::parse(close)?;
        if close_time <= open_time {
            return Err(anyhow::anyhow!("closing time {close} is not after opening time {open}"));
        }
        Ok(Self {
            day_of_week,
            open_time,
            close_time,
            is_open,
        })
    }
}

pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn to_human_readable(hours: &[BusinessHours]) -> String {
    const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

    let mut sorted: Vec<&BusinessHours> = hours.iter().filter(|h| h.is_open).collect();
    // Monday first
    sorted.sort_by_key(|h| (h.day_of_week + 6) % 7);

    sorted
        .iter()
        .map(|h| {
            format!(
                "{}: {}-{}",
                DAY_NAMES[h.day_of_week as usize],
                h.open_time.format(hhmm::FORMAT),
                h.close_time.format(hhmm::FORMAT)
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
