use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::config::SlotPolicy;
use crate::models::{Booking, BusinessHours};

/// Time already taken on the queried date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookedInterval {
    pub start: NaiveTime,
    pub duration_minutes: i32,
}

impl BookedInterval {
    fn on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let start = date.and_time(self.start);
        (start, start + Duration::minutes(self.duration_minutes as i64))
    }
}

/// Reduces a day's bookings to the intervals that still block new ones.
pub fn blocking_intervals(bookings: &[Booking], policy: &SlotPolicy) -> Vec<BookedInterval> {
    bookings
        .iter()
        .filter(|b| policy.blocks(b.status))
        .map(|b| BookedInterval {
            start: b.scheduled_time,
            duration_minutes: b.duration_minutes,
        })
        .collect()
}

/// Start times on `date` where a service of `duration_minutes` fits inside
/// opening hours without overlapping any `existing` interval.
///
/// Candidates are `policy.step_minutes` apart, starting at opening time.
/// When `date` is today they start at the later of opening time and
/// `now + policy.same_day_buffer_minutes`, cut to the whole minute. `now`
/// plays no other part. A closed or unconfigured weekday yields an empty
/// list.
pub fn available_slots(
    date: NaiveDate,
    hours: Option<&BusinessHours>,
    existing: &[BookedInterval],
    duration_minutes: i32,
    now: NaiveDateTime,
    policy: &SlotPolicy,
) -> Vec<NaiveTime> {
    let hours = match hours {
        Some(h) if h.is_open => h,
        _ => return vec![],
    };
    if duration_minutes <= 0 || policy.step_minutes <= 0 {
        return vec![];
    }

    let open = date.and_time(hours.open_time);
    let close = date.and_time(hours.close_time);
    let step = Duration::minutes(policy.step_minutes);
    let duration = Duration::minutes(duration_minutes as i64);

    let mut candidate = open;
    if date == now.date() {
        let earliest = now + Duration::minutes(policy.same_day_buffer_minutes);
        let earliest = earliest
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(earliest);
        candidate = candidate.max(earliest);
    }

    let taken: Vec<(NaiveDateTime, NaiveDateTime)> = existing.iter().map(|b| b.on(date)).collect();

    let mut slots = vec![];
    while candidate < close {
        let candidate_end = candidate + duration;
        if candidate_end <= close && !overlaps_any(candidate, candidate_end, &taken) {
            slots.push(candidate.time());
        }
        candidate += step;
    }
    slots
}

pub fn is_slot_available(
    date: NaiveDate,
    time: NaiveTime,
    hours: Option<&BusinessHours>,
    existing: &[BookedInterval],
    duration_minutes: i32,
    now: NaiveDateTime,
    policy: &SlotPolicy,
) -> bool {
    available_slots(date, hours, existing, duration_minutes, now, policy).contains(&time)
}

// Half-open intervals: touching ends do not overlap.
fn overlaps_any(
    start: NaiveDateTime,
    end: NaiveDateTime,
    taken: &[(NaiveDateTime, NaiveDateTime)],
) -> bool {
    taken
        .iter()
        .any(|(taken_start, taken_end)| *taken_start < end && start < *taken_end)
}
