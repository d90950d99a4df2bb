use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

use crate::models::booking::hhmm;
use crate::models::{
    AdminRole, AdminUser, Booking, BookingStatus, BusinessHours, LocationSettings, NewBooking,
    QueueHistoryEntry, Service,
};

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn fmt_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_datetime(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .with_context(|| format!("invalid stored timestamp: {s}"))
}

fn parse_status(s: &str) -> anyhow::Result<BookingStatus> {
    BookingStatus::parse(s).ok_or_else(|| anyhow::anyhow!("invalid stored status: {s}"))
}

// ── Services ──

pub fn list_active_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, price_cents, duration_minutes, is_active
         FROM services WHERE is_active = 1 ORDER BY price_cents ASC, id ASC",
    )?;
    let rows = stmt.query_map([], parse_service_row)?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

pub fn get_service(conn: &Connection, id: i64) -> anyhow::Result<Option<Service>> {
    let service = conn
        .query_row(
            "SELECT id, name, description, price_cents, duration_minutes, is_active
             FROM services WHERE id = ?1",
            params![id],
            parse_service_row,
        )
        .optional()?;
    Ok(service)
}

fn parse_service_row(row: &rusqlite::Row) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price_cents: row.get(3)?,
        duration_minutes: row.get(4)?,
        is_active: row.get::<_, i32>(5)? != 0,
    })
}

// ── Business Hours ──

pub fn get_business_hours(conn: &Connection) -> anyhow::Result<Vec<BusinessHours>> {
    let mut stmt = conn.prepare(
        "SELECT day_of_week, open_time, close_time, is_open FROM business_hours ORDER BY day_of_week",
    )?;
    let rows = stmt.query_map([], |row| Ok(parse_hours_row(row)))?;

    let mut hours = vec![];
    for row in rows {
        hours.push(row??);
    }
    Ok(hours)
}

pub fn get_business_hours_for_day(
    conn: &Connection,
    day_of_week: u8,
) -> anyhow::Result<Option<BusinessHours>> {
    let result = conn
        .query_row(
            "SELECT day_of_week, open_time, close_time, is_open FROM business_hours WHERE day_of_week = ?1",
            params![day_of_week],
            |row| Ok(parse_hours_row(row)),
        )
        .optional()?;
    result.transpose()
}

fn parse_hours_row(row: &rusqlite::Row) -> anyhow::Result<BusinessHours> {
    let day_of_week: u8 = row.get(0)?;
    let open_time: String = row.get(1)?;
    let close_time: String = row.get(2)?;
    let is_open: bool = row.get::<_, i32>(3)? != 0;

    BusinessHours::new(day_of_week, &open_time, &close_time, is_open)
}

// ── Admin Users ──

pub fn get_admin_by_token(conn: &Connection, token: &str) -> anyhow::Result<Option<AdminUser>> {
    let result = conn
        .query_row(
            "SELECT id, username, full_name, role FROM admin_users
             WHERE api_token = ?1 AND is_active = 1",
            params![token],
            |row| {
                let role: String = row.get(3)?;
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, role))
            },
        )
        .optional()?;

    match result {
        Some((id, username, full_name, role)) => {
            let role = AdminRole::parse(&role)
                .ok_or_else(|| anyhow::anyhow!("invalid stored role: {role}"))?;
            Ok(Some(AdminUser {
                id,
                username,
                full_name,
                role,
            }))
        }
        None => Ok(None),
    }
}

/// Creates the account or refreshes its name, role and token.
pub fn upsert_admin(
    conn: &Connection,
    username: &str,
    full_name: &str,
    role: AdminRole,
    api_token: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO admin_users (username, full_name, role, api_token) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(username) DO UPDATE SET
           full_name = excluded.full_name,
           role = excluded.role,
           api_token = excluded.api_token,
           is_active = 1",
        params![username, full_name, role.as_str(), api_token],
    )?;
    let id = conn.query_row(
        "SELECT id FROM admin_users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )?;
    Ok(id)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, booking_number, customer_name, customer_phone, customer_email, \
     vehicle_model, vehicle_number_plate, service_id, scheduled_date, scheduled_time, \
     duration_minutes, pickup_required, pickup_address, dropoff_address, status, amount_cents, \
     payment_confirmed, payment_method, payment_screenshot, payment_notes, slot_number, \
     estimated_completion_time, completed_at, created_at, updated_at";

pub fn insert_booking(
    conn: &Connection,
    id: &str,
    booking_number: &str,
    booking: &NewBooking,
    now: &NaiveDateTime,
) -> anyhow::Result<()> {
    let now = fmt_datetime(now);
    conn.execute(
        "INSERT INTO bookings (id, booking_number, customer_name, customer_phone, customer_email,
            vehicle_model, vehicle_number_plate, service_id, scheduled_date, scheduled_time,
            duration_minutes, pickup_required, pickup_address, dropoff_address, status,
            amount_cents, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)",
        params![
            id,
            booking_number,
            booking.customer_name,
            booking.customer_phone,
            booking.customer_email,
            booking.vehicle_model,
            booking.vehicle_number_plate,
            booking.service_id,
            fmt_date(&booking.scheduled_date),
            booking.scheduled_time.format(hhmm::FORMAT).to_string(),
            booking.duration_minutes,
            booking.pickup_required as i32,
            booking.pickup_address,
            booking.dropoff_address,
            BookingStatus::PendingPayment.as_str(),
            booking.amount_cents,
            now,
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let result = conn
        .query_row(&sql, params![id], |row| Ok(parse_booking_row(row)))
        .optional()?;
    result.transpose()
}

/// Most recent booking matching every given criterion.
pub fn find_latest_booking(
    conn: &Connection,
    booking_number: Option<&str>,
    phone: Option<&str>,
) -> anyhow::Result<Option<Booking>> {
    let mut sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE 1=1");
    let mut values: Vec<String> = vec![];

    if let Some(number) = booking_number {
        values.push(number.to_string());
        sql.push_str(&format!(" AND booking_number = ?{}", values.len()));
    }
    if let Some(phone) = phone {
        values.push(phone.to_string());
        sql.push_str(&format!(" AND customer_phone = ?{}", values.len()));
    }
    sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT 1");

    let result = conn
        .query_row(&sql, params_from_iter(values.iter()), |row| {
            Ok(parse_booking_row(row))
        })
        .optional()?;
    result.transpose()
}

pub fn get_bookings_on_date(conn: &Connection, date: &NaiveDate) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE scheduled_date = ?1 ORDER BY scheduled_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fmt_date(date)], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Bookings in any of `statuses`, optionally limited to one date, in queue
/// order: date, then slot number, then start time.
pub fn get_bookings_by_status(
    conn: &Connection,
    statuses: &[BookingStatus],
    date: Option<&NaiveDate>,
) -> anyhow::Result<Vec<Booking>> {
    if statuses.is_empty() {
        return Ok(vec![]);
    }

    let mut values: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    let placeholders = (1..=values.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE status IN ({placeholders})");
    if let Some(date) = date {
        values.push(fmt_date(date));
        sql.push_str(&format!(" AND scheduled_date = ?{}", values.len()));
    }
    sql.push_str(
        " ORDER BY scheduled_date ASC, slot_number IS NULL, slot_number ASC, scheduled_time ASC",
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_pending_payments(conn: &Connection) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1 ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![BookingStatus::PendingPayment.as_str()], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Highest slot number ever handed out for `date`, whatever the booking's
/// current status.
pub fn max_slot_number(conn: &Connection, date: &NaiveDate) -> anyhow::Result<Option<i32>> {
    let max = conn.query_row(
        "SELECT MAX(slot_number) FROM bookings WHERE scheduled_date = ?1",
        params![fmt_date(date)],
        |row| row.get(0),
    )?;
    Ok(max)
}

pub fn count_on_date_with_status(
    conn: &Connection,
    date: &NaiveDate,
    statuses: &[BookingStatus],
) -> anyhow::Result<i64> {
    if statuses.is_empty() {
        return Ok(0);
    }
    let mut values: Vec<String> = vec![fmt_date(date)];
    values.extend(statuses.iter().map(|s| s.as_str().to_string()));
    let placeholders = (2..=values.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");

    let count = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM bookings WHERE scheduled_date = ?1 AND status IN ({placeholders})"
        ),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;
    Ok(count)
}

pub struct SlotAssignment<'a> {
    pub slot_number: i32,
    pub estimated_completion_time: NaiveDateTime,
    pub payment_method: Option<&'a str>,
    pub notes: Option<&'a str>,
}

/// Marks the payment verified and stores the queue slot. Only touches a
/// booking that is still awaiting payment and has no slot yet; returns the
/// number of rows changed.
pub fn assign_slot(
    conn: &Connection,
    id: &str,
    assignment: &SlotAssignment<'_>,
    now: &NaiveDateTime,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE bookings SET
           status = ?1,
           payment_confirmed = 1,
           payment_method = COALESCE(?2, payment_method),
           payment_notes = COALESCE(?3, payment_notes),
           slot_number = ?4,
           estimated_completion_time = ?5,
           updated_at = ?6
         WHERE id = ?7 AND status = ?8 AND slot_number IS NULL",
        params![
            BookingStatus::PaymentVerified.as_str(),
            assignment.payment_method,
            assignment.notes,
            assignment.slot_number,
            fmt_datetime(&assignment.estimated_completion_time),
            fmt_datetime(now),
            id,
            BookingStatus::PendingPayment.as_str(),
        ],
    )?;
    Ok(count)
}

pub fn update_payment_notes(
    conn: &Connection,
    id: &str,
    notes: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE bookings SET payment_notes = ?1, updated_at = ?2 WHERE id = ?3",
        params![notes, fmt_datetime(now), id],
    )?;
    Ok(count)
}

/// Sets the status. Reaching `completed` stamps `completed_at` unless it is
/// already set.
pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let now = fmt_datetime(now);
    let count = if status == BookingStatus::Completed {
        conn.execute(
            "UPDATE bookings SET status = ?1, completed_at = COALESCE(completed_at, ?2), updated_at = ?2
             WHERE id = ?3",
            params![status.as_str(), now, id],
        )?
    } else {
        conn.execute(
            "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, id],
        )?
    };
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let scheduled_date: String = row.get(8)?;
    let scheduled_time: String = row.get(9)?;
    let status: String = row.get(14)?;
    let estimated_completion_time: Option<String> = row.get(21)?;
    let completed_at: Option<String> = row.get(22)?;
    let created_at: String = row.get(23)?;
    let updated_at: String = row.get(24)?;

    Ok(Booking {
        id: row.get(0)?,
        booking_number: row.get(1)?,
        customer_name: row.get(2)?,
        customer_phone: row.get(3)?,
        customer_email: row.get(4)?,
        vehicle_model: row.get(5)?,
        vehicle_number_plate: row.get(6)?,
        service_id: row.get(7)?,
        scheduled_date: NaiveDate::parse_from_str(&scheduled_date, DATE_FORMAT)
            .with_context(|| format!("invalid stored date: {scheduled_date}"))?,
        scheduled_time: hhmm::parse(&scheduled_time)?,
        duration_minutes: row.get(10)?,
        pickup_required: row.get::<_, i32>(11)? != 0,
        pickup_address: row.get(12)?,
        dropoff_address: row.get(13)?,
        status: parse_status(&status)?,
        amount_cents: row.get(15)?,
        payment_confirmed: row.get::<_, i32>(16)? != 0,
        payment_method: row.get(17)?,
        payment_screenshot: row.get(18)?,
        payment_notes: row.get(19)?,
        slot_number: row.get(20)?,
        estimated_completion_time: estimated_completion_time
            .as_deref()
            .map(parse_datetime)
            .transpose()?,
        completed_at: completed_at.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

// ── Queue History ──

pub fn insert_history(
    conn: &Connection,
    booking_id: &str,
    status: BookingStatus,
    changed_by: Option<i64>,
    notes: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO queue_history (booking_id, status_change, changed_by, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![booking_id, status.as_str(), changed_by, notes, fmt_datetime(now)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_history(conn: &Connection, booking_id: &str) -> anyhow::Result<Vec<QueueHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, status_change, changed_by, notes, created_at
         FROM queue_history WHERE booking_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| {
        let status: String = row.get(2)?;
        let created_at: String = row.get(5)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            status,
            row.get::<_, Option<i64>>(3)?,
            row.get::<_, Option<String>>(4)?,
            created_at,
        ))
    })?;

    let mut entries = vec![];
    for row in rows {
        let (id, booking_id, status, changed_by, notes, created_at) = row?;
        entries.push(QueueHistoryEntry {
            id,
            booking_id,
            status_change: parse_status(&status)?,
            changed_by,
            notes,
            created_at: parse_datetime(&created_at)?,
        });
    }
    Ok(entries)
}

// ── Location ──

pub fn get_active_location(conn: &Connection) -> anyhow::Result<Option<LocationSettings>> {
    let location = conn
        .query_row(
            "SELECT id, name, address, latitude, longitude, phone, email
             FROM location_settings WHERE is_active = 1 ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                Ok(LocationSettings {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    address: row.get(2)?,
                    latitude: row.get(3)?,
                    longitude: row.get(4)?,
                    phone: row.get(5)?,
                    email: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(location)
}

// ── Stats ──

#[derive(Debug, Serialize)]
pub struct BookingStats {
    pub total_bookings: i64,
    pub completed_bookings: i64,
    pub cancelled_bookings: i64,
    pub active_bookings: i64,
    pub total_revenue_cents: i64,
    pub pickup_bookings: i64,
}

pub fn get_booking_stats(conn: &Connection) -> anyhow::Result<BookingStats> {
    let stats = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status NOT IN ('completed', 'cancelled') THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'completed' THEN amount_cents ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN pickup_required = 1 THEN 1 ELSE 0 END), 0)
         FROM bookings",
        [],
        |row| {
            Ok(BookingStats {
                total_bookings: row.get(0)?,
                completed_bookings: row.get(1)?,
                cancelled_bookings: row.get(2)?,
                active_bookings: row.get(3)?,
                total_revenue_cents: row.get(4)?,
                pickup_bookings: row.get(5)?,
            })
        },
    )?;
    Ok(stats)
}

/// True when `err` is a UNIQUE violation on the given `table.column`.
pub fn is_unique_violation(err: &anyhow::Error, column: &str) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, msg)) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.as_deref().is_some_and(|m| m.contains("UNIQUE") && m.contains(column))
        }
        _ => false,
    }
}
