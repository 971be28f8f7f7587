use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_ts, parse_ts};
use crate::models::{Booking, BookingStatus, Producer};

const BOOKING_COLUMNS: &str = "id, name, email, phone, notes, producer_id, plan_pid, start_time, end_time, \
     reschedule_token, reschedule_expires, cancel_token, cancel_expires, status, created_at, updated_at, cancelled_at";

const PRODUCER_COLUMNS: &str =
    "id, name, email, timezone, active, daily_start_minutes, daily_end_minutes, slack_webhook_url, created_at";

// ── Producers ──

pub fn upsert_producer(conn: &Connection, producer: &Producer) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO employees (id, name, email, timezone, active, daily_start_minutes, daily_end_minutes, slack_webhook_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           email = excluded.email,
           timezone = excluded.timezone,
           active = excluded.active,
           daily_start_minutes = excluded.daily_start_minutes,
           daily_end_minutes = excluded.daily_end_minutes,
           slack_webhook_url = excluded.slack_webhook_url",
        params![
            producer.id,
            producer.name,
            producer.email,
            producer.timezone,
            producer.active as i32,
            producer.daily_start_minutes,
            producer.daily_end_minutes,
            producer.slack_webhook_url,
            format_ts(&producer.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_producer(conn: &Connection, id: &str) -> anyhow::Result<Option<Producer>> {
    let row = conn
        .query_row(
            &format!("SELECT {PRODUCER_COLUMNS} FROM employees WHERE id = ?1"),
            params![id],
            |row| Ok(parse_producer_row(row)),
        )
        .optional()?;

    row.transpose()
}

/// Active producers in stable roster order (oldest first).
pub fn list_active_producers(conn: &Connection) -> anyhow::Result<Vec<Producer>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCER_COLUMNS} FROM employees WHERE active = 1 ORDER BY created_at ASC, id ASC"
    ))?;

    let rows = stmt.query_map([], |row| Ok(parse_producer_row(row)))?;

    let mut producers = vec![];
    for row in rows {
        producers.push(row??);
    }
    Ok(producers)
}

fn parse_producer_row(row: &rusqlite::Row) -> anyhow::Result<Producer> {
    let created_at: String = row.get(8)?;
    Ok(Producer {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        timezone: row.get(3)?,
        active: row.get::<_, i32>(4)? != 0,
        daily_start_minutes: row.get(5)?,
        daily_end_minutes: row.get(6)?,
        slack_webhook_url: row.get(7)?,
        created_at: parse_ts(&created_at)?,
    })
}

// ── Bookings ──

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            booking.id,
            booking.name,
            booking.email,
            booking.phone,
            booking.notes,
            booking.producer_id,
            booking.plan_pid,
            format_ts(&booking.start_time),
            format_ts(&booking.end_time),
            booking.reschedule_token,
            format_ts(&booking.reschedule_expires),
            booking.cancel_token,
            format_ts(&booking.cancel_expires),
            booking.status.as_str(),
            format_ts(&booking.created_at),
            format_ts(&booking.updated_at),
            booking.cancelled_at.as_ref().map(format_ts),
        ],
    )?;
    Ok(())
}

/// Writes the mutable scheduling fields of an existing booking.
pub fn update_booking_schedule(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET start_time = ?1, end_time = ?2, producer_id = ?3, notes = ?4, updated_at = ?5
         WHERE id = ?6 AND status = 'active'",
        params![
            format_ts(&booking.start_time),
            format_ts(&booking.end_time),
            booking.producer_id,
            booking.notes,
            format_ts(&booking.updated_at),
            booking.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn cancel_booking(conn: &Connection, id: &str, now: &DateTime<Utc>) -> anyhow::Result<bool> {
    let now = format_ts(now);
    let count = conn.execute(
        "UPDATE bookings SET status = 'cancelled', cancelled_at = ?1, updated_at = ?1
         WHERE id = ?2 AND status = 'active'",
        params![now, id],
    )?;
    Ok(count > 0)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    find_booking_where(conn, "id = ?1", id)
}

pub fn find_booking_by_reschedule_token(
    conn: &Connection,
    token: &str,
) -> anyhow::Result<Option<Booking>> {
    find_booking_where(conn, "reschedule_token = ?1", token)
}

pub fn find_booking_by_cancel_token(
    conn: &Connection,
    token: &str,
) -> anyhow::Result<Option<Booking>> {
    find_booking_where(conn, "cancel_token = ?1", token)
}

fn find_booking_where(
    conn: &Connection,
    predicate: &str,
    value: &str,
) -> anyhow::Result<Option<Booking>> {
    let row = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE {predicate}"),
            params![value],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    row.transpose()
}

/// Active bookings whose `[start, end)` overlaps the given interval, any producer.
pub fn get_bookings_overlapping(
    conn: &Connection,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = 'active' AND start_time < ?2 AND end_time > ?1
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(params![format_ts(start), format_ts(end)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Active bookings for one producer overlapping the interval, optionally
/// ignoring one booking (the one being rescheduled).
pub fn get_producer_conflicts(
    conn: &Connection,
    producer_id: &str,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    exclude_id: Option<&str>,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = 'active' AND producer_id = ?1 AND start_time < ?3 AND end_time > ?2
           AND (?4 IS NULL OR id != ?4)
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(
        params![producer_id, format_ts(start), format_ts(end), exclude_id],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Ids of producers holding an active booking that overlaps the interval.
pub fn get_conflicting_producer_ids(
    conn: &Connection,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    exclude_id: Option<&str>,
) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT producer_id FROM bookings
         WHERE status = 'active' AND producer_id IS NOT NULL
           AND start_time < ?2 AND end_time > ?1
           AND (?3 IS NULL OR id != ?3)",
    )?;

    let rows = stmt.query_map(
        params![format_ts(start), format_ts(end), exclude_id],
        |row| row.get::<_, String>(0),
    )?;

    let mut ids = HashSet::new();
    for row in rows {
        ids.insert(row?);
    }
    Ok(ids)
}

/// Number of active bookings for a producer starting within `[from, to)`.
pub fn count_producer_bookings_between(
    conn: &Connection,
    producer_id: &str,
    from: &DateTime<Utc>,
    to: &DateTime<Utc>,
) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE status = 'active' AND producer_id = ?1 AND start_time >= ?2 AND start_time < ?3",
        params![producer_id, format_ts(from), format_ts(to)],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_time: String = row.get(7)?;
    let end_time: String = row.get(8)?;
    let reschedule_expires: String = row.get(10)?;
    let cancel_expires: String = row.get(12)?;
    let status: String = row.get(13)?;
    let created_at: String = row.get(14)?;
    let updated_at: Option<String> = row.get(15)?;
    let cancelled_at: Option<String> = row.get(16)?;

    let created_at = parse_ts(&created_at)?;

    Ok(Booking {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        notes: row.get(4)?,
        producer_id: row.get(5)?,
        plan_pid: row.get(6)?,
        start_time: parse_ts(&start_time)?,
        end_time: parse_ts(&end_time)?,
        reschedule_token: row.get(9)?,
        reschedule_expires: parse_ts(&reschedule_expires)?,
        cancel_token: row.get(11)?,
        cancel_expires: parse_ts(&cancel_expires)?,
        status: BookingStatus::parse(&status),
        created_at,
        updated_at: updated_at
            .as_deref()
            .map(parse_ts)
            .transpose()?
            .unwrap_or(created_at),
        cancelled_at: cancelled_at.as_deref().map(parse_ts).transpose()?,
    })
}
