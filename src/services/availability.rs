use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, Utc, Weekday};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{intervals_overlap, AvailabilityQuery, Booking, DaySlots};

/// Local business hours, minutes from midnight.
pub const BUSINESS_START_MINUTES: i64 = 9 * 60;
pub const BUSINESS_END_MINUTES: i64 = 17 * 60;

/// Loads the bookings that can affect the window and computes the slot grid.
pub fn available_slots(
    conn: &Connection,
    query: &AvailabilityQuery,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<DaySlots>> {
    let (window_start, window_end) = query_window(query, now);
    let bookings = queries::get_bookings_overlapping(conn, &window_start, &window_end)?;

    tracing::debug!(
        days = query.days,
        step = query.step_minutes,
        tz_offset = query.tz_offset_minutes,
        bookings = bookings.len(),
        "computing availability"
    );

    Ok(compute_availability(query, now, &bookings))
}

/// Absolute bounds covering every local day the query can return.
pub fn query_window(query: &AvailabilityQuery, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = Duration::minutes(query.tz_offset_minutes as i64);
    let today = local_today(now, query.tz_offset_minutes);
    let start = today.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc() - offset);
    let end = start.map(|s| s + Duration::days(query.days as i64));
    match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => (now, now + Duration::days(query.days as i64 + 1)),
    }
}

/// Slot grid for the next `query.days` local days.
///
/// Weekends are closed. Each candidate `[start, start + step)` lies within
/// local 09:00–17:00, must end after `now`, and must not overlap any of
/// `bookings` regardless of producer.
pub fn compute_availability(
    query: &AvailabilityQuery,
    now: DateTime<Utc>,
    bookings: &[Booking],
) -> Vec<DaySlots> {
    let step = query.step_minutes as i64;
    let offset = Duration::minutes(query.tz_offset_minutes as i64);
    let today = local_today(now, query.tz_offset_minutes);

    let active: Vec<&Booking> = bookings.iter().filter(|b| b.is_active()).collect();

    (0..query.days as i64)
        .filter_map(|d| today.checked_add_signed(Duration::days(d)))
        .map(|date| {
            let slots = if is_weekend(date) {
                Vec::new()
            } else {
                day_candidates(date, step)
                    .map(|local_start| local_start - offset)
                    .filter(|start| {
                        let end = *start + Duration::minutes(step);
                        end > now
                            && !active
                                .iter()
                                .any(|b| intervals_overlap(*start, end, b.start_time, b.end_time))
                    })
                    .map(|start| start.to_rfc3339_opts(SecondsFormat::Millis, true))
                    .collect()
            };

            DaySlots {
                date: date.format("%Y-%m-%d").to_string(),
                slots,
            }
        })
        .collect()
}

fn local_today(now: DateTime<Utc>, tz_offset_minutes: i32) -> NaiveDate {
    (now + Duration::minutes(tz_offset_minutes as i64)).date_naive()
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Candidate starts for one local day, expressed as if local time were UTC.
fn day_candidates(date: NaiveDate, step: i64) -> impl Iterator<Item = DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    (0..)
        .map(move |k| BUSINESS_START_MINUTES + k * step)
        .take_while(move |minute| minute + step <= BUSINESS_END_MINUTES)
        .filter_map(move |minute| midnight.map(|m| m + Duration::minutes(minute)))
}
