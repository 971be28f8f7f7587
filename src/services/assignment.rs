use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::Producer;

/// Horizon used to measure each producer's upcoming load.
pub const LOAD_WINDOW_DAYS: i64 = 14;

/// Picks the producer for `[start, end)`.
///
/// An explicitly requested producer only has to exist and be active; the
/// caller re-checks it for conflicts. Otherwise the active producer with no
/// overlapping booking and the fewest bookings in the next
/// [`LOAD_WINDOW_DAYS`] wins, roster order breaking ties. `exclude_booking`
/// keeps a booking being moved from disqualifying its own producer.
///
/// Returns `Ok(None)` when nobody is available.
pub fn select_producer(
    conn: &Connection,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    requested: Option<&str>,
    exclude_booking: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Producer>> {
    if let Some(id) = requested {
        let producer = queries::get_producer(conn, id)?.filter(|p| p.active);
        if producer.is_none() {
            tracing::info!(producer_id = id, "requested producer missing or inactive");
        }
        return Ok(producer);
    }

    let roster = queries::list_active_producers(conn)?;
    let busy = queries::get_conflicting_producer_ids(conn, start, end, exclude_booking)?;

    let horizon = now + Duration::days(LOAD_WINDOW_DAYS);
    let mut best: Option<(i64, Producer)> = None;

    for producer in roster.into_iter().filter(|p| !busy.contains(&p.id)) {
        let load = queries::count_producer_bookings_between(conn, &producer.id, &now, &horizon)?;
        tracing::debug!(producer_id = %producer.id, load, "assignment candidate");
        if best.as_ref().map_or(true, |(best_load, _)| load < *best_load) {
            best = Some((load, producer));
        }
    }

    Ok(best.map(|(_, producer)| producer))
}
