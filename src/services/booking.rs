use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::models::{Booking, BookingStatus, Producer, ValidatedBooking};
use crate::services::assignment::select_producer;

/// Lifetime of reschedule and cancel links, from creation.
pub const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug)]
pub enum BookingError {
    NoProducerAvailable,
    SlotTaken,
    InvalidToken,
    Storage(anyhow::Error),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::NoProducerAvailable => write!(f, "no producer available"),
            BookingError::SlotTaken => write!(f, "slot already taken"),
            BookingError::InvalidToken => write!(f, "invalid or expired token"),
            BookingError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<anyhow::Error> for BookingError {
    fn from(err: anyhow::Error) -> Self {
        BookingError::Storage(err)
    }
}

impl From<rusqlite::Error> for BookingError {
    fn from(err: rusqlite::Error) -> Self {
        BookingError::Storage(err.into())
    }
}

#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub booking: Booking,
    pub producer: Producer,
    /// Start time before the move, for reschedules.
    pub previous_start: Option<DateTime<Utc>>,
}

impl BookingOutcome {
    pub fn is_reschedule(&self) -> bool {
        self.previous_start.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub booking: Booking,
    pub already_cancelled: bool,
}

/// Creates a booking, or moves the one identified by the request's
/// reschedule token.
///
/// Token resolution, producer selection, the per-producer conflict check and
/// the write all happen in one `IMMEDIATE` transaction, so two overlapping
/// bookings for the same producer cannot both commit.
pub fn book(
    conn: &mut Connection,
    request: &ValidatedBooking,
    now: DateTime<Utc>,
) -> Result<BookingOutcome, BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing = match request.reschedule_token.as_deref() {
        Some(token) => Some(resolve_reschedule_token(&tx, token, now)?),
        None => None,
    };
    let exclude = existing.as_ref().map(|b| b.id.as_str());

    let producer = select_producer(
        &tx,
        &request.start,
        &request.end,
        request.producer_id.as_deref(),
        exclude,
        now,
    )?
    .ok_or(BookingError::NoProducerAvailable)?;

    let conflicts =
        queries::get_producer_conflicts(&tx, &producer.id, &request.start, &request.end, exclude)?;
    if let Some(conflict) = conflicts.first() {
        tracing::info!(
            producer_id = %producer.id,
            conflicting_booking = %conflict.id,
            start = %request.start,
            "slot already taken"
        );
        return Err(BookingError::SlotTaken);
    }

    let (booking, previous_start) = match existing {
        Some(mut booking) => {
            let previous_start = booking.start_time;
            booking.start_time = request.start;
            booking.end_time = request.end;
            booking.producer_id = Some(producer.id.clone());
            booking.notes = request.notes.clone().or(booking.notes);
            booking.updated_at = now;

            if !queries::update_booking_schedule(&tx, &booking)? {
                return Err(BookingError::InvalidToken);
            }
            (booking, Some(previous_start))
        }
        None => {
            let booking = new_booking(request, &producer, now);
            queries::insert_booking(&tx, &booking)?;
            (booking, None)
        }
    };

    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        producer_id = %producer.id,
        start = %booking.start_time,
        rescheduled = previous_start.is_some(),
        "booking saved"
    );

    Ok(BookingOutcome {
        booking,
        producer,
        previous_start,
    })
}

/// Soft-cancels the booking owning `token`. Repeat cancels are no-ops.
pub fn cancel(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<CancelOutcome, BookingError> {
    let mut booking = find_for_cancel(conn, token, now)?;

    if booking.status == BookingStatus::Cancelled {
        return Ok(CancelOutcome {
            booking,
            already_cancelled: true,
        });
    }

    queries::cancel_booking(conn, &booking.id, &now)?;
    booking.status = BookingStatus::Cancelled;
    booking.cancelled_at = Some(now);
    booking.updated_at = now;

    tracing::info!(booking_id = %booking.id, "booking cancelled");

    Ok(CancelOutcome {
        booking,
        already_cancelled: false,
    })
}

/// The booking a cancel link points at, cancelled or not. Read-only.
pub fn find_for_cancel(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Booking, BookingError> {
    queries::find_booking_by_cancel_token(conn, token)?
        .filter(|b| b.cancel_expires > now)
        .ok_or(BookingError::InvalidToken)
}

/// The active booking a reschedule link points at.
pub fn lookup_for_reschedule(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Booking, BookingError> {
    resolve_reschedule_token(conn, token, now)
}

/// The active booking behind either of its link tokens.
pub fn find_by_any_token(conn: &Connection, token: &str) -> Result<Booking, BookingError> {
    let booking = match queries::find_booking_by_reschedule_token(conn, token)? {
        Some(b) => Some(b),
        None => queries::find_booking_by_cancel_token(conn, token)?,
    };

    booking
        .filter(Booking::is_active)
        .ok_or(BookingError::InvalidToken)
}

fn resolve_reschedule_token(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Booking, BookingError> {
    queries::find_booking_by_reschedule_token(conn, token)?
        .filter(|b| b.is_active() && b.reschedule_expires > now)
        .ok_or_else(|| {
            tracing::info!("reschedule token unknown, expired or cancelled");
            BookingError::InvalidToken
        })
}

fn new_booking(request: &ValidatedBooking, producer: &Producer, now: DateTime<Utc>) -> Booking {
    let expires = now + Duration::days(TOKEN_TTL_DAYS);
    Booking {
        id: uuid::Uuid::new_v4().to_string(),
        name: request.name.clone(),
        email: request.email.clone(),
        phone: request.phone.clone(),
        notes: request.notes.clone(),
        producer_id: Some(producer.id.clone()),
        plan_pid: request.context.plan_pid.clone(),
        start_time: request.start,
        end_time: request.end,
        reschedule_token: generate_token(),
        reschedule_expires: expires,
        cancel_token: generate_token(),
        cancel_expires: expires,
        status: BookingStatus::Active,
        created_at: now,
        updated_at: now,
        cancelled_at: None,
    }
}

fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::BookingRequest;
    use chrono::TimeZone;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn add_producer(conn: &Connection, id: &str, order: u32) {
        let producer = Producer {
            id: id.to_string(),
            name: format!("Producer {id}"),
            email: format!("{id}@studio.example"),
            timezone: "America/Chicago".to_string(),
            active: true,
            daily_start_minutes: 540,
            daily_end_minutes: 1020,
            slack_webhook_url: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, order, 0, 0, 0).unwrap(),
        };
        queries::upsert_producer(conn, &producer).unwrap();
    }

    fn request(start_iso: &str, producer: Option<&str>) -> ValidatedBooking {
        BookingRequest {
            name: "Dana Client".to_string(),
            email: "dana@example.com".to_string(),
            start_iso: start_iso.to_string(),
            producer_id: producer.map(str::to_string),
            notes: Some("Brand film".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    fn reschedule(token: &str, start_iso: &str) -> ValidatedBooking {
        let mut req = request(start_iso, None);
        req.reschedule_token = Some(token.to_string());
        req.notes = None;
        req
    }

    #[test]
    fn test_new_booking_issues_tokens() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);

        let outcome = book(&mut conn, &request("2024-03-04T15:00:00Z", None), now()).unwrap();
        let booking = &outcome.booking;

        assert!(!outcome.is_reschedule());
        assert_eq!(outcome.producer.id, "p");
        assert_eq!(booking.duration_minutes(), 30);
        assert_ne!(booking.reschedule_token, booking.cancel_token);
        assert_eq!(booking.reschedule_token.len(), 32);
        assert_eq!(booking.reschedule_expires, now() + Duration::days(30));
        assert_eq!(booking.cancel_expires, now() + Duration::days(30));

        let stored = queries::get_booking_by_id(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(stored.start_time, booking.start_time);
        assert_eq!(stored.producer_id.as_deref(), Some("p"));
        assert_eq!(stored.notes.as_deref(), Some("Brand film"));
    }

    #[test]
    fn test_explicit_conflicting_producer_is_slot_taken() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);
        add_producer(&conn, "q", 2);

        // 10:00-10:30 Central for P.
        book(&mut conn, &request("2024-03-04T15:00:00Z", Some("p")), now()).unwrap();

        let err = book(&mut conn, &request("2024-03-04T15:15:00Z", Some("p")), now()).unwrap_err();
        assert!(matches!(err, BookingError::SlotTaken));
    }

    #[test]
    fn test_auto_assign_moves_to_free_producer() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);
        add_producer(&conn, "q", 2);

        book(&mut conn, &request("2024-03-04T15:00:00Z", Some("p")), now()).unwrap();
        let outcome = book(&mut conn, &request("2024-03-04T15:15:00Z", None), now()).unwrap();
        assert_eq!(outcome.producer.id, "q");
    }

    #[test]
    fn test_auto_assign_exhausted_is_no_producer() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);

        book(&mut conn, &request("2024-03-04T15:00:00Z", None), now()).unwrap();
        let err = book(&mut conn, &request("2024-03-04T15:00:00Z", None), now()).unwrap_err();
        assert!(matches!(err, BookingError::NoProducerAvailable));
    }

    #[test]
    fn test_inactive_requested_producer_is_no_producer() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);
        let err = book(&mut conn, &request("2024-03-04T15:00:00Z", Some("nobody")), now())
            .unwrap_err();
        assert!(matches!(err, BookingError::NoProducerAvailable));
    }

    #[test]
    fn test_reschedule_keeps_identity_and_tokens() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);

        let original = book(&mut conn, &request("2024-03-04T15:00:00Z", None), now())
            .unwrap()
            .booking;

        let later = now() + Duration::hours(2);
        let moved = book(
            &mut conn,
            &reschedule(&original.reschedule_token, "2024-03-05T16:00:00Z"),
            later,
        )
        .unwrap();

        assert!(moved.is_reschedule());
        assert_eq!(moved.previous_start, Some(original.start_time));
        assert_eq!(moved.booking.id, original.id);
        assert_eq!(moved.booking.cancel_token, original.cancel_token);
        assert_eq!(moved.booking.reschedule_token, original.reschedule_token);
        assert_eq!(moved.booking.reschedule_expires, original.reschedule_expires);
        assert_eq!(moved.booking.notes.as_deref(), Some("Brand film"));

        let stored = queries::get_booking_by_id(&conn, &original.id).unwrap().unwrap();
        assert_eq!(
            stored.start_time,
            Utc.with_ymd_and_hms(2024, 3, 5, 16, 0, 0).unwrap()
        );
        assert_eq!(stored.updated_at, later);
    }

    #[test]
    fn test_reschedule_overlapping_itself_is_allowed() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);

        let original = book(&mut conn, &request("2024-03-04T15:00:00Z", Some("p")), now())
            .unwrap()
            .booking;

        let mut req = reschedule(&original.reschedule_token, "2024-03-04T15:15:00Z");
        req.producer_id = Some("p".to_string());
        let moved = book(&mut conn, &req, now()).unwrap();
        assert_eq!(moved.booking.id, original.id);
        assert_eq!(moved.producer.id, "p");
    }

    #[test]
    fn test_reschedule_into_other_booking_is_rejected() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);

        let first = book(&mut conn, &request("2024-03-04T15:00:00Z", Some("p")), now())
            .unwrap()
            .booking;
        book(&mut conn, &request("2024-03-04T16:00:00Z", Some("p")), now()).unwrap();

        let mut req = reschedule(&first.reschedule_token, "2024-03-04T16:00:00Z");
        req.producer_id = Some("p".to_string());
        let err = book(&mut conn, &req, now()).unwrap_err();
        assert!(matches!(err, BookingError::SlotTaken));

        let stored = queries::get_booking_by_id(&conn, &first.id).unwrap().unwrap();
        assert_eq!(stored.start_time, first.start_time);
    }

    #[test]
    fn test_unknown_or_expired_token_writes_nothing() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);

        let err = book(&mut conn, &reschedule("nope", "2024-03-05T16:00:00Z"), now()).unwrap_err();
        assert!(matches!(err, BookingError::InvalidToken));

        let original = book(&mut conn, &request("2024-03-04T15:00:00Z", None), now())
            .unwrap()
            .booking;

        let expired_at = original.reschedule_expires;
        let err = book(
            &mut conn,
            &reschedule(&original.reschedule_token, "2024-03-05T16:00:00Z"),
            expired_at,
        )
        .unwrap_err();
        assert!(matches!(err, BookingError::InvalidToken));

        let stored = queries::get_booking_by_id(&conn, &original.id).unwrap().unwrap();
        assert_eq!(stored.start_time, original.start_time);
    }

    #[test]
    fn test_cancel_is_soft_and_idempotent() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);

        let original = book(&mut conn, &request("2024-03-04T15:00:00Z", None), now())
            .unwrap()
            .booking;

        let first = cancel(&conn, &original.cancel_token, now()).unwrap();
        assert!(!first.already_cancelled);
        assert_eq!(first.booking.status, BookingStatus::Cancelled);

        let again = cancel(&conn, &original.cancel_token, now()).unwrap();
        assert!(again.already_cancelled);

        let stored = queries::get_booking_by_id(&conn, &original.id).unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert_eq!(stored.cancelled_at, Some(now()));

        // The slot is free again and the reschedule link is dead.
        book(&mut conn, &request("2024-03-04T15:00:00Z", Some("p")), now()).unwrap();
        let err = book(
            &mut conn,
            &reschedule(&original.reschedule_token, "2024-03-05T16:00:00Z"),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, BookingError::InvalidToken));
    }

    #[test]
    fn test_cancel_rejects_expired_and_unknown_tokens() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);
        let original = book(&mut conn, &request("2024-03-04T15:00:00Z", None), now())
            .unwrap()
            .booking;

        assert!(matches!(
            cancel(&conn, "unknown", now()).unwrap_err(),
            BookingError::InvalidToken
        ));
        assert!(matches!(
            cancel(&conn, &original.cancel_token, original.cancel_expires).unwrap_err(),
            BookingError::InvalidToken
        ));
        // Reschedule tokens cannot cancel.
        assert!(matches!(
            cancel(&conn, &original.reschedule_token, now()).unwrap_err(),
            BookingError::InvalidToken
        ));
    }

    #[test]
    fn test_find_for_cancel_does_not_write() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);
        let original = book(&mut conn, &request("2024-03-04T15:00:00Z", None), now())
            .unwrap()
            .booking;

        let found = find_for_cancel(&conn, &original.cancel_token, now()).unwrap();
        assert_eq!(found.id, original.id);
        assert!(find_for_cancel(&conn, &original.reschedule_token, now()).is_err());

        let stored = queries::get_booking_by_id(&conn, &original.id).unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Active);
        assert!(stored.cancelled_at.is_none());
    }

    #[test]
    fn test_lookup_and_any_token() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);
        let original = book(&mut conn, &request("2024-03-04T15:00:00Z", None), now())
            .unwrap()
            .booking;

        let found = lookup_for_reschedule(&conn, &original.reschedule_token, now()).unwrap();
        assert_eq!(found.id, original.id);
        assert!(lookup_for_reschedule(&conn, &original.cancel_token, now()).is_err());

        assert_eq!(find_by_any_token(&conn, &original.cancel_token).unwrap().id, original.id);
        assert_eq!(
            find_by_any_token(&conn, &original.reschedule_token).unwrap().id,
            original.id
        );
        assert!(find_by_any_token(&conn, "missing").is_err());
    }

    #[test]
    fn test_no_producer_double_booked_after_mixed_mutations() {
        let mut conn = setup_db();
        add_producer(&conn, "p", 1);
        add_producer(&conn, "q", 2);

        let starts = [
            "2024-03-04T15:00:00Z",
            "2024-03-04T15:10:00Z",
            "2024-03-04T15:20:00Z",
            "2024-03-04T15:30:00Z",
            "2024-03-04T15:45:00Z",
        ];
        let mut made = Vec::new();
        for start in starts {
            if let Ok(outcome) = book(&mut conn, &request(start, None), now()) {
                made.push(outcome.booking);
            }
        }
        if let Some(first) = made.first() {
            let _ = book(
                &mut conn,
                &reschedule(&first.reschedule_token, "2024-03-04T15:35:00Z"),
                now(),
            );
        }

        let window_start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let window_end = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let all = queries::get_bookings_overlapping(&conn, &window_start, &window_end).unwrap();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                if a.producer_id == b.producer_id {
                    assert!(
                        !a.overlaps(b.start_time, b.end_time),
                        "{} and {} overlap",
                        a.id,
                        b.id
                    );
                }
            }
        }
    }
}
