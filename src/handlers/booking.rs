use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::BookingRequest;
use crate::services::booking;
use crate::services::notifications;
use crate::services::rate_limit::client_key;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ProducerRef {
    pub id: String,
}

#[derive(Serialize)]
pub struct BookingResponse {
    ok: bool,
    id: String,
    producer: ProducerRef,
    rescheduled: bool,
}

// POST /api/book
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<Json<BookingResponse>, AppError> {
    if !state.booking_limiter.allow(&client_key(&headers)) {
        return Err(AppError::RateLimited);
    }

    let Json(request) = payload.map_err(|e| AppError::InvalidBody(vec![e.body_text()]))?;
    let request = request.validate().map_err(AppError::InvalidBody)?;

    let outcome = {
        let mut db = state.db();
        booking::book(&mut db, &request, Utc::now())?
    };

    let response = BookingResponse {
        ok: true,
        id: outcome.booking.id.clone(),
        producer: ProducerRef {
            id: outcome.producer.id.clone(),
        },
        rescheduled: outcome.is_reschedule(),
    };

    let context = request.context;
    tokio::spawn(async move {
        notifications::notify_booking_saved(&state, &outcome, &context).await;
    });

    Ok(Json(response))
}
