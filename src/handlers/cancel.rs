use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::BookingStatus;
use crate::services::booking;
use crate::services::notifications;
use crate::services::rate_limit::client_key;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CancelParams {
    #[serde(default)]
    pub token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPreview {
    ok: bool,
    id: String,
    name: String,
    start: String,
    end: String,
    already_cancelled: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    ok: bool,
    id: String,
    already_cancelled: bool,
}

// GET /api/book/cancel?token=
//
// Backs the site's confirmation page. Never cancels: link scanners and
// previewers fetch URLs from emails on their own.
pub async fn preview_cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CancelParams>,
) -> Result<Json<CancelPreview>, AppError> {
    if !state.availability_limiter.allow(&client_key(&headers)) {
        return Err(AppError::RateLimited);
    }

    let booking = {
        let db = state.db();
        booking::find_for_cancel(&db, params.token.trim(), Utc::now())?
    };

    Ok(Json(CancelPreview {
        ok: true,
        start: booking.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        end: booking.end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        already_cancelled: booking.status == BookingStatus::Cancelled,
        id: booking.id,
        name: booking.name,
    }))
}

// POST /api/book/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CancelParams>, JsonRejection>,
) -> Result<Json<CancelResponse>, AppError> {
    if !state.booking_limiter.allow(&client_key(&headers)) {
        return Err(AppError::RateLimited);
    }

    let Json(params) = payload.map_err(|e| AppError::InvalidBody(vec![e.body_text()]))?;
    let token = params.token.trim();
    if token.is_empty() {
        return Err(AppError::InvalidToken);
    }

    let (outcome, producer) = {
        let db = state.db();
        let outcome = booking::cancel(&db, token, Utc::now())?;
        let producer = match outcome.booking.producer_id.as_deref() {
            Some(id) if !outcome.already_cancelled => queries::get_producer(&db, id)?,
            _ => None,
        };
        (outcome, producer)
    };

    let response = CancelResponse {
        ok: true,
        id: outcome.booking.id.clone(),
        already_cancelled: outcome.already_cancelled,
    };

    if !outcome.already_cancelled {
        tokio::spawn(async move {
            notifications::notify_booking_cancelled(&state, &outcome.booking, producer.as_ref())
                .await;
        });
    }

    Ok(Json(response))
}
