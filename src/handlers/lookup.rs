use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::services::booking;
use crate::services::rate_limit::client_key;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LookupParams {
    #[serde(default)]
    pub token: String,
}

#[derive(Serialize)]
pub struct ProducerSummary {
    id: String,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    ok: bool,
    id: String,
    name: String,
    notes: Option<String>,
    start: String,
    end: String,
    duration_min: i64,
    producer: Option<ProducerSummary>,
}

// GET /api/book/lookup?token=
pub async fn lookup_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LookupParams>,
) -> Result<Json<LookupResponse>, AppError> {
    if !state.availability_limiter.allow(&client_key(&headers)) {
        return Err(AppError::RateLimited);
    }

    let (booking, producer) = {
        let db = state.db();
        let booking = booking::lookup_for_reschedule(&db, params.token.trim(), Utc::now())?;
        let producer = match booking.producer_id.as_deref() {
            Some(id) => queries::get_producer(&db, id)?,
            None => None,
        };
        (booking, producer)
    };

    Ok(Json(LookupResponse {
        ok: true,
        duration_min: booking.duration_minutes(),
        start: booking.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        end: booking.end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        id: booking.id,
        name: booking.name,
        notes: booking.notes,
        producer: producer.map(|p| ProducerSummary {
            id: p.id,
            name: p.name,
        }),
    }))
}
