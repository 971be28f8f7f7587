use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{AvailabilityParams, AvailabilityQuery, DaySlots};
use crate::services::availability::available_slots;
use crate::services::rate_limit::client_key;
use crate::state::AppState;

#[derive(Serialize)]
pub struct AvailabilityResponse {
    ok: bool,
    days: Vec<DaySlots>,
}

// GET /api/availability?days=&step=&tzOffset=
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    params: Result<Query<AvailabilityParams>, QueryRejection>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    if !state.availability_limiter.allow(&client_key(&headers)) {
        return Err(AppError::RateLimited);
    }

    let Query(params) = params.map_err(|e| AppError::InvalidQuery(vec![e.body_text()]))?;
    let query = AvailabilityQuery::try_from(params).map_err(AppError::InvalidQuery)?;

    let days = {
        let db = state.db();
        available_slots(&db, &query, Utc::now())?
    };

    Ok(Json(AvailabilityResponse { ok: true, days }))
}
