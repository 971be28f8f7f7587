use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::db::queries;
use crate::errors::AppError;
use crate::services::booking;
use crate::services::calendar::generate_ics;
use crate::services::notifications::ManageLinks;
use crate::state::AppState;

// GET /calendar/:token
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(raw_token): Path<String>,
) -> Result<Response, AppError> {
    let token = raw_token.strip_suffix(".ics").unwrap_or(&raw_token);

    let (booking, producer_name) = {
        let db = state.db();
        let booking = booking::find_by_any_token(&db, token)?;
        let producer_name = match booking.producer_id.as_deref() {
            Some(id) => queries::get_producer(&db, id)?.map(|p| p.name),
            None => None,
        };
        (booking, producer_name.unwrap_or_else(|| "our team".to_string()))
    };

    let links = ManageLinks::for_booking(&state.config.site_url, &booking);
    let ics = generate_ics(&booking, &producer_name, &links.reschedule_url);
    let filename = format!("booking-{}.ics", booking.id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}
