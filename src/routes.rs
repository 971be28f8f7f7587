use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    let cors = match HeaderValue::from_str(&state.config.site_url) {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(site_url = %state.config.site_url, "SITE_URL is not a valid origin, allowing any");
            cors.allow_origin(Any)
        }
    };

    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/availability",
            get(handlers::availability::get_availability),
        )
        .route(
            "/api/book",
            post(handlers::booking::create_booking),
        )
        .route(
            "/api/book/cancel",
            get(handlers::cancel::preview_cancel).post(handlers::cancel::cancel_booking),
        )
        .route("/api/book/lookup", get(handlers::lookup::lookup_booking))
        .route("/calendar/:token", get(handlers::calendar::download_ics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
