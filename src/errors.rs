use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::booking::BookingError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid request body")]
    InvalidBody(Vec<String>),

    #[error("invalid query parameters")]
    InvalidQuery(Vec<String>),

    #[error("rate limited")]
    RateLimited,

    #[error("no producer available for the requested time")]
    NoProducerAvailable,

    #[error("slot already taken")]
    SlotTaken,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidBody(_) => "invalid_body",
            AppError::InvalidQuery(_) => "invalid_query",
            AppError::RateLimited => "rate_limited",
            AppError::NoProducerAvailable => "no_producer_available",
            AppError::SlotTaken => "slot_taken",
            AppError::InvalidToken => "invalid_token",
            AppError::Internal(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidBody(_) | AppError::InvalidQuery(_) | AppError::InvalidToken => {
                StatusCode::BAD_REQUEST
            }
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::NoProducerAvailable | AppError::SlotTaken => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            AppError::InvalidBody(_) | AppError::InvalidQuery(_) => {
                "Some of the details you entered look off. Please check and try again."
            }
            AppError::RateLimited => "Too many requests. Please try again shortly.",
            AppError::NoProducerAvailable | AppError::SlotTaken => {
                "That time was just taken. Please pick another."
            }
            AppError::InvalidToken => "This link has expired.",
            AppError::Internal(_) => {
                "Something went wrong on our side. Please try again."
            }
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::NoProducerAvailable => AppError::NoProducerAvailable,
            BookingError::SlotTaken => AppError::SlotTaken,
            BookingError::InvalidToken => AppError::InvalidToken,
            BookingError::Storage(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut body = serde_json::json!({
            "ok": false,
            "error": self.code(),
            "message": self.user_message(),
        });
        if let AppError::InvalidBody(details) | AppError::InvalidQuery(details) = &self {
            body["details"] = serde_json::json!(details);
        }

        (status, axum::Json(body)).into_response()
    }
}
