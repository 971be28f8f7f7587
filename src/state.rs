use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::messaging::{EmailSender, WebhookSender};
use crate::services::rate_limit::{FixedWindowLimiter, RateLimiter};

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub webhooks: Box<dyn WebhookSender>,
    /// `None` when no email provider is configured.
    pub email: Option<Box<dyn EmailSender>>,
    pub availability_limiter: Box<dyn RateLimiter>,
    pub booking_limiter: Box<dyn RateLimiter>,
}

impl AppState {
    /// Wires per-minute limiters from the config's read and write budgets.
    pub fn new(
        conn: Connection,
        config: AppConfig,
        webhooks: Box<dyn WebhookSender>,
        email: Option<Box<dyn EmailSender>>,
    ) -> Self {
        let availability_limiter =
            Box::new(FixedWindowLimiter::per_minute(config.availability_rate_limit));
        let booking_limiter = Box::new(FixedWindowLimiter::per_minute(config.booking_rate_limit));
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            webhooks,
            email,
            availability_limiter,
            booking_limiter,
        }
    }

    pub fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
