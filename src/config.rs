use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub site_url: String,
    pub slack_webhook_url: Option<String>,
    pub crm_webhook_url: Option<String>,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    /// Offset (minutes from UTC) used when rendering times in notifications.
    pub display_tz_offset: i32,
    pub availability_rate_limit: u32,
    pub booking_rate_limit: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "bookings.db".to_string()),
            site_url: env::var("SITE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            slack_webhook_url: non_empty("SLACK_WEBHOOK_URL"),
            crm_webhook_url: non_empty("CRM_WEBHOOK_URL"),
            resend_api_key: non_empty("RESEND_API_KEY"),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Bookings <bookings@localhost>".to_string()),
            display_tz_offset: env::var("DISPLAY_TZ_OFFSET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(-300),
            availability_rate_limit: env::var("AVAILABILITY_RATE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            booking_rate_limit: env::var("BOOKING_RATE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
