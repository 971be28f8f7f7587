use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A staff member who runs consultation calls. Managed outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Producer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub timezone: String,
    pub active: bool,
    pub daily_start_minutes: i32,
    pub daily_end_minutes: i32,
    pub slack_webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
