use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::db;
use slotbook::routes::build_router;
use slotbook::services::messaging::http::HttpWebhookSender;
use slotbook::services::messaging::resend::ResendEmailSender;
use slotbook::services::messaging::EmailSender;
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let email: Option<Box<dyn EmailSender>> = match config.resend_api_key.clone() {
        Some(key) => {
            tracing::info!("sending email via Resend (from: {})", config.email_from);
            Some(Box::new(ResendEmailSender::new(key, config.email_from.clone())))
        }
        None => {
            tracing::info!("RESEND_API_KEY not set, booking emails disabled");
            None
        }
    };
    if config.slack_webhook_url.is_none() {
        tracing::info!("SLACK_WEBHOOK_URL not set, team chat notifications disabled");
    }

    let state = Arc::new(AppState::new(
        conn,
        config.clone(),
        Box::new(HttpWebhookSender::new()),
        email,
    ));

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
