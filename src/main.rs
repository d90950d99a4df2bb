use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use carwash::config::AppConfig;
use carwash::db::{self, queries};
use carwash::handlers;
use carwash::models::AdminRole;
use carwash::services::notify::{BroadcastSink, NotificationSink, WebhookSink};
use carwash::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    anyhow::ensure!(!config.admin_token.trim().is_empty(), "ADMIN_TOKEN must not be empty");
    queries::upsert_admin(&conn, "admin", "Administrator", AdminRole::Admin, &config.admin_token)?;

    let (events_tx, _) = broadcast::channel(256);

    let mut notifiers: Vec<Box<dyn NotificationSink>> = vec![Box::new(BroadcastSink::new(events_tx.clone()))];
    if let Some(url) = &config.notify_webhook_url {
        tracing::info!("forwarding queue events to webhook (url: {url})");
        notifiers.push(Box::new(WebhookSink::new(
            url.clone(),
            config.notify_webhook_secret.clone(),
            Duration::from_secs(config.notify_timeout_secs),
        )?));
    }

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        events_tx,
        notifiers,
    });

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
