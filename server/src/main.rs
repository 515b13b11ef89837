//! Keel Server binary.

use keel_engine::{Provider, StoreHandle};
use keel_server::config::Config;
use keel_server::db::{create_client, MongoStore};
use keel_server::{app, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "keel_server=debug,keel_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Keel Server on {}:{}", config.host, config.port);

    tracing::info!("Connecting to MongoDB...");
    let client = create_client(&config).await?;
    let store = MongoStore::new(client);

    let provider = Provider::configure(Some(Arc::new(StoreHandle::new(store))))?;
    let state = AppState::new(provider, config.call_timeout);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
