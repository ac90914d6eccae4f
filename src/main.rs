// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use drive_progress::config::{Config, StorageBackend};
use drive_progress::logging::init_tracing;
use drive_progress::notify::{BadgeNotifier, LogNotifier, WebhookNotifier};
use drive_progress::routes;
use drive_progress::state::AppState;
use drive_progress::store::{MemoryStore, PgStore};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let _guard = init_tracing(&config);

    let notifier: Arc<dyn BadgeNotifier> = match &config.badge_webhook_url {
        Some(url) => match WebhookNotifier::new(url.clone()) {
            Ok(webhook) => {
                tracing::info!("Badge notifications go to {}", url);
                Arc::new(webhook)
            }
            Err(e) => {
                tracing::error!("Failed to build webhook client, falling back to log: {}", e);
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let state = match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            AppState::with_store(config.clone(), Arc::new(MemoryStore::new()), notifier)
        }
        StorageBackend::Postgres => {
            let pool = connect_with_retry(&config).await;

            tracing::info!("Running migrations...");
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                tracing::error!("Failed to run database migrations: {}", e);
                std::process::exit(1);
            }
            tracing::info!("Migrations applied successfully.");

            AppState::with_store(config.clone(), Arc::new(PgStore::new(pool)), notifier)
        }
    };

    let app = routes::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }
}

/// Initialize Database Pool with Retry.
async fn connect_with_retry(config: &Config) -> PgPool {
    let database_url = config.database_url.as_deref().unwrap_or_default();
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                tracing::info!("Database connected...");
                return pool;
            }
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries: {}", e);
                    std::process::exit(1);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
