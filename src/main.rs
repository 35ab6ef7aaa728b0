//! Libris Server - campus library reservation and return engine

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris_server::{
    api,
    config::{AppConfig, LoggingConfig, StorageBackend},
    repository::{memory::MemoryStore, Repository},
    services::{
        audit::PgAuditSink,
        clock::SystemClock,
        effects::{AuditSink, LogNotifier, NotificationSink, TracingAuditSink},
        email::EmailNotifier,
        sweeper::ExpirySweeper,
    },
    AppState,
};

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("libris_server={},tower_http=debug", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Periodic sweep in addition to the read-time sweeps
fn spawn_sweeper(sweeper: ExpirySweeper, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match sweeper.sweep().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Background sweep cancelled {} expired approval(s)", n),
                Err(e) => tracing::error!("Background sweep failed: {}", e),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    tracing::info!("Starting Libris Server v{}", env!("CARGO_PKG_VERSION"));
    if config.lending.pickup_window_minutes < 60 {
        tracing::warn!(
            "Pickup window is {} minute(s); confirm this is the intended production value",
            config.lending.pickup_window_minutes
        );
    }

    let (repository, audit): (Repository, Arc<dyn AuditSink>) = match config.database.backend {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations completed");

            let audit: Arc<dyn AuditSink> = Arc::new(PgAuditSink::new(pool.clone()));
            (Repository::new(pool), audit)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
            (Repository::in_memory(Arc::new(MemoryStore::new())), audit)
        }
    };

    let notifier: Arc<dyn NotificationSink> = if config.email.enabled {
        Arc::new(EmailNotifier::new(config.email.clone(), repository.users.clone()))
    } else {
        Arc::new(LogNotifier)
    };

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );
    let sweep_every = config.lending.sweep_interval_seconds;

    let state = AppState::new(config, repository, notifier, audit, Arc::new(SystemClock));

    if let Some(secs) = sweep_every.filter(|s| *s > 0) {
        tracing::info!("Background expiry sweep every {}s", secs);
        spawn_sweeper(state.services.sweeper.clone(), Duration::from_secs(secs));
    }

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
