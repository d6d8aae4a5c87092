//! # Tasklane API Server
//!
//! Task-management web service: JWT-authenticated JSON API under
//! `/api/v1`, a server-rendered UI with inline editing, CSRF protection
//! on web forms, rate-limited auth endpoints, and operational probes.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/tasklane \
//! JWT_SECRET=$(openssl rand -hex 32) \
//! cargo run -p tasklane-api
//! ```

use tasklane_api::app::{build_router, AppState};
use tasklane_api::config::Config;
use tasklane_api::middleware::rate_limit::RateLimiter;
use tasklane_shared::db::{migrations, pool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tasklane_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Tasklane API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let db = pool::create_pool(pool::DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;

    migrations::run_migrations(&db).await?;

    // REDIS_URL selects the shared counter store; otherwise counters are
    // process-local and reset on restart
    let limiter = match config.rate_limit.redis_url.as_deref() {
        Some(url) => {
            tracing::info!("Rate limiting backed by shared Redis store");
            RateLimiter::shared(url).await?
        }
        None => {
            tracing::info!("Rate limiting backed by in-process store");
            RateLimiter::in_memory()
        }
    };

    let bind_address = config.bind_address();
    let state = AppState::new(db, config, limiter);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, exiting...");
}
