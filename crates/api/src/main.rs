use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inmo_api::auth::jwt::TokenCodec;
use inmo_api::config::ServerConfig;
use inmo_api::router::build_app_router;
use inmo_api::state::AppState;
use inmo_notifications::{
    ChannelSenders, NotificationEngine, NotificationSweeper, PgNotificationStore, PgPolicyStore,
    PolicyResolver,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inmo_api=debug,inmo_notifications=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = inmo_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    inmo_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    inmo_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Notification engine ---
    let policies = PolicyResolver::new(Arc::new(PgPolicyStore::new(pool.clone())));
    let engine = Arc::new(NotificationEngine::new(
        Arc::new(PgNotificationStore::new(pool.clone())),
        policies,
        Arc::new(ChannelSenders::logging()),
        config.dispatch,
    ));

    // --- Sweeper ---
    let sweep_cancel = CancellationToken::new();
    let sweep_handle = if config.sweep_enabled {
        let sweeper = NotificationSweeper::new(Arc::clone(&engine), config.sweep);
        Some(tokio::spawn(sweeper.run(sweep_cancel.clone())))
    } else {
        tracing::info!("Notification sweeper disabled in this process");
        None
    };

    // --- App state ---
    let state = AppState {
        pool: Some(pool),
        config: Arc::new(config.clone()),
        codec: Arc::new(TokenCodec::new(&config.jwt)),
        engine,
    };

    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // No new rows are claimed after cancel; in-flight sends finish within
    // the send timeout, which is shorter than the claim lease.
    sweep_cancel.cancel();
    if let Some(handle) = sweep_handle {
        let wait = config.dispatch.claim_lease;
        if tokio::time::timeout(wait, handle).await.is_err() {
            tracing::warn!("Notification sweeper did not stop in time");
        }
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
