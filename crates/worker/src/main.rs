//! Standalone notification sweeper.
//!
//! Runs the same sweep loop the API can host, against PostgreSQL, for
//! deployments that keep delivery out of the request-serving processes.

use std::sync::Arc;

use inmo_notifications::{
    ChannelSenders, DispatchConfig, NotificationEngine, NotificationSweeper, PgNotificationStore,
    PgPolicyStore, PolicyResolver, SweepConfig,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inmo_worker=debug,inmo_notifications=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = inmo_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    inmo_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    let dispatch = DispatchConfig::from_env();
    let sweep = SweepConfig::from_env();

    let engine = Arc::new(NotificationEngine::new(
        Arc::new(PgNotificationStore::new(pool.clone())),
        PolicyResolver::new(Arc::new(PgPolicyStore::new(pool))),
        Arc::new(ChannelSenders::logging()),
        dispatch,
    ));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(NotificationSweeper::new(engine, sweep).run(cancel.clone()));
    tracing::info!(
        send_timeout_secs = dispatch.send_timeout.as_secs(),
        claim_lease_secs = dispatch.claim_lease.as_secs(),
        "Worker started"
    );

    shutdown_signal().await;
    cancel.cancel();

    if tokio::time::timeout(dispatch.claim_lease, handle).await.is_err() {
        tracing::warn!("Notification sweeper did not stop in time");
    }
    tracing::info!("Worker stopped");
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
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), stopping"),
        () = terminate => tracing::info!("Received SIGTERM, stopping"),
    }
}
