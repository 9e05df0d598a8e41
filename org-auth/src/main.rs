use org_auth::{
    build_router,
    config::{AuthConfig, SessionBackend},
    db,
    services::{
        spawn_session_purger, AuthRepository, Database, InMemoryRepository, MemorySessionStore,
        ProviderRegistry, RedisSessionStore, SessionStore,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

const SESSION_PURGE_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting org-auth"
    );

    let repo: Arc<dyn AuthRepository> = match &config.database {
        Some(db_config) => {
            let pool = db::create_pool(db_config).await?;
            db::run_migrations(&pool).await?;
            Arc::new(Database::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory repository");
            Arc::new(InMemoryRepository::new())
        }
    };

    let sessions: Arc<dyn SessionStore> = match config.session.backend {
        SessionBackend::Redis => {
            let url = config.session.redis_url.as_deref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("REDIS_URL is required for redis sessions"))
            })?;
            tracing::info!("Using Redis session store");
            Arc::new(RedisSessionStore::connect(url).await?)
        }
        SessionBackend::Memory => {
            let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
            spawn_session_purger(
                store.clone(),
                std::time::Duration::from_secs(SESSION_PURGE_INTERVAL_SECS),
            );
            store
        }
    };

    let providers = ProviderRegistry::from_config(&config.oidc_providers, &config.base_url);
    tracing::info!(providers = ?providers.names(), "Identity providers configured");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    let app = build_router(AppState::new(config, repo, sessions, providers));

    tracing::info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
