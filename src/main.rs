use anyhow::Context;
use flouci_developers::api::{router, AppState, Repositories};
use flouci_developers::backend::{BackendClient, DataApiClient};
use flouci_developers::cache::throttle::{MemoryThrottle, RequestThrottle};
use flouci_developers::config::AppConfig;
use flouci_developers::database::{init_pool_from_config, memory::MemoryStore, run_migrations};
use flouci_developers::health::HealthChecker;
use flouci_developers::logging::init_tracing;
use flouci_developers::middleware::logging::{request_logging_middleware, UuidRequestId};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(feature = "cache")]
async fn throttle_and_health(
    config: &AppConfig,
    health: HealthChecker,
) -> (Arc<dyn RequestThrottle>, HealthChecker) {
    use flouci_developers::cache::{init_cache_pool, throttle::RedisThrottle, CacheConfig};

    if config.skip_externals {
        info!("Skipping Redis initialization (SKIP_EXTERNALS=true)");
        return (Arc::new(MemoryThrottle::new()), health);
    }

    match init_cache_pool(CacheConfig::from(&config.cache)).await {
        Ok(pool) => {
            info!("Redis throttle initialized");
            (
                Arc::new(RedisThrottle::new(pool.clone())),
                health.with_cache(Some(pool)),
            )
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, using in-process throttle");
            (Arc::new(MemoryThrottle::new()), health)
        }
    }
}

#[cfg(not(feature = "cache"))]
async fn throttle_and_health(
    _config: &AppConfig,
    health: HealthChecker,
) -> (Arc<dyn RequestThrottle>, HealthChecker) {
    (Arc::new(MemoryThrottle::new()), health)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.gateway.environment,
        "Starting Flouci developers gateway"
    );

    let (repositories, db_pool) = match &config.database {
        Some(database) if !config.skip_externals => {
            info!("Initializing database connection pool");
            let pool = init_pool_from_config(database).await.map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
            run_migrations(&pool).await?;
            info!(
                max_connections = pool.options().get_max_connections(),
                "Database connection pool initialized"
            );
            (Repositories::postgres(pool.clone()), Some(pool))
        }
        _ => {
            info!("Skipping database initialization, using in-memory store");
            (Repositories::memory(Arc::new(MemoryStore::new())), None)
        }
    };

    let (throttle, health) = throttle_and_health(&config, HealthChecker::new(db_pool)).await;

    let backend = BackendClient::new(&config.backend).context("failed to build backend client")?;
    let data_api =
        DataApiClient::new(&config.data_api).context("failed to build data API client")?;

    let state = AppState::new(repositories, backend, data_api, config.gateway.clone())
        .with_throttle(throttle)
        .with_health(health);

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
