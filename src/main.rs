#![deny(unused)]
//! QPU Gateway
//!
//! Caching, deduplicating front door for quantum program execution. Repeated
//! requests for the same program, parameters, shots and backend are answered
//! from the result cache instead of spending QPU time.

use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;

use qpu_core::config::AppConfig;
use qpu_core::traits::ResultCache;
use qpu_gateway::{GatewayConfig, GatewayServer, GatewayService};
use qpu_provider::HttpForwarder;
use qpu_store::{InMemoryResultCache, RedisResultCache};

/// How often expired entries are swept from the in-memory cache.
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    config.validate()?;

    let telemetry = qpu_telemetry::configure_tracing(&config.telemetry)?;
    tracing::info!("Starting QPU Gateway v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = qpu_telemetry::setup_metrics_recorder()?;

    // =========================================================================
    // Result cache
    // =========================================================================
    let cache: Arc<dyn ResultCache> = match &config.cache.redis_url {
        Some(url) => {
            tracing::info!(prefix = %config.cache.key_prefix, "Initializing Redis result cache");
            Arc::new(RedisResultCache::connect(url.expose_secret(), &config.cache.key_prefix).await?)
        }
        None => {
            tracing::warn!("cache.redis_url not set, results are cached in process memory only");
            let memory = Arc::new(InMemoryResultCache::new());
            let sweeper = memory.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(MEMORY_SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    sweeper.cleanup();
                }
            });
            memory as Arc<dyn ResultCache>
        }
    };

    // =========================================================================
    // Execution provider
    // =========================================================================
    let forwarder = Arc::new(HttpForwarder::new(&config.provider)?);
    tracing::info!(
        endpoint = %forwarder.jobs_url(),
        default_backend = %config.provider.default_backend,
        "Execution provider configured"
    );

    let service = Arc::new(
        GatewayService::new(cache.clone(), forwarder)
            .with_ttl(config.cache.ttl())
            .with_limits(config.limits.clone())
            .with_execution_timeout(config.provider.timeout()),
    );

    let server = GatewayServer::new(GatewayConfig::from(&config), service).with_metrics(metrics_handle);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        ttl_secs = config.cache.ttl_secs,
        "Gateway initialized"
    );

    server.run(shutdown_signal()).await?;

    if let Err(e) = cache.close().await {
        tracing::warn!(error = %e, "Failed to close result cache cleanly");
    }
    tracing::info!("QPU Gateway stopped");
    telemetry.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
