use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use soundalike::{
    config::{CatalogBackend, Config},
    db::{self, Cache, CacheWriterHandle},
    routes::{create_router, AppState},
    services::{
        catalog::{CatalogSource, MemoryCatalog, PgCatalog},
        enrichment::{MetadataProvider, SpotifyClient},
        recommendations::RecommendationEngine,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soundalike=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let catalog = build_catalog(&config).await?;
    tracing::info!(backend = catalog.name(), "Catalog ready");

    let (cache, cache_writer) = match &config.redis_url {
        Some(url) => {
            let client = db::create_redis_client(url).context("Invalid REDIS_URL")?;
            let (cache, handle) = Cache::new(client).await;
            tracing::info!("Redis metadata cache enabled");
            (Some(cache), Some(handle))
        }
        None => (None, None),
    };

    let metadata: Option<Arc<dyn MetadataProvider>> =
        config.spotify_credentials().map(|(client_id, client_secret)| {
            tracing::info!("Spotify metadata enrichment enabled");
            Arc::new(SpotifyClient::new(
                client_id,
                client_secret,
                config.spotify_token_url.clone(),
                config.spotify_api_url.clone(),
                cache.clone(),
            )) as Arc<dyn MetadataProvider>
        });
    if metadata.is_none() {
        tracing::info!("Spotify credentials not set, metadata endpoints disabled");
    }

    let state = Arc::new(AppState::new(RecommendationEngine::new(catalog), metadata));
    let app = create_router(state, Duration::from_secs(config.request_timeout_secs));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown_cache(cache_writer).await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn build_catalog(config: &Config) -> anyhow::Result<Arc<dyn CatalogSource>> {
    match config.catalog_backend {
        CatalogBackend::Postgres => {
            let pool = db::create_pool(&config.database_url, config.database_max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            if config.run_migrations {
                db::run_migrations(&pool).await?;
            }
            Ok(Arc::new(PgCatalog::new(pool)))
        }
        CatalogBackend::Memory => {
            let path = config
                .catalog_seed_path
                .as_deref()
                .context("CATALOG_SEED_PATH is required for the memory catalog")?;
            let catalog = MemoryCatalog::from_json_file(path)?;
            if catalog.is_empty() {
                tracing::warn!(path = %path.display(), "Catalog seed has no tracks");
            }
            Ok(Arc::new(catalog))
        }
    }
}

async fn shutdown_cache(handle: Option<CacheWriterHandle>) {
    if let Some(handle) = handle {
        handle.shutdown().await;
    }
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
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received terminate signal, shutting down"),
    }
}
