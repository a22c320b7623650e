use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ativeplay_sync::config::Config;
use ativeplay_sync::db::{create_pool, run_migrations, PgCatalogStore};
use ativeplay_sync::services::credentials::PlaintextCipher;
use ativeplay_sync::services::http::ReqwestFetcher;
use ativeplay_sync::services::redis::RedisService;
use ativeplay_sync::services::store::{CatalogStore, MemoryStore};
use ativeplay_sync::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ativeplay_sync=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting AtivePlay Sync v{}", env!("CARGO_PKG_VERSION"));

    // Catalog store: PostgreSQL when configured, process memory otherwise
    let pool = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, config.db_max_connections).await?;
            tracing::info!("PostgreSQL connected");
            run_migrations(&pool).await?;
            tracing::info!("Database migrations completed");
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, catalog is kept in memory");
            None
        }
    };
    let store: Arc<dyn CatalogStore> = match &pool {
        Some(pool) => Arc::new(PgCatalogStore::new(pool.clone())),
        None => Arc::new(MemoryStore::new()),
    };

    // Progress publication is optional; sync works without it
    let redis = match &config.redis_url {
        Some(url) => match RedisService::new(url, config.progress_ttl_seconds).await {
            Ok(redis) => {
                tracing::info!("Redis connected");
                Some(redis)
            }
            Err(e) => {
                tracing::warn!("Redis unavailable, progress kept in memory: {}", e);
                None
            }
        },
        None => None,
    };

    let http = Arc::new(ReqwestFetcher::new(&config.user_agent, config.max_body_bytes())?);
    let cipher = Arc::new(PlaintextCipher);

    // Build application state
    let mut state = AppState::new(config, store, http, cipher);
    if let Some(pool) = pool {
        state = state.with_pool(pool);
    }
    if let Some(redis) = redis {
        state = state.with_redis(redis);
    }

    let app = build_router(Arc::new(state));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
