use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discovery_api::{
    api::{create_router, AppState},
    config::Config,
    db::{
        create_pool, create_redis_client, run_migrations, Cache, PgQuotaStore, PgWatchlistStore,
        RedisCacheBackend,
    },
    services::{DiscoveryEngine, QuotaGovernor, TmdbCatalog},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("discovery_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db_pool = create_pool(&config.database_url).await?;
    run_migrations(&db_pool).await?;
    let redis_client = create_redis_client(&config.redis_url)?;

    let catalog = TmdbCatalog::new(config.catalog_api_key.clone(), config.catalog_api_url.clone());
    let cache = Cache::new(Arc::new(RedisCacheBackend::new(redis_client)));

    let engine = DiscoveryEngine::new(
        Arc::new(catalog),
        cache,
        Arc::new(PgWatchlistStore::new(db_pool.clone())),
        config.discovery_settings(),
    );
    let governor = QuotaGovernor::new(Arc::new(PgQuotaStore::new(db_pool)), config.quota_policy());

    let state = AppState::new(engine, governor).with_session_idle_ttl(config.session_idle_ttl());
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Discovery API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
