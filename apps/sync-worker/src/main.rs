use crm_core::adapters::{
    run_migrations, InMemoryCache, InMemoryIdentityDirectory, PostgresDocumentStore,
    PostgresMappingStore, PostgresSyncLog, RedisCache, VaultConfig, VaultTransit,
};
use crm_core::external::ConnectorConfig;
use crm_core::factory::BackendFactory;
use crm_core::settings::TenantSettingsStore;
use crm_core::sync::{Reconciler, ReconcilerConfig, ReconciliationWorker};
use crm_core::Cache;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Default TTL for cache entries written without an explicit one.
const CACHE_DEFAULT_TTL_SECS: u64 = 300;
const CACHE_CAPACITY: u64 = 10_000;

async fn cache_from_env() -> Result<Arc<dyn Cache>, BoxError> {
    match env::var("REDIS_URL") {
        Ok(url) => {
            let cache = RedisCache::new(&url, CACHE_DEFAULT_TTL_SECS).await?;
            info!("Connected to Redis cache.");
            Ok(Arc::new(cache))
        }
        Err(_) => {
            warn!("REDIS_URL not set, using the in-process cache");
            Ok(Arc::new(InMemoryCache::new(CACHE_CAPACITY, CACHE_DEFAULT_TTL_SECS)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting Sync Worker v{}...", env!("CARGO_PKG_VERSION"));

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let connector = ConnectorConfig::from_env();
    let reconciler_config = ReconcilerConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    if let Err(e) = run_migrations(&pool).await {
        error!("Database migration failed: {}", e);
        return Err(e.into());
    }
    info!("Database ready.");

    let store = Arc::new(PostgresDocumentStore::new(pool.clone()));
    let mappings = Arc::new(PostgresMappingStore::new(pool.clone()));
    let sync_log = Arc::new(PostgresSyncLog::new(
        pool,
        reconciler_config.log_retention_days,
    ));
    let cache = cache_from_env().await?;
    let secrets = Arc::new(VaultTransit::new(VaultConfig::from_env())?);

    // The identity service is reached through its own client in production;
    // this process only provisions into the in-process directory.
    warn!("Using the in-process identity directory");
    let identity = Arc::new(InMemoryIdentityDirectory::new());

    let settings = TenantSettingsStore::new(store.clone(), secrets);
    let factory = BackendFactory::new(
        store,
        identity.clone(),
        mappings.clone(),
        cache,
        settings.clone(),
        connector.clone(),
    );
    let tenants = factory.settings_store().tenants().await?;
    info!(tenants = tenants.len(), "Known tenants loaded.");

    let reconciler = Arc::new(Reconciler::new(
        settings,
        identity,
        mappings,
        sync_log,
        connector,
    ));
    let worker = ReconciliationWorker::spawn(reconciler, reconciler_config.interval);
    info!("Sync Worker started. Press Ctrl-C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Could not listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested, waiting for the current run...");
    worker.stop().await;
    info!("Sync Worker stopped.");

    Ok(())
}
