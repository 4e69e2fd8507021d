//! Cacher demo
//!
//! Runs a few queries against an in-memory `users` collection through the
//! cache, then invalidates them. Uses Redis when built with the `redis`
//! feature and `REDIS_URL` is set.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cacher::store::CacheStore;
use cacher::{AppConfig, Cacher, Fetched, Field, MemoryStore, Method, Op, QueryValue, TableModel};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cacher=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting cacher demo...");

    let config = AppConfig::from_env();
    info!(
        "Configuration loaded (prefix {}, ttl {:?})",
        config.cacher.prefix, config.cacher.ttl
    );

    let store = open_store(&config).await?;
    info!("Cache store: {}", store.provider_name());

    let cacher = Cacher::with_config(store, config.cacher.clone()).with_model(Arc::new(users()));

    let options = QueryValue::map([
        (
            "where",
            QueryValue::map([(Field::from("id"), QueryValue::map([(Op::In, QueryValue::list([1, 2]))]))]),
        ),
        ("limit", QueryValue::from(10)),
    ]);

    for round in 1..=2 {
        let result = cacher.find_all(Some(options.clone()), &[]).await?;
        info!(
            "Round {}: {} (hit: {}) -> {}",
            round, result.key, result.cache_hit, result.value
        );
    }

    let count = cacher.count(None, &["demo"]).await?;
    info!("Count: {} (hit: {})", count.value, count.cache_hit);

    let outcome = cacher.invalidate_and_wait("users").await;
    info!("Invalidation finished: {:?}", outcome);

    let after = cacher.find_all(Some(options), &[]).await?;
    if after.cache_hit {
        warn!("Entry survived invalidation: {}", after.key);
    } else {
        info!("Reloaded from source after invalidation");
    }

    Ok(())
}

#[cfg(feature = "redis")]
async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    if let Some(url) = &config.redis_url {
        let store = cacher::store::RedisStore::connect(url).await?;
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(MemoryStore::new(config.cacher.memory_capacity)))
}

#[cfg(not(feature = "redis"))]
async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    if config.redis_url.is_some() {
        warn!("REDIS_URL is set but the redis feature is disabled, using memory store");
    }
    Ok(Arc::new(MemoryStore::new(config.cacher.memory_capacity)))
}

/// Static `users` collection stamped with the load time, so cache hits are
/// visible in the output.
fn users() -> TableModel {
    TableModel::new("users")
        .with_method(Method::FindAll, |_options| async {
            let loaded_at = chrono::Utc::now().to_rfc3339();
            Ok(Fetched::Rows(vec![
                json!({ "id": 1, "name": "ada", "loaded_at": loaded_at }),
                json!({ "id": 2, "name": "grace", "loaded_at": loaded_at }),
            ]))
        })
        .with_method(Method::Count, |_options| async { Ok(Fetched::from(json!(2))) })
}
