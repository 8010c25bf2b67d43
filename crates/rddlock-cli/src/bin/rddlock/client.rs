//! Configuration loading and store connection.

use anyhow::Context;
use anyhow::Result;
use rddlock_coordination::ClientConfig;
use rddlock_coordination::LockClient;
use rddlock_coordination::LockConfig;
use rddlock_kv::RedisStore;
use tracing::info;

use crate::cli::GlobalOptions;

/// Endpoint used when neither the flag, the environment nor the file names one.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Pick the endpoint: flag (or `RDDLOCK_REDIS_URL`), then the config file, then the default.
pub fn resolve_redis_url(global: &GlobalOptions, config: &ClientConfig) -> String {
    global
        .redis_url
        .clone()
        .or_else(|| config.redis_url.clone())
        .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string())
}

/// Load configuration and connect to the store.
pub async fn connect(global: &GlobalOptions) -> Result<(LockClient<RedisStore>, LockConfig)> {
    let config = ClientConfig::load(global.config.as_deref()).context("failed to load configuration")?;
    let url = resolve_redis_url(global, &config);

    info!(redis_url = %url, "connecting to store");
    let store = RedisStore::connect(&url).await.with_context(|| format!("failed to connect to {url}"))?;

    let lock_config = config.lock;
    Ok((LockClient::new(std::sync::Arc::new(store), lock_config.clone()), lock_config))
}
