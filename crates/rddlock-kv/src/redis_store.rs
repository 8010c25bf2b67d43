//! Redis backend for [`KeyValueStore`].
//!
//! Maps the capability one-to-one onto Redis commands:
//!
//! | Capability | Redis |
//! |---|---|
//! | `set_if_absent` | `SETNX` |
//! | `get` | `GET` |
//! | `get_and_set` | `GETSET` |
//! | `compare_and_delete` | `EVAL` of [`CHECK_AND_DELETE_SCRIPT`] |
//! | `delete` | `DEL` |
//!
//! A Redis Cluster deployment satisfies the single-key linearizability
//! requirement because every command here touches exactly one key.

use async_trait::async_trait;
use redis::RedisError;
use redis::Script;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::KeyValueStore;
use crate::KeyValueStoreError;
use crate::validation::validate_key;
use crate::validation::validate_value;

/// Server-side check-and-delete. Runs atomically inside Redis.
pub const CHECK_AND_DELETE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
end
return 0
";

/// [`KeyValueStore`] backed by a Redis server.
///
/// Cloning is cheap; clones share the same multiplexed connection, which
/// reconnects on its own after transient failures.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    check_and_delete: Script,
}

impl RedisStore {
    /// Connect to the Redis server at `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, KeyValueStoreError> {
        let client = redis::Client::open(url).map_err(|e| KeyValueStoreError::Failed {
            reason: format!("invalid redis url '{url}': {e}"),
        })?;
        let conn = ConnectionManager::new(client).await.map_err(map_redis_error)?;
        debug!(url, "connected to redis");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            check_and_delete: Script::new(CHECK_AND_DELETE_SCRIPT),
        }
    }
}

fn map_redis_error(err: RedisError) -> KeyValueStoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
        KeyValueStoreError::Unavailable { reason: err.to_string() }
    } else {
        KeyValueStoreError::Failed { reason: err.to_string() }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KeyValueStoreError> {
        validate_key(key)?;
        validate_value(value)?;
        let mut conn = self.conn.clone();
        let written: bool = redis::cmd("SETNX").arg(key).arg(value).query_async(&mut conn).await.map_err(map_redis_error)?;
        Ok(written)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KeyValueStoreError> {
        validate_key(key)?;
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await.map_err(map_redis_error)?;
        Ok(value)
    }

    async fn get_and_set(&self, key: &str, value: &str) -> Result<Option<String>, KeyValueStoreError> {
        validate_key(key)?;
        validate_value(value)?;
        let mut conn = self.conn.clone();
        let previous: Option<String> =
            redis::cmd("GETSET").arg(key).arg(value).query_async(&mut conn).await.map_err(map_redis_error)?;
        Ok(previous)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KeyValueStoreError> {
        validate_key(key)?;
        let mut conn = self.conn.clone();
        let deleted: i64 =
            self.check_and_delete.key(key).arg(expected).invoke_async(&mut conn).await.map_err(map_redis_error)?;
        Ok(deleted > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool, KeyValueStoreError> {
        validate_key(key)?;
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await.map_err(map_redis_error)?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_compares_before_deleting() {
        let get = CHECK_AND_DELETE_SCRIPT.find("'get'").unwrap();
        let del = CHECK_AND_DELETE_SCRIPT.find("'del'").unwrap();
        assert!(get < del);
        assert!(CHECK_AND_DELETE_SCRIPT.contains("ARGV[1]"));
    }

    #[tokio::test]
    async fn invalid_url_is_reported_as_failure() {
        let result = RedisStore::connect("not-a-url").await;
        assert!(matches!(result, Err(KeyValueStoreError::Failed { .. })));
    }
}
