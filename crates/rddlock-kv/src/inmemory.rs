//! In-memory deterministic implementation of [`KeyValueStore`] for testing.
//!
//! Every operation runs under one async mutex, so each call is atomic with
//! respect to every other call, which is exactly the contract the lock
//! protocol expects from a real store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::KeyValueStore;
use crate::KeyValueStoreError;
use crate::validation::validate_key;
use crate::validation::validate_value;

/// In-memory deterministic implementation of [`KeyValueStore`].
///
/// Values are stored indefinitely (no store-side TTL). Two hooks exist for
/// tests: [`set_unavailable`](Self::set_unavailable) makes every subsequent
/// call fail as if the network were down, and
/// [`operation_count`](Self::operation_count) reports how many calls reached
/// the store.
///
/// # Example
///
/// ```ignore
/// use rddlock_kv::{DeterministicKeyValueStore, KeyValueStore};
///
/// let store = DeterministicKeyValueStore::new();
/// assert!(store.set_if_absent("lock", "1").await?);
/// assert!(!store.set_if_absent("lock", "2").await?);
/// ```
#[derive(Clone, Default)]
pub struct DeterministicKeyValueStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
    operations: Arc<AtomicU64>,
}

impl DeterministicKeyValueStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_unavailable(&self, unavailable: bool) {
        debug!(unavailable, "in-memory store availability changed");
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of operations that reached the store, including failed ones.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    fn begin(&self, key: &str) -> Result<(), KeyValueStoreError> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KeyValueStoreError::Unavailable {
                reason: "in-memory store marked unavailable".to_string(),
            });
        }
        validate_key(key)
    }
}

#[async_trait]
impl KeyValueStore for DeterministicKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KeyValueStoreError> {
        self.begin(key)?;
        validate_value(value)?;

        let mut inner = self.inner.lock().await;
        if inner.contains_key(key) {
            return Ok(false);
        }
        inner.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KeyValueStoreError> {
        self.begin(key)?;
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn get_and_set(&self, key: &str, value: &str) -> Result<Option<String>, KeyValueStoreError> {
        self.begin(key)?;
        validate_value(value)?;
        Ok(self.inner.lock().await.insert(key.to_string(), value.to_string()))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KeyValueStoreError> {
        self.begin(key)?;

        let mut inner = self.inner.lock().await;
        match inner.get(key) {
            Some(current) if current == expected => {
                inner.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, KeyValueStoreError> {
        self.begin(key)?;
        Ok(self.inner.lock().await.remove(key).is_some())
    }
}
