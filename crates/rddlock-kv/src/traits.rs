//! The store capability consumed by the lock protocol.

use async_trait::async_trait;

use crate::error::KeyValueStoreError;

/// Single-key atomic operations the lock protocol is built on.
///
/// Every method must take effect atomically on the store side and report
/// accurately whether it did. Implementations must route all operations on
/// one key through a single linearizable point (one node, or one shard of a
/// cluster).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Write `value` only if `key` does not exist. Returns `true` iff written.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KeyValueStoreError>;

    /// Read the current value, `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, KeyValueStoreError>;

    /// Unconditionally write `value`, returning the value it replaced.
    async fn get_and_set(&self, key: &str, value: &str) -> Result<Option<String>, KeyValueStoreError>;

    /// Delete `key` only if its current value equals `expected`.
    ///
    /// The comparison and the delete must be one indivisible store-side step.
    /// Returns `true` iff the key was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KeyValueStoreError>;

    /// Unconditionally delete `key`. Returns `true` iff a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, KeyValueStoreError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KeyValueStoreError> {
        (**self).set_if_absent(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KeyValueStoreError> {
        (**self).get(key).await
    }

    async fn get_and_set(&self, key: &str, value: &str) -> Result<Option<String>, KeyValueStoreError> {
        (**self).get_and_set(key, value).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KeyValueStoreError> {
        (**self).compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> Result<bool, KeyValueStoreError> {
        (**self).delete(key).await
    }
}
