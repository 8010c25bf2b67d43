//! Integration tests for the lock protocol against the in-memory store.
//!
//! Timing-sensitive cases use the system clock with short real sleeps.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use rddlock_coordination::KeyValueStore;
use rddlock_coordination::KeyValueStoreError;
use rddlock_coordination::LockClient;
use rddlock_coordination::LockConfig;
use rddlock_coordination::LockError;
use rddlock_coordination::LockState;
use rddlock_coordination::LockToken;
use rddlock_coordination::ReleaseFallback;
use rddlock_coordination::ReleaseOutcome;
use rddlock_kv::DeterministicKeyValueStore;

fn client() -> LockClient<DeterministicKeyValueStore> {
    LockClient::new(DeterministicKeyValueStore::new(), LockConfig::default())
}

// =============================================================================
// Acquisition
// =============================================================================

#[tokio::test]
async fn test_mutual_exclusion_under_concurrency() {
    let client = client();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.acquire_once("orders", 10_000).await }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(matches!(e, LockError::LockHeld { .. }), "unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_expired_lease_is_taken_over() {
    let client = client();
    let first = client.acquire_once("orders", 1).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;

    let second = client.acquire_once("orders", 1_000).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(client.inspect("orders").await.unwrap().token(), Some(second));
}

#[tokio::test]
async fn test_round_trip() {
    let client = client();

    let token = client.acquire_once("orders", 1_000).await.unwrap();
    assert!(client.release("orders", token).await);
    assert!(client.acquire_once("orders", 1_000).await.is_ok());
}

#[tokio::test]
async fn test_try_lock_reports_zero_on_failure() {
    let client = client();

    let (acquired, token) = client.try_lock("orders", 1_000).await;
    assert!(acquired);
    assert!(!token.is_zero());

    let (acquired, token) = client.try_lock("orders", 1_000).await;
    assert!(!acquired);
    assert_eq!(token, LockToken::ZERO);
}

#[tokio::test]
async fn test_tokens_are_unique_per_acquisition() {
    let client = client();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..100 {
        let token = client.acquire_once("orders", 1_000).await.unwrap();
        assert!(seen.insert(token));
        assert!(client.release("orders", token).await);
    }
}

#[tokio::test]
async fn test_corrupted_value_blocks_acquire() {
    let client = client();
    client.store().set_if_absent("orders", "not-a-token").await.unwrap();

    let err = client.acquire_once("orders", 1_000).await.unwrap_err();
    match err {
        LockError::CorruptedToken { key, value } => {
            assert_eq!(key, "orders");
            assert_eq!(value, "not-a-token");
        }
        other => panic!("expected CorruptedToken, got {other}"),
    }
    assert!(matches!(client.inspect("orders").await, Err(LockError::CorruptedToken { .. })));
}

#[tokio::test]
async fn test_legacy_integer_token_is_understood() {
    let client = client();
    // Expired long ago.
    client.store().set_if_absent("orders", "1000").await.unwrap();

    assert_eq!(
        client.inspect("orders").await.unwrap(),
        LockState::Expired {
            token: LockToken::new(1_000, 0)
        }
    );
    assert!(client.acquire_once("orders", 1_000).await.is_ok());
}

#[tokio::test]
async fn test_empty_value_counts_as_missing() {
    let client = client();
    client.store().set_if_absent("orders", "").await.unwrap();

    assert_eq!(client.inspect("orders").await.unwrap(), LockState::Absent);
    let token = client.acquire_once("orders", 1_000).await.unwrap();
    assert_eq!(client.inspect("orders").await.unwrap().token(), Some(token));

    let other = self::client();
    other.store().set_if_absent("orders", "").await.unwrap();
    assert!(other.acquire_with_retry("orders", 1_000, 5).await.is_ok());
}

// =============================================================================
// Store failures
// =============================================================================

#[tokio::test]
async fn test_store_failure_never_acquires() {
    let store = DeterministicKeyValueStore::new();
    let client = LockClient::new(store.clone(), LockConfig::default());

    store.set_unavailable(true);
    let err = client.acquire_once("orders", 1_000).await.unwrap_err();
    assert!(err.is_store_failure());
    assert_eq!(client.try_lock("orders", 1_000).await, (false, LockToken::ZERO));

    store.set_unavailable(false);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_store_failure_never_releases() {
    let store = DeterministicKeyValueStore::new();
    let client = LockClient::new(store.clone(), LockConfig::default());
    let token = client.acquire_once("orders", 1_000).await.unwrap();

    store.set_unavailable(true);
    assert!(!client.release("orders", token).await);
    assert!(matches!(client.try_release("orders", token).await, Err(LockError::StoreUnavailable { .. })));
    assert!(!client.force_release("orders").await);
    assert!(!client.safe_force_release("orders", 0).await);

    store.set_unavailable(false);
    assert_eq!(store.get("orders").await.unwrap(), Some(token.encode()));
}

#[tokio::test]
async fn test_invalid_key_is_a_store_failure() {
    let client = client();
    let err = client.acquire_once("", 1_000).await.unwrap_err();
    assert!(matches!(err, LockError::StoreUnavailable {
        source: KeyValueStoreError::EmptyKey
    }));
}

// =============================================================================
// Release
// =============================================================================

#[tokio::test]
async fn test_stale_token_release_leaves_successor_intact() {
    let client = client();
    let stale = client.acquire_once("orders", 1).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let current = client.acquire_once("orders", 10_000).await.unwrap();

    assert!(!client.release("orders", stale).await);
    assert!(matches!(client.try_release("orders", stale).await, Err(LockError::NotOwner { .. })));
    assert_eq!(client.store().get("orders").await.unwrap(), Some(current.encode()));
}

#[tokio::test]
async fn test_second_release_fails_quietly() {
    let client = client();
    let token = client.acquire_once("orders", 1_000).await.unwrap();

    assert!(client.release("orders", token).await);
    assert!(!client.release("orders", token).await);
}

#[tokio::test]
async fn test_zero_token_release_skips_store() {
    let store = DeterministicKeyValueStore::new();
    let client = LockClient::new(store.clone(), LockConfig::default());

    let before = store.operation_count();
    assert!(!client.release("orders", LockToken::ZERO).await);
    assert!(matches!(client.try_release("orders", LockToken::ZERO).await, Err(LockError::NotOwner { .. })));
    assert_eq!(store.operation_count(), before);
}

#[tokio::test]
async fn test_force_release_deletes_any_holder() {
    let client = client();
    client.acquire_once("orders", 10_000).await.unwrap();

    assert!(client.force_release("orders").await);
    assert_eq!(client.inspect("orders").await.unwrap(), LockState::Absent);

    // Accepted by the store even with nothing to delete.
    assert!(client.force_release("orders").await);
    assert!(!client.try_force_release("orders").await.unwrap());
}

#[tokio::test]
async fn test_safe_force_release_respects_margin() {
    let client = client();

    client.acquire_once("short", 10).await.unwrap();
    assert!(!client.safe_force_release("short", 100).await);
    assert!(client.store().get("short").await.unwrap().is_some());

    client.acquire_once("long", 10_000).await.unwrap();
    assert!(client.safe_force_release("long", 100).await);
    assert!(client.store().get("long").await.unwrap().is_none());
}

#[tokio::test]
async fn test_safe_force_release_absent_key() {
    let client = client();
    assert!(!client.safe_force_release("orders", 100).await);
}

#[tokio::test]
async fn test_safe_force_release_removes_corrupted_value() {
    let client = client();
    client.store().set_if_absent("orders", "garbage").await.unwrap();

    assert!(client.safe_force_release("orders", 100).await);
    assert!(client.acquire_once("orders", 1_000).await.is_ok());
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn test_retry_exhausts_attempts() {
    let store = DeterministicKeyValueStore::new();
    let client = LockClient::new(store.clone(), LockConfig::default());
    client.acquire_once("orders", 60_000).await.unwrap();

    let err = client.acquire_with_retry("orders", 1_000, 3).await.unwrap_err();
    assert!(matches!(err, LockError::LockUnavailable { attempts: 3, .. }), "got {err}");
}

#[tokio::test]
async fn test_retry_zero_attempts_still_tries_once() {
    let store = DeterministicKeyValueStore::new();
    let client = LockClient::new(store.clone(), LockConfig::default());

    let before = store.operation_count();
    assert!(client.acquire_with_retry("orders", 1_000, 0).await.is_ok());
    assert_eq!(store.operation_count(), before + 1);
}

#[tokio::test]
async fn test_retry_reports_store_failure() {
    let store = DeterministicKeyValueStore::new();
    let client = LockClient::new(store.clone(), LockConfig::default());
    store.set_unavailable(true);

    let err = client.acquire_with_retry("orders", 1_000, 3).await.unwrap_err();
    assert!(err.is_store_failure());
    // One set_if_absent per attempt, nothing after the failure.
    assert_eq!(store.operation_count(), 3);
}

#[tokio::test]
async fn test_retry_succeeds_once_holder_releases() {
    let config = LockConfig {
        acquire_attempts: 200,
        retry_backoff_ms: 5,
        max_backoff_ms: 5,
        ..Default::default()
    };
    let client = LockClient::new(DeterministicKeyValueStore::new(), config);
    let holder = client.acquire_once("orders", 60_000).await.unwrap();

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.acquire_with_retry("orders", 1_000, 200).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(client.release("orders", holder).await);

    let token = waiter.await.unwrap().unwrap();
    assert_ne!(token, holder);
}

#[tokio::test]
async fn test_retry_succeeds_after_expiry() {
    let config = LockConfig {
        retry_backoff_ms: 2,
        max_backoff_ms: 2,
        ..Default::default()
    };
    let client = LockClient::new(DeterministicKeyValueStore::new(), config);
    client.acquire_once("orders", 5).await.unwrap();

    assert!(client.acquire_with_retry("orders", 1_000, 100).await.is_ok());
}

#[tokio::test]
async fn test_retry_with_jitter_and_growing_backoff() {
    let config = LockConfig {
        jitter: true,
        retry_backoff_ms: 1,
        max_backoff_ms: 8,
        ..Default::default()
    };
    let client = LockClient::new(DeterministicKeyValueStore::new(), config);
    client.acquire_once("orders", 20).await.unwrap();

    assert!(client.acquire_with_retry("orders", 1_000, 200).await.is_ok());

    client.acquire_once("invoices", 60_000).await.unwrap();
    let err = client.acquire_with_retry("invoices", 1_000, 4).await.unwrap_err();
    assert!(matches!(err, LockError::LockUnavailable { attempts: 4, .. }), "got {err}");
}

// =============================================================================
// Takeover race
// =============================================================================

/// Store that lets a competitor replace the key right before our replace.
struct RacingStore {
    inner: Arc<DeterministicKeyValueStore>,
    competitor_value: String,
    raced: AtomicBool,
}

#[async_trait]
impl KeyValueStore for RacingStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KeyValueStoreError> {
        self.inner.set_if_absent(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KeyValueStoreError> {
        self.inner.get(key).await
    }

    async fn get_and_set(&self, key: &str, value: &str) -> Result<Option<String>, KeyValueStoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.get_and_set(key, &self.competitor_value).await?;
        }
        self.inner.get_and_set(key, value).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KeyValueStoreError> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> Result<bool, KeyValueStoreError> {
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn test_takeover_race_is_lost_by_late_replacer() {
    let inner = DeterministicKeyValueStore::new();
    inner.set_if_absent("orders", &LockToken::new(1, 1).encode()).await.unwrap();

    let competitor = LockToken::new(u64::MAX, 2).encode();
    let store = Arc::new(RacingStore {
        inner,
        competitor_value: competitor,
        raced: AtomicBool::new(false),
    });
    let client = LockClient::new(store, LockConfig::default());

    let err = client.acquire_once("orders", 1_000).await.unwrap_err();
    assert!(matches!(err, LockError::TakeoverRaced { .. }), "got {err}");
}

/// Store whose first read sees the key deleted, optionally re-acquired by a
/// competitor right after.
struct VanishingStore {
    inner: Arc<DeterministicKeyValueStore>,
    competitor_value: Option<String>,
    vanished: AtomicBool,
}

impl VanishingStore {
    fn new(inner: Arc<DeterministicKeyValueStore>, competitor_value: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            competitor_value,
            vanished: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl KeyValueStore for VanishingStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, KeyValueStoreError> {
        self.inner.set_if_absent(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KeyValueStoreError> {
        if self.vanished.swap(true, Ordering::SeqCst) {
            return self.inner.get(key).await;
        }
        self.inner.delete(key).await?;
        if let Some(competitor) = &self.competitor_value {
            self.inner.set_if_absent(key, competitor).await?;
        }
        Ok(None)
    }

    async fn get_and_set(&self, key: &str, value: &str) -> Result<Option<String>, KeyValueStoreError> {
        self.inner.get_and_set(key, value).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KeyValueStoreError> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> Result<bool, KeyValueStoreError> {
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn test_holder_deleted_between_setnx_and_get() {
    let inner = DeterministicKeyValueStore::new();
    inner.set_if_absent("orders", &LockToken::new(u64::MAX, 1).encode()).await.unwrap();

    let client = LockClient::new(VanishingStore::new(inner.clone(), None), LockConfig::default());

    let token = client.acquire_once("orders", 1_000).await.unwrap();
    assert_eq!(inner.get("orders").await.unwrap(), Some(token.encode()));
}

#[tokio::test]
async fn test_competitor_wins_gap_after_delete() {
    let inner = DeterministicKeyValueStore::new();
    inner.set_if_absent("orders", &LockToken::new(u64::MAX, 1).encode()).await.unwrap();

    let competitor = LockToken::new(u64::MAX, 2).encode();
    let client = LockClient::new(VanishingStore::new(inner.clone(), Some(competitor.clone())), LockConfig::default());

    let err = client.acquire_once("orders", 1_000).await.unwrap_err();
    assert!(matches!(err, LockError::TakeoverRaced { .. }), "got {err}");

    // The losing replace already overwrote the competitor's value.
    let stored = inner.get("orders").await.unwrap().unwrap();
    assert_ne!(stored, competitor);
    assert!(LockToken::decode(&stored).is_ok());
}

// =============================================================================
// Scoped guard
// =============================================================================

#[tokio::test]
async fn test_guard_release_outcome() {
    let client = client();
    let guard = client.lock("orders", 1_000).await.unwrap();
    assert_eq!(guard.key(), "orders");
    assert!(guard.remaining() <= Duration::from_millis(1_000));

    assert_eq!(guard.release().await, ReleaseOutcome::Released);
    assert_eq!(client.inspect("orders").await.unwrap(), LockState::Absent);
}

#[tokio::test]
async fn test_guard_drop_releases_in_background() {
    let client = client();
    {
        let _guard = client.lock("orders", 10_000).await.unwrap();
    }

    // The release runs on a spawned task.
    for _ in 0..100 {
        if client.inspect("orders").await.unwrap() == LockState::Absent {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("dropped guard did not release the lock");
}

#[tokio::test]
async fn test_guard_force_fallback_after_takeover() {
    let client = client();
    let guard = client.lock("orders", 1).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    client.acquire_once("orders", 10_000).await.unwrap();

    // Default fallback deletes the successor's lock.
    assert_eq!(guard.release().await, ReleaseOutcome::ForceReleased);
    assert_eq!(client.inspect("orders").await.unwrap(), LockState::Absent);
}

#[tokio::test]
async fn test_guard_safe_force_fallback_spares_expiring_successor() {
    let config = LockConfig {
        release_fallback: ReleaseFallback::SafeForce,
        safety_margin_ms: 1_000,
        ..Default::default()
    };
    let client = LockClient::new(DeterministicKeyValueStore::new(), config);
    let guard = client.lock("orders", 1).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let successor = client.acquire_once("orders", 100).await.unwrap();

    assert_eq!(guard.release().await, ReleaseOutcome::Deferred);
    assert_eq!(client.inspect("orders").await.unwrap().token(), Some(successor));
}
