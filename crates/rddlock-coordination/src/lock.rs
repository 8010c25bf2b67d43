//! Distributed mutex over a single-key atomic store.
//!
//! Acquisition:
//! 1. `set_if_absent` with a fresh token (fast path)
//! 2. otherwise read the current token; a live lease means the lock is held
//! 3. a lapsed lease is taken over with `get_and_set`, which only counts if
//!    the displaced value is exactly the one read in step 2
//!
//! Release is a single `compare_and_delete` against the caller's token, so a
//! holder whose lease lapsed can never remove a successor's lock through it.
//! The forced variants exist as explicit fallbacks and are logged loudly.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rddlock_kv::KeyValueStore;
use rddlock_time::SystemTimeProvider;
use rddlock_time::TimeProvider;
use rddlock_time::ms_to_ns;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::LockConfig;
use crate::config::ReleaseFallback;
use crate::constants::MAX_ACQUIRE_ATTEMPTS;
use crate::constants::MAX_BACKOFF_MS;
use crate::error::LockError;
use crate::error::LockHeldSnafu;
use crate::error::LockUnavailableSnafu;
use crate::error::NotOwnerSnafu;
use crate::error::TakeoverRacedSnafu;
use crate::types::LockState;
use crate::types::LockToken;
use crate::verified::clamp_attempts;
use crate::verified::compute_backoff_with_jitter;
use crate::verified::compute_lease_expiry_ns;
use crate::verified::is_takeover_confirmed;
use crate::verified::should_defer_to_expiry;

/// Result of a scoped release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// The ownership-verified delete removed our token.
    Released,
    /// Verified release failed and the fallback deleted the key.
    ForceReleased,
    /// Nothing was deleted; the lease is left to expire.
    Deferred,
    /// The store failed on every path. The lease will still expire.
    Failed,
}

impl ReleaseOutcome {
    /// Whether the key was removed by this release.
    pub fn is_removed(&self) -> bool {
        matches!(self, ReleaseOutcome::Released | ReleaseOutcome::ForceReleased)
    }
}

/// Lock protocol client.
///
/// Holds the injected store, the clock used to compute lease instants, and
/// the retry and release policy. Cloning shares the store handle.
pub struct LockClient<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn TimeProvider>,
    config: LockConfig,
}

impl<S: KeyValueStore + ?Sized> Clone for LockClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<S: KeyValueStore + ?Sized> std::fmt::Debug for LockClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockClient").field("clock", &self.clock).field("config", &self.config).finish_non_exhaustive()
    }
}

impl<S: KeyValueStore + ?Sized> LockClient<S> {
    /// Create a client reading the system clock.
    pub fn new(store: Arc<S>, config: LockConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemTimeProvider::new()),
            config,
        }
    }

    /// Replace the clock.
    pub fn with_time_provider(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current time from the client's clock (Unix ns).
    pub fn now_ns(&self) -> u64 {
        self.clock.now_unix_ns()
    }

    /// Single acquisition attempt.
    ///
    /// Returns the installed token on success. Every error means the lock
    /// was not acquired.
    pub async fn acquire_once(&self, key: &str, lease_ms: u64) -> Result<LockToken, LockError> {
        let now_ns = self.now_ns();
        let token = LockToken::new(compute_lease_expiry_ns(now_ns, lease_ms), fresh_nonce());
        let encoded = token.encode();

        if self.store.set_if_absent(key, &encoded).await? {
            debug!(key = %key, expires_at_ns = token.expires_at_ns(), "lock acquired");
            return Ok(token);
        }

        let Some(observed) = self.read_token_value(key).await? else {
            // Deleted (or emptied) between the two calls. Replace and check nobody beat us.
            let displaced = self.store.get_and_set(key, &encoded).await?;
            if is_takeover_confirmed(displaced.as_deref(), None) {
                debug!(key = %key, expires_at_ns = token.expires_at_ns(), "lock acquired after concurrent delete");
                return Ok(token);
            }
            debug!(key = %key, "lost race after concurrent delete");
            return TakeoverRacedSnafu { key }.fail();
        };

        let previous = match LockToken::decode(&observed) {
            Ok(previous) => previous,
            Err(_) => {
                warn!(key = %key, value = %observed, "stored lock value is not a token");
                return Err(LockError::CorruptedToken {
                    key: key.to_string(),
                    value: observed,
                });
            }
        };

        if !previous.is_expired_at(self.now_ns()) {
            debug!(key = %key, expires_at_ns = previous.expires_at_ns(), "lock held");
            return LockHeldSnafu {
                key,
                expires_at_ns: previous.expires_at_ns(),
            }
            .fail();
        }

        let displaced = self.store.get_and_set(key, &encoded).await?;
        if is_takeover_confirmed(displaced.as_deref(), Some(observed.as_str())) {
            debug!(
                key = %key,
                previous_expires_at_ns = previous.expires_at_ns(),
                expires_at_ns = token.expires_at_ns(),
                "took over expired lock"
            );
            Ok(token)
        } else {
            debug!(key = %key, "lost takeover race");
            TakeoverRacedSnafu { key }.fail()
        }
    }

    /// Boolean form of [`acquire_once`](Self::acquire_once).
    ///
    /// Returns `(false, LockToken::ZERO)` on every failure.
    pub async fn try_lock(&self, key: &str, lease_ms: u64) -> (bool, LockToken) {
        match self.acquire_once(key, lease_ms).await {
            Ok(token) => (true, token),
            Err(_) => (false, LockToken::ZERO),
        }
    }

    /// Acquire with up to `max_attempts` attempts.
    ///
    /// Each attempt computes a fresh expiry instant. The configured backoff
    /// is slept between attempts, never after the last one.
    pub async fn acquire_with_retry(&self, key: &str, lease_ms: u64, max_attempts: u32) -> Result<LockToken, LockError> {
        let attempts = clamp_attempts(max_attempts, MAX_ACQUIRE_ATTEMPTS);
        let mut backoff_ms = self.config.retry_backoff_ms.min(MAX_BACKOFF_MS);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.acquire_once(key, lease_ms).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    debug!(key = %key, attempt, attempts, error = %e, "acquire attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                let seed = if self.config.jitter { rand::rng().random::<u64>() } else { 0 };
                let backoff = compute_backoff_with_jitter(backoff_ms, self.config.max_backoff_ms.min(MAX_BACKOFF_MS), seed);
                tokio::time::sleep(Duration::from_millis(backoff.sleep_ms.min(MAX_BACKOFF_MS))).await;
                backoff_ms = backoff.next_backoff_ms;
            }
        }

        match last_error {
            Some(e) if e.is_store_failure() => Err(e),
            _ => LockUnavailableSnafu { key, attempts }.fail(),
        }
    }

    /// Ownership-verified release.
    ///
    /// Deletes the key only if it still holds `token`. The ZERO token is
    /// rejected without contacting the store.
    pub async fn try_release(&self, key: &str, token: LockToken) -> Result<(), LockError> {
        if token.is_zero() {
            debug!(key = %key, "refusing to release with zero token");
            return NotOwnerSnafu { key }.fail();
        }

        if self.store.compare_and_delete(key, &token.encode()).await? {
            debug!(key = %key, expires_at_ns = token.expires_at_ns(), "lock released");
            Ok(())
        } else {
            debug!(key = %key, expires_at_ns = token.expires_at_ns(), "release rejected: not the owner");
            NotOwnerSnafu { key }.fail()
        }
    }

    /// Boolean form of [`try_release`](Self::try_release). Never fails.
    pub async fn release(&self, key: &str, token: LockToken) -> bool {
        match self.try_release(key, token).await {
            Ok(()) => true,
            Err(e) => {
                if e.is_store_failure() {
                    warn!(key = %key, error = %e, "lock release failed");
                }
                false
            }
        }
    }

    /// Unconditional delete. Returns whether a key was removed.
    ///
    /// If the caller's lease already lapsed and another process took over,
    /// this deletes that process's lock.
    pub async fn try_force_release(&self, key: &str) -> Result<bool, LockError> {
        warn!(key = %key, "force releasing lock without ownership check");
        Ok(self.store.delete(key).await?)
    }

    /// Boolean form of [`try_force_release`](Self::try_force_release).
    ///
    /// `true` when the store accepted the delete, whether or not a key existed.
    pub async fn force_release(&self, key: &str) -> bool {
        match self.try_force_release(key).await {
            Ok(_) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "force release failed");
                false
            }
        }
    }

    /// Forced release that defers to natural expiry.
    ///
    /// Returns `Ok(false)` without deleting when the key is absent or its
    /// lease lapses within `safety_margin_ms`. The delete is conditional on
    /// the exact value read, so a value replaced in between survives. A value
    /// that is not a token is deleted.
    pub async fn try_safe_force_release(&self, key: &str, safety_margin_ms: u64) -> Result<bool, LockError> {
        let Some(observed) = self.read_token_value(key).await? else {
            debug!(key = %key, "safe force release: key absent");
            return Ok(false);
        };

        match LockToken::decode(&observed) {
            Ok(token) => {
                let now_ns = self.now_ns();
                if should_defer_to_expiry(token.expires_at_ns(), now_ns, ms_to_ns(safety_margin_ms)) {
                    debug!(
                        key = %key,
                        expires_at_ns = token.expires_at_ns(),
                        safety_margin_ms,
                        "lease lapses within safety margin, deferring to expiry"
                    );
                    return Ok(false);
                }
                warn!(key = %key, expires_at_ns = token.expires_at_ns(), "safe force releasing live lock");
            }
            Err(_) => {
                warn!(key = %key, value = %observed, "deleting corrupted lock value");
            }
        }

        Ok(self.store.compare_and_delete(key, &observed).await?)
    }

    /// Boolean form of [`try_safe_force_release`](Self::try_safe_force_release).
    pub async fn safe_force_release(&self, key: &str, safety_margin_ms: u64) -> bool {
        match self.try_safe_force_release(key, safety_margin_ms).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(key = %key, error = %e, "safe force release failed");
                false
            }
        }
    }

    /// Observe the current state of `key`.
    pub async fn inspect(&self, key: &str) -> Result<LockState, LockError> {
        let Some(observed) = self.read_token_value(key).await? else {
            return Ok(LockState::Absent);
        };
        match LockToken::decode(&observed) {
            Ok(token) => Ok(LockState::observe(token, self.now_ns())),
            Err(_) => Err(LockError::CorruptedToken {
                key: key.to_string(),
                value: observed,
            }),
        }
    }

    /// Read the stored value; an empty value counts as no lock.
    async fn read_token_value(&self, key: &str) -> Result<Option<String>, LockError> {
        Ok(self.store.get(key).await?.filter(|value| !value.is_empty()))
    }

    /// Verified release followed by the configured fallback.
    pub async fn release_with_fallback(&self, key: &str, token: LockToken) -> ReleaseOutcome {
        if token.is_zero() {
            return ReleaseOutcome::Failed;
        }

        let error = match self.try_release(key, token).await {
            Ok(()) => return ReleaseOutcome::Released,
            Err(e) => e,
        };

        let fallback = self.config.release_fallback;
        warn!(key = %key, error = %error, ?fallback, "verified release failed");

        match fallback {
            ReleaseFallback::Force => match self.try_force_release(key).await {
                Ok(_) => ReleaseOutcome::ForceReleased,
                Err(e) => {
                    warn!(key = %key, error = %e, "fallback force release failed");
                    ReleaseOutcome::Failed
                }
            },
            ReleaseFallback::SafeForce => match self.try_safe_force_release(key, self.config.safety_margin_ms).await {
                Ok(true) => ReleaseOutcome::ForceReleased,
                Ok(false) => ReleaseOutcome::Deferred,
                Err(e) => {
                    warn!(key = %key, error = %e, "fallback safe force release failed");
                    ReleaseOutcome::Failed
                }
            },
            ReleaseFallback::None => ReleaseOutcome::Deferred,
        }
    }
}

impl<S: KeyValueStore + ?Sized + 'static> LockClient<S> {
    /// Acquire with the configured attempt budget and wrap the token in a guard.
    pub async fn lock(&self, key: &str, lease_ms: u64) -> Result<LockGuard<S>, LockError> {
        let token = self.acquire_with_retry(key, lease_ms, self.config.acquire_attempts).await?;
        Ok(LockGuard {
            client: self.clone(),
            key: key.to_string(),
            token,
            released: false,
        })
    }
}

/// Non-zero random nonce.
fn fresh_nonce() -> u64 {
    rand::rng().random_range(1..=u64::MAX)
}

/// RAII guard for an acquired lock.
///
/// Call [`release`](Self::release) to observe the outcome. A guard dropped
/// without it releases in a task spawned on the current Tokio runtime;
/// outside a runtime the lease is left to expire.
pub struct LockGuard<S: KeyValueStore + ?Sized + 'static> {
    client: LockClient<S>,
    key: String,
    token: LockToken,
    released: bool,
}

impl<S: KeyValueStore + ?Sized + 'static> std::fmt::Debug for LockGuard<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).field("token", &self.token).finish()
    }
}

impl<S: KeyValueStore + ?Sized + 'static> LockGuard<S> {
    /// The lock key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The token installed by this acquisition.
    pub fn token(&self) -> LockToken {
        self.token
    }

    /// Time left on the lease according to the client's clock.
    pub fn remaining(&self) -> Duration {
        self.token.remaining_at(self.client.now_ns())
    }

    /// Release now, applying the configured fallback on failure.
    pub async fn release(mut self) -> ReleaseOutcome {
        let outcome = self.client.release_with_fallback(&self.key, self.token).await;
        self.released = true;
        outcome
    }
}

impl<S: KeyValueStore + ?Sized + 'static> Drop for LockGuard<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "lock guard dropped outside a runtime, lease will expire");
            return;
        };

        let client = self.client.clone();
        let key = std::mem::take(&mut self.key);
        let token = self.token;
        handle.spawn(async move {
            let outcome = client.release_with_fallback(&key, token).await;
            debug!(key = %key, ?outcome, "lock released on drop");
        });
    }
}
