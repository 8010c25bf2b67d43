//! Error types for the lock protocol.

use rddlock_kv::KeyValueStoreError;
use snafu::Snafu;

/// Errors from lock operations.
///
/// Every variant means "not acquired" on the acquire paths and "not released"
/// on the release paths. A store failure is never reported as success.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LockError {
    /// Every acquisition attempt failed.
    #[snafu(display("lock '{key}' unavailable after {attempts} attempts"))]
    LockUnavailable {
        /// The lock key.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The lock is held by a live lease.
    #[snafu(display("lock '{key}' held until {expires_at_ns}ns"))]
    LockHeld {
        /// The lock key.
        key: String,
        /// When the current lease expires (Unix ns).
        expires_at_ns: u64,
    },

    /// Another process replaced the expired token first.
    #[snafu(display("lost takeover race for lock '{key}'"))]
    TakeoverRaced {
        /// The lock key.
        key: String,
    },

    /// The presented token is not the current owner.
    #[snafu(display("not the owner of lock '{key}'"))]
    NotOwner {
        /// The lock key.
        key: String,
    },

    /// The value stored under the key is not a lock token.
    #[snafu(display("corrupted token in lock '{key}': {value:?}"))]
    CorruptedToken {
        /// The lock key.
        key: String,
        /// The raw stored value.
        value: String,
    },

    /// The store failed; the outcome is pessimistic.
    #[snafu(display("store unavailable: {source}"))]
    StoreUnavailable {
        /// The underlying error.
        source: KeyValueStoreError,
    },

    /// Work did not finish within the lease window.
    #[snafu(display("work under lock '{key}' exceeded its {deadline_ms}ms deadline"))]
    DeadlineExceeded {
        /// The lock key.
        key: String,
        /// The deadline the work raced against.
        deadline_ms: u64,
    },

    /// Work panicked or was aborted before completing.
    #[snafu(display("work under lock '{key}' did not complete: {reason}"))]
    WorkPanicked {
        /// The lock key.
        key: String,
        /// Description of the failure.
        reason: String,
    },
}

impl From<KeyValueStoreError> for LockError {
    fn from(source: KeyValueStoreError) -> Self {
        LockError::StoreUnavailable { source }
    }
}

impl LockError {
    /// Whether this error came from the store rather than from lock state.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, LockError::StoreUnavailable { .. })
    }
}
