//! Fixed defaults and bounds for the lock protocol.
//!
//! Tiger Style: every retry loop and timer has an explicit upper bound.

/// Default lease duration in milliseconds.
pub const DEFAULT_LEASE_MS: u64 = 1_000;

/// Default number of acquisition attempts for retrying acquires.
pub const DEFAULT_ACQUIRE_ATTEMPTS: u32 = 10;

/// Upper bound on acquisition attempts, whatever the caller asks for.
pub const MAX_ACQUIRE_ATTEMPTS: u32 = 10_000;

/// Default sleep between acquisition attempts in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1;

/// Default cap on the sleep between acquisition attempts in milliseconds.
///
/// Equal to [`DEFAULT_RETRY_BACKOFF_MS`], which keeps the backoff fixed.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 1;

/// Upper bound on any single backoff sleep in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 10_000;

/// Default margin for expiry-aware forced release in milliseconds.
pub const DEFAULT_SAFETY_MARGIN_MS: u64 = 100;

/// Upper bound on a lease in milliseconds (24 hours).
pub const MAX_LEASE_MS: u64 = 24 * 60 * 60 * 1_000;
