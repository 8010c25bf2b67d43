//! Pure lock computation functions.
//!
//! # Tiger Style
//!
//! - Uses saturating arithmetic for all calculations
//! - Time is passed explicitly (no calls to system time)
//! - Deterministic behavior for testing and verification

use rddlock_time::ms_to_ns;

/// Compute the absolute expiry instant of a lease starting at `now_ns`.
///
/// # Tiger Style
///
/// - Uses saturating_add to prevent overflow
#[inline]
pub fn compute_lease_expiry_ns(now_ns: u64, lease_ms: u64) -> u64 {
    now_ns.saturating_add(ms_to_ns(lease_ms))
}

/// Check if a lease has lapsed.
///
/// A lease is live up to and including its expiry instant; it has lapsed
/// only once `now_ns` is strictly past it.
///
/// # Example
///
/// ```ignore
/// assert!(!is_lease_expired(1000, 1000));
/// assert!(is_lease_expired(1000, 1001));
/// ```
#[inline]
pub fn is_lease_expired(expires_at_ns: u64, now_ns: u64) -> bool {
    now_ns > expires_at_ns
}

/// Remaining lease time in nanoseconds (0 once lapsed).
#[inline]
pub fn remaining_lease_ns(expires_at_ns: u64, now_ns: u64) -> u64 {
    expires_at_ns.saturating_sub(now_ns)
}

/// Decide whether a replace-based takeover won.
///
/// `get_and_set` always writes. The takeover only counts if the value it
/// displaced is exactly the value read beforehand; anything else means
/// another process replaced the key in between. An empty value is the same
/// as a missing key.
///
/// # Arguments
///
/// * `displaced` - Value returned by `get_and_set`
/// * `observed` - Value read before the replace (`None` if the key was missing)
#[inline]
pub fn is_takeover_confirmed(displaced: Option<&str>, observed: Option<&str>) -> bool {
    let present = |value: &&str| !value.is_empty();
    displaced.filter(present) == observed.filter(present)
}

/// Decide whether a forced release should defer to natural expiry.
///
/// Deleting a lease that lapses within `margin_ns` anyway gains little and
/// risks deleting a successor's lock, so such deletes are refused.
///
/// # Tiger Style
///
/// - Uses saturating_add to prevent overflow
#[inline]
pub fn should_defer_to_expiry(expires_at_ns: u64, now_ns: u64, margin_ns: u64) -> bool {
    now_ns.saturating_add(margin_ns) > expires_at_ns
}

/// Deadline for work run under a lock.
///
/// Never longer than the lease, and never longer than what is actually left
/// on the token (acquisition itself consumes part of the lease).
#[inline]
pub fn compute_run_deadline_ns(lease_ms: u64, remaining_ns: u64) -> u64 {
    ms_to_ns(lease_ms).min(remaining_ns)
}

/// Clamp a requested attempt count into `1..=max`.
///
/// Zero attempts would never touch the store, which callers never mean.
#[inline]
pub fn clamp_attempts(requested: u32, max: u32) -> u32 {
    requested.clamp(1, max.max(1))
}

/// Result of backoff calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffResult {
    /// Sleep duration in milliseconds (includes jitter).
    pub sleep_ms: u64,
    /// Next backoff value (for exponential increase).
    pub next_backoff_ms: u64,
}

/// Compute exponential backoff with jitter.
///
/// With `max_backoff_ms == current_backoff_ms` and a zero seed this is a
/// fixed backoff.
///
/// # Arguments
///
/// * `current_backoff_ms` - Current backoff duration in milliseconds
/// * `max_backoff_ms` - Maximum allowed backoff in milliseconds
/// * `jitter_seed` - Random value for jitter calculation (0 disables jitter)
///
/// # Example
///
/// ```ignore
/// // Default retry: 1 ms, never growing.
/// let result = compute_backoff_with_jitter(1, 1, 0);
/// assert_eq!(result.sleep_ms, 1);
/// assert_eq!(result.next_backoff_ms, 1);
///
/// // 4 ms step with jitter: 7 % (4 / 2 + 1) = 1.
/// let result = compute_backoff_with_jitter(4, 8, 7);
/// assert_eq!(result.sleep_ms, 5);
/// assert_eq!(result.next_backoff_ms, 8);
/// ```
#[inline]
pub fn compute_backoff_with_jitter(current_backoff_ms: u64, max_backoff_ms: u64, jitter_seed: u64) -> BackoffResult {
    // At most half the step is added on top.
    let max_jitter = current_backoff_ms.saturating_div(2).saturating_add(1);
    let jitter = jitter_seed % max_jitter;

    let sleep_ms = current_backoff_ms.saturating_add(jitter);

    let doubled = current_backoff_ms.saturating_mul(2);
    let next_backoff_ms = doubled.min(max_backoff_ms);

    BackoffResult {
        sleep_ms,
        next_backoff_ms,
    }
}
