//! Time sources for lease arithmetic.
//!
//! Lock tokens carry an absolute expiry instant that every holder compares
//! against its own clock, so the clock has to be a wall clock (comparable
//! across processes) with resolution well below the shortest lease. Readings
//! are in Unix epoch nanoseconds.
//!
//! # TimeProvider Trait
//!
//! The [`TimeProvider`] trait makes time injectable. Use [`SystemTimeProvider`]
//! in production and [`SimulatedTimeProvider`] (behind the `simulation`
//! feature) in tests.
//!
//! # Tiger Style
//!
//! - No `.expect()` or `.unwrap()` - safe fallback to 0
//! - Saturating conversions, no panics on overflow

#[cfg(feature = "simulation")]
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
#[cfg(feature = "simulation")]
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Nanoseconds per millisecond.
pub const NANOS_PER_MILLI: u64 = 1_000_000;

// ============================================================================
// Free Functions
// ============================================================================

/// Get current Unix timestamp in nanoseconds.
///
/// Returns 0 if system time is before UNIX epoch, and saturates at `u64::MAX`
/// (year 2554).
#[inline]
pub fn current_time_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Convert milliseconds to nanoseconds, saturating.
#[inline]
pub fn ms_to_ns(ms: u64) -> u64 {
    ms.saturating_mul(NANOS_PER_MILLI)
}

// ============================================================================
// TimeProvider Trait
// ============================================================================

/// Trait for injectable time sources.
///
/// # Example
///
/// ```
/// use rddlock_time::{SystemTimeProvider, TimeProvider};
///
/// fn is_live<T: TimeProvider>(time: &T, expires_at_ns: u64) -> bool {
///     time.now_unix_ns() <= expires_at_ns
/// }
///
/// let time = SystemTimeProvider::new();
/// let expires_at = rddlock_time::current_time_ns() + 1_000_000_000;
/// assert!(is_live(&time, expires_at));
/// ```
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Get current Unix timestamp in nanoseconds.
    fn now_unix_ns(&self) -> u64;

    /// Get current Unix timestamp in milliseconds.
    fn now_unix_ms(&self) -> u64 {
        self.now_unix_ns() / NANOS_PER_MILLI
    }
}

// ============================================================================
// SystemTimeProvider (Production)
// ============================================================================

/// Production time provider backed by the system wall clock.
///
/// Readings never decrease for a given provider: if the wall clock steps
/// backwards (NTP correction), the provider keeps returning the highest value
/// it has handed out until the wall clock catches up.
#[derive(Debug, Default)]
pub struct SystemTimeProvider {
    last_ns: AtomicU64,
}

impl SystemTimeProvider {
    /// Create a new system time provider.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeProvider for SystemTimeProvider {
    #[inline]
    fn now_unix_ns(&self) -> u64 {
        let wall = current_time_ns();
        let previous = self.last_ns.fetch_max(wall, Ordering::SeqCst);
        previous.max(wall)
    }
}

// ============================================================================
// SimulatedTimeProvider (Testing)
// ============================================================================

/// Simulated time provider for deterministic testing.
///
/// Clones share the same underlying instant.
///
/// # Example
///
/// ```ignore
/// use rddlock_time::{SimulatedTimeProvider, TimeProvider};
///
/// let time = SimulatedTimeProvider::new(1_000_000);
/// time.advance_ms(5);
/// assert_eq!(time.now_unix_ns(), 6_000_000);
/// ```
#[cfg(feature = "simulation")]
#[derive(Debug, Clone)]
pub struct SimulatedTimeProvider {
    current_time_ns: Arc<AtomicU64>,
}

#[cfg(feature = "simulation")]
impl SimulatedTimeProvider {
    /// Create a new simulated time provider starting at the given timestamp.
    pub fn new(initial_time_ns: u64) -> Self {
        Self {
            current_time_ns: Arc::new(AtomicU64::new(initial_time_ns)),
        }
    }

    /// Create a new simulated time provider starting at the current system time.
    pub fn from_system_time() -> Self {
        Self::new(current_time_ns())
    }

    /// Advance time by the given duration.
    pub fn advance(&self, delta: Duration) {
        let delta_ns = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        self.advance_ns(delta_ns);
    }

    /// Advance time by the given number of milliseconds.
    pub fn advance_ms(&self, delta_ms: u64) {
        self.advance_ns(ms_to_ns(delta_ms));
    }

    fn advance_ns(&self, delta_ns: u64) {
        let _ = self
            .current_time_ns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| Some(t.saturating_add(delta_ns)));
    }

    /// Set the current time to a specific value.
    pub fn set_ns(&self, time_ns: u64) {
        self.current_time_ns.store(time_ns, Ordering::SeqCst);
    }
}

#[cfg(feature = "simulation")]
impl Default for SimulatedTimeProvider {
    fn default() -> Self {
        Self::from_system_time()
    }
}

#[cfg(feature = "simulation")]
impl TimeProvider for SimulatedTimeProvider {
    #[inline]
    fn now_unix_ns(&self) -> u64 {
        self.current_time_ns.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_time_ns_reasonable_range() {
        // After 2020-01-01 and before 2100-01-01.
        let time = current_time_ns();
        let year_2020_ns = 1_577_836_800_000_000_000u64;
        let year_2100_ns = 4_102_444_800_000_000_000u64;
        assert!(time > year_2020_ns, "current_time_ns {} should be after year 2020", time);
        assert!(time < year_2100_ns, "current_time_ns {} should be before year 2100", time);
    }

    #[test]
    fn ms_to_ns_saturates() {
        assert_eq!(ms_to_ns(5), 5_000_000);
        assert_eq!(ms_to_ns(u64::MAX), u64::MAX);
    }

    #[test]
    fn system_provider_never_goes_backwards() {
        let time = SystemTimeProvider::new();
        let mut previous = time.now_unix_ns();
        for _ in 0..1_000 {
            let now = time.now_unix_ns();
            assert!(now >= previous, "provider went backwards: {} < {}", now, previous);
            previous = now;
        }
    }

    #[test]
    fn system_provider_clamps_to_highest_reading() {
        let time = SystemTimeProvider::new();
        // Simulate a reading from the future, as after a backwards clock step.
        let future = current_time_ns() + 60 * 1_000 * NANOS_PER_MILLI;
        time.last_ns.store(future, Ordering::SeqCst);
        assert_eq!(time.now_unix_ns(), future);
    }

    #[test]
    fn default_now_unix_ms_derives_from_ns() {
        let time = SystemTimeProvider::new();
        let ms = time.now_unix_ms();
        assert!(ms > 1_577_836_800_000);
    }

    #[cfg(feature = "simulation")]
    #[test]
    fn simulated_provider_advances() {
        let time = SimulatedTimeProvider::new(1_000);
        assert_eq!(time.now_unix_ns(), 1_000);

        time.advance_ms(2);
        assert_eq!(time.now_unix_ns(), 2_001_000);

        time.advance(Duration::from_nanos(5));
        assert_eq!(time.now_unix_ns(), 2_001_005);

        time.set_ns(42);
        assert_eq!(time.now_unix_ns(), 42);
    }

    #[cfg(feature = "simulation")]
    #[test]
    fn simulated_provider_clones_share_time() {
        let time = SimulatedTimeProvider::new(0);
        let other = time.clone();
        time.advance_ms(1);
        assert_eq!(other.now_unix_ns(), NANOS_PER_MILLI);
    }
}
