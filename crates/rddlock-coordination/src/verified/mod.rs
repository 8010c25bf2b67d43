//! Pure decision functions for the lock protocol.
//!
//! Everything here is deterministic and side-effect free: time is passed in
//! explicitly and nothing touches the store. The protocol in `lock.rs` reads
//! the clock and the store, then delegates every decision to these functions.

mod lock;

pub use lock::BackoffResult;
pub use lock::clamp_attempts;
pub use lock::compute_backoff_with_jitter;
pub use lock::compute_lease_expiry_ns;
pub use lock::compute_run_deadline_ns;
pub use lock::is_lease_expired;
pub use lock::is_takeover_confirmed;
pub use lock::remaining_lease_ns;
pub use lock::should_defer_to_expiry;
