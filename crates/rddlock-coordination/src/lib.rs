//! Distributed mutex for processes that share only a key-value store.
//!
//! A lock is a single key holding a [`LockToken`]: the absolute expiry
//! instant of the lease plus a random nonce. Processes never talk to each
//! other; all ordering comes from the store's single-key atomic operations
//! (see [`rddlock_kv::KeyValueStore`]).
//!
//! ## Components
//!
//! - [`LockClient`]: acquisition (single attempt and retrying), verified and
//!   forced release, inspection
//! - [`LockGuard`]: scoped acquisition released on drop
//! - [`LockClient::run_exclusive`]: run work under a lock, bounded by the lease
//! - [`verified`]: pure decision functions used by the protocol
//!
//! ## Example
//!
//! ```ignore
//! use rddlock_coordination::{LockClient, LockConfig};
//! use rddlock_kv::DeterministicKeyValueStore;
//!
//! let client = LockClient::new(DeterministicKeyValueStore::new(), LockConfig::default());
//! let value = client
//!     .run_exclusive("orders", 1_000, |cancel| async move {
//!         // critical section; stop early if `cancel` fires
//!         42
//!     })
//!     .await?;
//! ```
//!
//! ## Clocks
//!
//! Expiry is judged against each process's wall clock. Holders must have
//! comparably synchronized clocks; skew shortens or lengthens leases as
//! seen by others. Fencing of late writes from an expired holder is not
//! provided.

mod config;
pub mod constants;
mod error;
mod exclusive;
mod lock;
mod types;
pub mod verified;

pub use config::ClientConfig;
pub use config::ConfigError;
pub use config::LockConfig;
pub use config::ReleaseFallback;
pub use error::LockError;
pub use lock::LockClient;
pub use lock::LockGuard;
pub use lock::ReleaseOutcome;
pub use rddlock_kv::KeyValueStore;
pub use rddlock_kv::KeyValueStoreError;
pub use tokio_util::sync::CancellationToken;
pub use types::InvalidTokenError;
pub use types::LockState;
pub use types::LockToken;
