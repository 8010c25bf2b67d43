//! Key-value store capability for the rddlock protocol.
//!
//! The lock protocol never talks to a concrete client. It sees the store
//! only through [`KeyValueStore`], a narrow set of single-key atomic
//! operations:
//!
//! - `set_if_absent` - write only if the key does not exist
//! - `get` - read the current value
//! - `get_and_set` - unconditionally replace, returning the previous value
//! - `compare_and_delete` - delete only if the value matches, in one atomic step
//! - `delete` - unconditional delete
//!
//! Backends:
//!
//! - [`DeterministicKeyValueStore`] - in-memory, used by tests and simulations
//! - `RedisStore` - Redis over `redis::aio::ConnectionManager` (feature `redis`)

pub mod constants;
mod error;
mod inmemory;
#[cfg(feature = "redis")]
mod redis_store;
mod traits;
mod validation;

pub use error::KeyValueStoreError;
pub use inmemory::DeterministicKeyValueStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use traits::KeyValueStore;
pub use validation::validate_key;
pub use validation::validate_value;
