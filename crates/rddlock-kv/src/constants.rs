//! Fixed size limits enforced by every store backend.

/// Maximum size of a lock key in bytes.
pub const MAX_KEY_SIZE: u32 = 1024;

/// Maximum size of a stored value in bytes.
///
/// A wire token is 37 bytes; the limit leaves room for legacy values while
/// refusing to store arbitrary payloads under a lock key.
pub const MAX_VALUE_SIZE: u32 = 1024;
