//! Error types for key-value store operations.

use snafu::Snafu;

/// Errors returned by a [`KeyValueStore`](crate::KeyValueStore) backend.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum KeyValueStoreError {
    /// Key must not be empty.
    #[snafu(display("key must not be empty"))]
    EmptyKey,

    /// Key exceeds the size limit.
    #[snafu(display("key size {size} exceeds maximum of {max} bytes"))]
    KeyTooLarge {
        /// Actual key size in bytes.
        size: u32,
        /// Maximum allowed size in bytes.
        max: u32,
    },

    /// Value exceeds the size limit.
    #[snafu(display("value size {size} exceeds maximum of {max} bytes"))]
    ValueTooLarge {
        /// Actual value size in bytes.
        size: u32,
        /// Maximum allowed size in bytes.
        max: u32,
    },

    /// The store could not be reached.
    #[snafu(display("store unavailable: {reason}"))]
    Unavailable {
        /// Description of the connectivity failure.
        reason: String,
    },

    /// The store was reached but the operation failed.
    #[snafu(display("operation failed: {reason}"))]
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_display() {
        assert_eq!(KeyValueStoreError::EmptyKey.to_string(), "key must not be empty");
    }

    #[test]
    fn key_too_large_display() {
        let err = KeyValueStoreError::KeyTooLarge { size: 2048, max: 1024 };
        assert_eq!(err.to_string(), "key size 2048 exceeds maximum of 1024 bytes");
    }

    #[test]
    fn unavailable_display() {
        let err = KeyValueStoreError::Unavailable {
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "store unavailable: connection refused");
    }

    #[test]
    fn failed_display() {
        let err = KeyValueStoreError::Failed {
            reason: "WRONGTYPE".to_string(),
        };
        assert_eq!(err.to_string(), "operation failed: WRONGTYPE");
    }

    #[test]
    fn errors_compare_by_value() {
        let a = KeyValueStoreError::Unavailable { reason: "x".into() };
        assert_eq!(a.clone(), a);
        assert_ne!(a, KeyValueStoreError::EmptyKey);
    }
}
