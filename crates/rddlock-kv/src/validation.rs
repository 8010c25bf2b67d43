//! Validation of keys and values against fixed size limits.

use crate::KeyValueStoreError;
use crate::constants::MAX_KEY_SIZE;
use crate::constants::MAX_VALUE_SIZE;

/// Validate a lock key.
pub fn validate_key(key: &str) -> Result<(), KeyValueStoreError> {
    if key.is_empty() {
        return Err(KeyValueStoreError::EmptyKey);
    }
    let len = key.len();
    if len > MAX_KEY_SIZE as usize {
        return Err(KeyValueStoreError::KeyTooLarge {
            size: u32::try_from(len).unwrap_or(u32::MAX),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}

/// Validate a value before it is written.
pub fn validate_value(value: &str) -> Result<(), KeyValueStoreError> {
    let len = value.len();
    if len > MAX_VALUE_SIZE as usize {
        return Err(KeyValueStoreError::ValueTooLarge {
            size: u32::try_from(len).unwrap_or(u32::MAX),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}
