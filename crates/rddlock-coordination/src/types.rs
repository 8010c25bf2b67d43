//! Shared types for the lock protocol.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;

/// Ownership token written under a lock key.
///
/// A token is unique per acquisition. It carries the absolute expiry instant
/// of its lease, so any reader can decide whether the lease lapsed without a
/// second round trip, and a random nonce, so two acquisitions that compute
/// the same expiry instant still produce different tokens.
///
/// Wire form (store boundary only): `{expires_at_ns:020}:{nonce:016x}`.
/// A bare decimal integer also decodes, with nonce 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LockToken {
    expires_at_ns: u64,
    nonce: u64,
}

/// Error when a stored value is not a lock token.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("invalid lock token {value:?}"))]
pub struct InvalidTokenError {
    /// The rejected value.
    pub value: String,
}

impl LockToken {
    /// Sentinel for "never acquired".
    pub const ZERO: LockToken = LockToken {
        expires_at_ns: 0,
        nonce: 0,
    };

    /// Create a token.
    pub fn new(expires_at_ns: u64, nonce: u64) -> Self {
        Self { expires_at_ns, nonce }
    }

    /// Absolute expiry instant of the lease (Unix ns).
    pub fn expires_at_ns(&self) -> u64 {
        self.expires_at_ns
    }

    /// Uniqueness component of the token.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Whether this is the [`ZERO`](Self::ZERO) sentinel.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Whether the lease has lapsed at `now_ns`.
    pub fn is_expired_at(&self, now_ns: u64) -> bool {
        crate::verified::is_lease_expired(self.expires_at_ns, now_ns)
    }

    /// Time left on the lease at `now_ns` (zero once lapsed).
    pub fn remaining_at(&self, now_ns: u64) -> Duration {
        Duration::from_nanos(crate::verified::remaining_lease_ns(self.expires_at_ns, now_ns))
    }

    /// Encode for storage.
    pub fn encode(&self) -> String {
        format!("{:020}:{:016x}", self.expires_at_ns, self.nonce)
    }

    /// Decode a stored value.
    pub fn decode(value: &str) -> Result<Self, InvalidTokenError> {
        let invalid = || InvalidTokenError {
            value: value.to_string(),
        };
        let trimmed = value.trim();
        match trimmed.split_once(':') {
            Some((expiry, nonce)) => {
                let expires_at_ns = parse_decimal(expiry).ok_or_else(invalid)?;
                if nonce.is_empty() || nonce.len() > 16 || !nonce.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(invalid());
                }
                let nonce = u64::from_str_radix(nonce, 16).map_err(|_| invalid())?;
                Ok(Self { expires_at_ns, nonce })
            }
            None => {
                let expires_at_ns = parse_decimal(trimmed).ok_or_else(invalid)?;
                Ok(Self {
                    expires_at_ns,
                    nonce: 0,
                })
            }
        }
    }
}

fn parse_decimal(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for LockToken {
    type Err = InvalidTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Observed state of a lock key.
///
/// Only ever a snapshot: the store is the sole source of truth and may change
/// right after the read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// No key exists; the lock is free.
    Absent,
    /// A live lease holds the lock.
    Held {
        /// The current token.
        token: LockToken,
        /// Time left on the lease when observed.
        remaining: Duration,
    },
    /// The key is still present but its lease lapsed (stale-but-present).
    Expired {
        /// The stale token.
        token: LockToken,
    },
}

impl LockState {
    /// Classify a stored token at `now_ns`.
    pub fn observe(token: LockToken, now_ns: u64) -> Self {
        if token.is_expired_at(now_ns) {
            LockState::Expired { token }
        } else {
            LockState::Held {
                token,
                remaining: token.remaining_at(now_ns),
            }
        }
    }

    /// Whether a new acquirer could take the lock right now.
    pub fn is_acquirable(&self) -> bool {
        !matches!(self, LockState::Held { .. })
    }

    /// The stored token, if any.
    pub fn token(&self) -> Option<LockToken> {
        match self {
            LockState::Absent => None,
            LockState::Held { token, .. } | LockState::Expired { token } => Some(*token),
        }
    }
}
