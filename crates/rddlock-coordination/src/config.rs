//! Lock client configuration.
//!
//! Sources, lowest to highest precedence: built-in defaults, a TOML file,
//! then `RDDLOCK_*` environment variables. Command-line flags are applied on
//! top by the binary.
//!
//! ```toml
//! redis_url = "redis://127.0.0.1:6379/0"
//!
//! [lock]
//! lease_ms = 1000
//! acquire_attempts = 10
//! release_fallback = "force"
//! ```

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;

use crate::constants::DEFAULT_ACQUIRE_ATTEMPTS;
use crate::constants::DEFAULT_LEASE_MS;
use crate::constants::DEFAULT_MAX_BACKOFF_MS;
use crate::constants::DEFAULT_RETRY_BACKOFF_MS;
use crate::constants::DEFAULT_SAFETY_MARGIN_MS;
use crate::constants::MAX_ACQUIRE_ATTEMPTS;
use crate::constants::MAX_BACKOFF_MS;
use crate::constants::MAX_LEASE_MS;

/// Default values for configuration
mod defaults {
    use super::*;

    pub fn lease_ms() -> u64 {
        DEFAULT_LEASE_MS
    }
    pub fn acquire_attempts() -> u32 {
        DEFAULT_ACQUIRE_ATTEMPTS
    }
    pub fn retry_backoff_ms() -> u64 {
        DEFAULT_RETRY_BACKOFF_MS
    }
    pub fn max_backoff_ms() -> u64 {
        DEFAULT_MAX_BACKOFF_MS
    }
    pub fn safety_margin_ms() -> u64 {
        DEFAULT_SAFETY_MARGIN_MS
    }
}

/// Configuration errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue {
        /// Setting name.
        key: String,
        /// Rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    ReadFile {
        /// File path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[snafu(display("failed to parse config: {source}"))]
    Parse {
        /// The underlying error.
        source: toml::de::Error,
    },
}

/// What a scoped release does when the ownership-verified delete fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseFallback {
    /// Delete the key unconditionally.
    ///
    /// If the lease already lapsed and another process took over, this
    /// deletes that process's lock.
    #[default]
    Force,
    /// Delete unconditionally unless the lease lapses within the safety margin.
    SafeForce,
    /// Leave the key alone and let the lease expire.
    None,
}

impl FromStr for ReleaseFallback {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "force" => Ok(ReleaseFallback::Force),
            "safe_force" => Ok(ReleaseFallback::SafeForce),
            "none" => Ok(ReleaseFallback::None),
            _ => InvalidValueSnafu {
                key: "release_fallback",
                value: s,
                reason: "expected one of: force, safe_force, none",
            }
            .fail(),
        }
    }
}

/// Configuration for a [`LockClient`](crate::LockClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Lease duration used by scoped acquisition and the CLI.
    #[serde(default = "defaults::lease_ms")]
    pub lease_ms: u64,
    /// Attempts made by retrying acquisition.
    #[serde(default = "defaults::acquire_attempts")]
    pub acquire_attempts: u32,
    /// Initial sleep between attempts in milliseconds.
    #[serde(default = "defaults::retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Cap for the sleep between attempts. Equal to `retry_backoff_ms` for a fixed backoff.
    #[serde(default = "defaults::max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Add random jitter to each backoff sleep.
    #[serde(default)]
    pub jitter: bool,
    /// Margin for expiry-aware forced release.
    #[serde(default = "defaults::safety_margin_ms")]
    pub safety_margin_ms: u64,
    /// Fallback when ownership-verified release fails.
    #[serde(default)]
    pub release_fallback: ReleaseFallback,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ms: defaults::lease_ms(),
            acquire_attempts: defaults::acquire_attempts(),
            retry_backoff_ms: defaults::retry_backoff_ms(),
            max_backoff_ms: defaults::max_backoff_ms(),
            jitter: false,
            safety_margin_ms: defaults::safety_margin_ms(),
            release_fallback: ReleaseFallback::default(),
        }
    }
}

impl LockConfig {
    /// Check bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lease_ms == 0 || self.lease_ms > MAX_LEASE_MS {
            return InvalidValueSnafu {
                key: "lease_ms",
                value: self.lease_ms.to_string(),
                reason: format!("must be in 1..={MAX_LEASE_MS}"),
            }
            .fail();
        }
        if self.acquire_attempts == 0 || self.acquire_attempts > MAX_ACQUIRE_ATTEMPTS {
            return InvalidValueSnafu {
                key: "acquire_attempts",
                value: self.acquire_attempts.to_string(),
                reason: format!("must be in 1..={MAX_ACQUIRE_ATTEMPTS}"),
            }
            .fail();
        }
        if self.max_backoff_ms > MAX_BACKOFF_MS {
            return InvalidValueSnafu {
                key: "max_backoff_ms",
                value: self.max_backoff_ms.to_string(),
                reason: format!("must be at most {MAX_BACKOFF_MS}"),
            }
            .fail();
        }
        if self.max_backoff_ms < self.retry_backoff_ms {
            return InvalidValueSnafu {
                key: "max_backoff_ms",
                value: self.max_backoff_ms.to_string(),
                reason: format!("must be at least retry_backoff_ms ({})", self.retry_backoff_ms),
            }
            .fail();
        }
        Ok(())
    }

    /// Override fields from `RDDLOCK_*` variables resolved by `lookup`.
    ///
    /// Taking the lookup as a function keeps tests away from the process
    /// environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where F: Fn(&str) -> Option<String> {
        if let Some(v) = lookup("RDDLOCK_LEASE_MS") {
            self.lease_ms = parse_env("RDDLOCK_LEASE_MS", &v)?;
        }
        if let Some(v) = lookup("RDDLOCK_ACQUIRE_ATTEMPTS") {
            self.acquire_attempts = parse_env("RDDLOCK_ACQUIRE_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("RDDLOCK_RETRY_BACKOFF_MS") {
            self.retry_backoff_ms = parse_env("RDDLOCK_RETRY_BACKOFF_MS", &v)?;
        }
        if let Some(v) = lookup("RDDLOCK_MAX_BACKOFF_MS") {
            self.max_backoff_ms = parse_env("RDDLOCK_MAX_BACKOFF_MS", &v)?;
        }
        if let Some(v) = lookup("RDDLOCK_JITTER") {
            self.jitter = parse_env("RDDLOCK_JITTER", &v)?;
        }
        if let Some(v) = lookup("RDDLOCK_SAFETY_MARGIN_MS") {
            self.safety_margin_ms = parse_env("RDDLOCK_SAFETY_MARGIN_MS", &v)?;
        }
        if let Some(v) = lookup("RDDLOCK_RELEASE_FALLBACK") {
            self.release_fallback = v.parse()?;
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Store endpoint, used by the binary.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Lock protocol settings.
    #[serde(default)]
    pub lock: LockConfig,
}

impl ClientConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).context(ParseSnafu)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::from_toml_str(&content)
    }

    /// Defaults, then the optional file, then the process environment. Validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load) with an explicit environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where F: Fn(&str) -> Option<String> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(url) = lookup("RDDLOCK_REDIS_URL") {
            config.redis_url = Some(url);
        }
        config.lock.apply_env(&lookup)?;
        config.lock.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = LockConfig::default();
        assert_eq!(config.lease_ms, 1_000);
        assert_eq!(config.acquire_attempts, 10);
        assert_eq!(config.retry_backoff_ms, 1);
        assert_eq!(config.release_fallback, ReleaseFallback::Force);
        config.validate().unwrap();
    }

    #[test]
    fn parses_partial_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            redis_url = "redis://localhost:6379"

            [lock]
            lease_ms = 250
            release_fallback = "safe_force"
            "#,
        )
        .unwrap();
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.lock.lease_ms, 250);
        assert_eq!(config.lock.release_fallback, ReleaseFallback::SafeForce);
        assert_eq!(config.lock.acquire_attempts, DEFAULT_ACQUIRE_ATTEMPTS);
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = ClientConfig::from_toml_str("[lock]\nlease = 5\n");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[lock]\nlease_ms = 250\nacquire_attempts = 3").unwrap();

        let config = ClientConfig::load_with(
            Some(file.path()),
            env(&[
                ("RDDLOCK_LEASE_MS", "500"),
                ("RDDLOCK_RELEASE_FALLBACK", "none"),
                ("RDDLOCK_REDIS_URL", "redis://cache:6379"),
            ]),
        )
        .unwrap();

        assert_eq!(config.lock.lease_ms, 500);
        assert_eq!(config.lock.acquire_attempts, 3);
        assert_eq!(config.lock.release_fallback, ReleaseFallback::None);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
    }

    #[test]
    fn invalid_env_value_is_reported() {
        let result = ClientConfig::load_with(None, env(&[("RDDLOCK_ACQUIRE_ATTEMPTS", "many")]));
        match result {
            Err(ConfigError::InvalidValue { key, value, .. }) => {
                assert_eq!(key, "RDDLOCK_ACQUIRE_ATTEMPTS");
                assert_eq!(value, "many");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let result = ClientConfig::load_with(Some(Path::new("/nonexistent/rddlock.toml")), env(&[]));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn validation_rejects_out_of_range() {
        let zero_lease = LockConfig {
            lease_ms: 0,
            ..Default::default()
        };
        assert!(zero_lease.validate().is_err());

        let zero_attempts = LockConfig {
            acquire_attempts: 0,
            ..Default::default()
        };
        assert!(zero_attempts.validate().is_err());

        let inverted_backoff = LockConfig {
            retry_backoff_ms: 10,
            max_backoff_ms: 5,
            ..Default::default()
        };
        assert!(inverted_backoff.validate().is_err());
    }

    #[test]
    fn release_fallback_parses_variants() {
        assert_eq!("force".parse::<ReleaseFallback>().unwrap(), ReleaseFallback::Force);
        assert_eq!("safe-force".parse::<ReleaseFallback>().unwrap(), ReleaseFallback::SafeForce);
        assert_eq!("NONE".parse::<ReleaseFallback>().unwrap(), ReleaseFallback::None);
        assert!("maybe".parse::<ReleaseFallback>().is_err());
    }
}
