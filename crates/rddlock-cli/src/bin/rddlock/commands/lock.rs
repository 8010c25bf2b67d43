//! Lock inspection, acquisition and release commands.

use anyhow::Context;
use anyhow::Result;
use clap::Args;
use rddlock_coordination::KeyValueStore;
use rddlock_coordination::LockClient;
use rddlock_coordination::LockConfig;
use rddlock_coordination::LockToken;

use crate::output::InspectOutput;
use crate::output::LockOutput;
use crate::output::print_output;

#[derive(Args)]
pub struct InspectArgs {
    /// Lock key.
    pub key: String,
}

#[derive(Args)]
pub struct AcquireArgs {
    /// Lock key.
    pub key: String,

    /// Lease in milliseconds. Defaults to `lease_ms` from the configuration.
    #[arg(long = "lease-ms")]
    pub lease_ms: Option<u64>,

    /// Attempts before giving up. Defaults to `acquire_attempts` from the configuration.
    #[arg(long)]
    pub attempts: Option<u32>,
}

#[derive(Args)]
pub struct ReleaseArgs {
    /// Lock key.
    pub key: String,

    /// Token printed by `acquire`.
    #[arg(long)]
    pub token: String,
}

#[derive(Args)]
pub struct ForceReleaseArgs {
    /// Lock key.
    pub key: String,
}

#[derive(Args)]
pub struct SafeForceReleaseArgs {
    /// Lock key.
    pub key: String,

    /// Leave the lock alone if its lease ends within this many milliseconds.
    #[arg(long = "margin-ms")]
    pub margin_ms: Option<u64>,
}

impl InspectArgs {
    pub async fn run<S: KeyValueStore + ?Sized>(self, client: &LockClient<S>, json: bool) -> Result<()> {
        let state = client.inspect(&self.key).await?;
        print_output(&InspectOutput { key: self.key, state }, json);
        Ok(())
    }
}

impl AcquireArgs {
    pub async fn run<S: KeyValueStore + ?Sized>(
        self,
        client: &LockClient<S>,
        config: &LockConfig,
        json: bool,
    ) -> Result<()> {
        let lease_ms = self.lease_ms.unwrap_or(config.lease_ms);
        let attempts = self.attempts.unwrap_or(config.acquire_attempts);
        let result = client.acquire_with_retry(&self.key, lease_ms, attempts).await;
        finish(
            LockOutput {
                operation: "acquire".to_string(),
                key: self.key,
                success: result.is_ok(),
                token: result.as_ref().ok().copied(),
                error: result.err().map(|e| e.to_string()),
            },
            json,
        )
    }
}

impl ReleaseArgs {
    pub async fn run<S: KeyValueStore + ?Sized>(self, client: &LockClient<S>, json: bool) -> Result<()> {
        let token = LockToken::decode(&self.token).context("invalid --token")?;
        let result = client.try_release(&self.key, token).await;
        finish(
            LockOutput {
                operation: "release".to_string(),
                key: self.key,
                success: result.is_ok(),
                token: Some(token),
                error: result.err().map(|e| e.to_string()),
            },
            json,
        )
    }
}

impl ForceReleaseArgs {
    pub async fn run<S: KeyValueStore + ?Sized>(self, client: &LockClient<S>, json: bool) -> Result<()> {
        let result = client.try_force_release(&self.key).await;
        finish(
            LockOutput {
                operation: "force_release".to_string(),
                key: self.key,
                success: result.is_ok(),
                token: None,
                error: result.err().map(|e| e.to_string()),
            },
            json,
        )
    }
}

impl SafeForceReleaseArgs {
    pub async fn run<S: KeyValueStore + ?Sized>(
        self,
        client: &LockClient<S>,
        config: &LockConfig,
        json: bool,
    ) -> Result<()> {
        let margin_ms = self.margin_ms.unwrap_or(config.safety_margin_ms);
        let (success, error) = match client.try_safe_force_release(&self.key, margin_ms).await {
            Ok(true) => (true, None),
            Ok(false) => (false, Some(format!("lock absent or expiring within {margin_ms}ms, left to expire"))),
            Err(e) => (false, Some(e.to_string())),
        };
        finish(
            LockOutput {
                operation: "safe_force_release".to_string(),
                key: self.key,
                success,
                token: None,
                error,
            },
            json,
        )
    }
}

fn finish(output: LockOutput, json: bool) -> Result<()> {
    print_output(&output, json);
    if !output.success {
        std::process::exit(1);
    }
    Ok(())
}
