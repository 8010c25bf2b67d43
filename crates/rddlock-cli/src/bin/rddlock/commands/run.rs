//! Run a command while holding a lock.

use std::process::ExitStatus;

use anyhow::Context;
use anyhow::Result;
use clap::Args;
use rddlock_coordination::KeyValueStore;
use rddlock_coordination::LockClient;
use rddlock_coordination::LockConfig;
use tokio::process::Command;
use tracing::info;
use tracing::warn;

#[derive(Args)]
pub struct RunArgs {
    /// Lock key.
    pub key: String,

    /// Lease in milliseconds; the command is killed when it runs out.
    /// Defaults to `lease_ms` from the configuration.
    #[arg(long = "lease-ms")]
    pub lease_ms: Option<u64>,

    /// Command and arguments, after `--`.
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

impl RunArgs {
    pub async fn run<S: KeyValueStore + ?Sized + 'static>(self, client: &LockClient<S>, config: &LockConfig) -> Result<()> {
        let lease_ms = self.lease_ms.unwrap_or(config.lease_ms);
        let (program, args) = self.command.split_first().context("missing command")?;

        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        info!(key = %self.key, program = %program, lease_ms, "running command under lock");

        let status = client
            .run_exclusive(&self.key, lease_ms, move |cancel| async move {
                let mut child = command.spawn()?;
                tokio::select! {
                    status = child.wait() => status,
                    _ = cancel.cancelled() => {
                        child.kill().await?;
                        child.wait().await
                    }
                }
            })
            .await?
            .with_context(|| format!("failed to run '{program}'"))?;

        exit_with(status)
    }
}

fn exit_with(status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    warn!(%status, "command failed");
    std::process::exit(status.code().unwrap_or(1));
}
