//! CLI argument parsing and command dispatch.
//!
//! Uses clap derive macros for declarative argument definition with
//! support for environment variables and global options.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;

use crate::client::connect;
use crate::commands::lock::AcquireArgs;
use crate::commands::lock::ForceReleaseArgs;
use crate::commands::lock::InspectArgs;
use crate::commands::lock::ReleaseArgs;
use crate::commands::lock::SafeForceReleaseArgs;
use crate::commands::run::RunArgs;

/// Command-line interface for rddlock distributed locks.
#[derive(Parser)]
#[command(name = "rddlock")]
#[command(version)]
#[command(about = "Distributed mutex over Redis")]
#[command(long_about = "Inspect, acquire and release rddlock locks, or run a command \
    while holding one. Locks expire on their own when the lease runs out.")]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global options available to all commands.
#[derive(Args, Clone)]
pub struct GlobalOptions {
    /// Redis endpoint, e.g. redis://127.0.0.1:6379/0.
    ///
    /// Overrides `redis_url` from the config file.
    #[arg(long = "redis-url", env = "RDDLOCK_REDIS_URL", global = true)]
    pub redis_url: Option<String>,

    /// TOML configuration file.
    #[arg(long = "config", env = "RDDLOCK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output JSON instead of human-readable format.
    #[arg(long = "json", global = true)]
    pub is_json: bool,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub is_verbose: bool,

    /// Suppress all logging output (warnings, debug messages).
    ///
    /// Useful for scripting and when parsing JSON output.
    #[arg(short = 'q', long = "quiet", global = true)]
    pub is_quiet: bool,
}

/// Lock commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show who holds a lock and for how long.
    Inspect(InspectArgs),

    /// Acquire a lock, retrying up to the attempt budget.
    ///
    /// Prints the token needed to release it.
    Acquire(AcquireArgs),

    /// Release a lock held with the given token.
    ///
    /// Fails without touching the lock if the token is not current.
    Release(ReleaseArgs),

    /// Delete a lock regardless of who holds it.
    ForceRelease(ForceReleaseArgs),

    /// Delete a lock unless its lease ends within the safety margin.
    SafeForceRelease(SafeForceReleaseArgs),

    /// Run a command while holding a lock.
    ///
    /// The command is killed if it outlives the lease.
    Run(RunArgs),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn run(self) -> Result<()> {
        let json = self.global.is_json;
        let (client, config) = connect(&self.global).await?;

        match self.command {
            Commands::Inspect(args) => args.run(&client, json).await,
            Commands::Acquire(args) => args.run(&client, &config, json).await,
            Commands::Release(args) => args.run(&client, json).await,
            Commands::ForceRelease(args) => args.run(&client, json).await,
            Commands::SafeForceRelease(args) => args.run(&client, &config, json).await,
            Commands::Run(args) => args.run(&client, &config).await,
        }
    }
}
