//! rddlock - command-line access to rddlock distributed locks.
//!
//! Talks to a Redis endpoint directly using the same protocol as the
//! library, so locks taken here interoperate with library users.
//!
//! # Usage
//!
//! ```bash
//! # Who holds the lock?
//! rddlock --redis-url redis://127.0.0.1:6379 inspect orders
//!
//! # Take it for 30s and release it later with the printed token
//! rddlock acquire orders --lease-ms 30000
//! rddlock release orders --token 01700000000000000000:00000000deadbeef
//!
//! # Run a command under the lock, killed when the lease runs out
//! rddlock run orders --lease-ms 60000 -- ./nightly-job.sh
//!
//! # JSON output for scripting
//! rddlock --json inspect orders | jq '.state'
//! ```
//!
//! # Tiger Style
//!
//! - Explicit error handling with anyhow
//! - Every lock is bounded by its lease
//! - Fail-fast on invalid arguments and configuration

mod cli;
mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Initialize tracing subscriber with environment-based filtering.
///
/// - `quiet`: Suppress all logging output (for scripting)
/// - `verbose`: Enable debug-level logging
fn init_tracing(quiet: bool, verbose: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).compact().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.global.is_quiet, cli.global.is_verbose);

    cli.run().await
}
