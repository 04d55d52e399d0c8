//! Run a workload inside a scheduler allocation

use clap::Parser;
use jobctl_cli::commands::run::{self, RunArgs};

#[tokio::main]
async fn main() {
    let args = RunArgs::parse();
    let (config, logger) = jobctl_cli::bootstrap();

    jobctl_cli::exit_with(run::run(args, config, logger).await)
}
