//! Show placement and health of the running service job

use clap::Parser;
use jobctl_cli::commands::service::{self, ServiceArgs};
use jobctl_scheduler::SlurmScheduler;

#[tokio::main]
async fn main() {
    let args = ServiceArgs::parse();
    let (config, _logger) = jobctl_cli::bootstrap();

    jobctl_cli::exit_with(service::run(args, &config, SlurmScheduler::new()).await)
}
