//! Monitor batch jobs, their records and log files

use clap::Parser;
use jobctl_cli::commands::monitor::{self, MonitorArgs};
use jobctl_scheduler::SlurmScheduler;

#[tokio::main]
async fn main() {
    let args = MonitorArgs::parse();
    let (config, _logger) = jobctl_cli::bootstrap();

    jobctl_cli::exit_with(monitor::run(args, &config, SlurmScheduler::new()).await)
}
