//! Cancel batch jobs by id, by name or all of them

use clap::Parser;
use jobctl_cli::commands::cancel::{self, CancelArgs};
use jobctl_cli::prompt::StdinPrompter;
use jobctl_scheduler::SlurmScheduler;

#[tokio::main]
async fn main() {
    let args = CancelArgs::parse();
    let (config, _logger) = jobctl_cli::bootstrap();

    let result = cancel::run(args, &config, SlurmScheduler::new(), StdinPrompter).await;
    jobctl_cli::exit_with(result)
}
