//! Submit a job descriptor to the batch scheduler

use clap::Parser;
use jobctl_cli::commands::submit::{self, SubmitArgs};
use jobctl_scheduler::SlurmScheduler;

#[tokio::main]
async fn main() {
    let args = SubmitArgs::parse();
    let _ = jobctl_cli::bootstrap();

    jobctl_cli::exit_with(submit::run(args, SlurmScheduler::new()).await)
}
