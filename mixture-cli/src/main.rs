mod common;
mod run_grad_check;
mod run_log_prob;
mod run_sample;
mod run_summary;

use crate::run_grad_check::*;
use crate::run_log_prob::*;
use crate::run_sample::*;
use crate::run_summary::*;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log-density of points under a mixture
    LogProb(LogProbArgs),

    /// Draw samples from a mixture
    Sample(SampleArgs),

    /// Compare pathwise gradients with finite differences
    GradCheck(GradCheckArgs),

    /// Mixture weights and moments as JSON
    Summary(SummaryArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::LogProb(args) => {
            run_log_prob(args.clone())?;
        }
        Commands::Sample(args) => {
            run_sample(args.clone())?;
        }
        Commands::GradCheck(args) => {
            run_grad_check(args.clone())?;
        }
        Commands::Summary(args) => {
            run_summary(args.clone())?;
        }
    }

    Ok(())
}
