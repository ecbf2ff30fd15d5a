//! quad-curves CLI - ink-curve synthesis and composite redistribution

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use flexi_logger::Logger;

mod commands;
mod job;

/// Build per-channel ink curves and redistribute density between channels.
#[derive(Parser)]
#[command(name = "quad-curves")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log specification (e.g. "info", "quad_curves=debug")
    #[arg(long, global = true, env = "QUAD_CURVES_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every channel's 256-sample curve from a job file
    Synth {
        /// Job file (JSON)
        #[arg(short, long)]
        job: PathBuf,

        /// Output JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run composite redistribution over a job's channels
    Solve {
        /// Job file (JSON)
        #[arg(short, long)]
        job: PathBuf,

        /// Target density CSV (overrides the job's target)
        #[arg(long)]
        target_csv: Option<PathBuf>,

        /// Measured density CSV (overrides the job's measurement)
        #[arg(long)]
        measurement_csv: Option<PathBuf>,

        /// Output JSON file for the full result
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the density profile and coverage of a saved result
    Inspect {
        /// Result file written by `solve --output`
        #[arg(short, long)]
        result: PathBuf,

        /// Input position (0-100) for the density profile
        #[arg(short, long, default_value = "50")]
        percent: f64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let spec = if cli.verbose && cli.log == "info" { "debug" } else { cli.log.as_str() };
    let _logger = Logger::try_with_str(spec)
        .with_context(|| format!("Invalid log specification: {spec}"))?
        .log_to_stderr()
        .start()
        .context("Failed to start logger")?;

    match cli.command {
        Commands::Synth { job, output } => commands::synth::run(job, output, cli.verbose),
        Commands::Solve {
            job,
            target_csv,
            measurement_csv,
            output,
        } => commands::solve::run(job, target_csv, measurement_csv, output, cli.verbose),
        Commands::Inspect { result, percent } => commands::inspect::run(result, percent, cli.verbose),
    }
}
