//! Job Analyzer Pro CLI - resume optimization from the command line
//!
//! Provides a `jap` command that lists optimization strategies, projects
//! their cost, and runs a strategy against a resume and job description.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Job Analyzer Pro - multi-model resume optimization
#[derive(Parser, Debug)]
#[command(
    name = "jap",
    author,
    version,
    about = "Job Analyzer Pro - multi-model resume optimization",
    long_about = "Tailors a resume to a job description by running it through a strategy of AI model calls.\nEach strategy trades cost and latency for quality; estimates are available before running."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Pipeline configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available optimization strategies
    Strategies {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Project cost, time and quality for a strategy
    Estimate {
        /// Strategy id (e.g. cascade-refinement)
        strategy_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Optimize a resume for a job description
    ///
    /// Runs every step of the strategy and prints the optimized resume
    /// followed by the per-step ledger.
    Optimize {
        /// Strategy id (e.g. cascade-refinement)
        strategy_id: String,

        /// File containing the resume text
        #[arg(long)]
        resume: PathBuf,

        /// File containing the job description
        #[arg(long)]
        job: PathBuf,

        /// Refuse to start if the projected cost (USD) exceeds this value
        #[arg(long)]
        ceiling: Option<f64>,

        /// Use offline mock providers instead of real APIs
        #[arg(long)]
        mock: bool,

        /// Output the full run as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = commands::load_config(args.config.as_deref())?;

    match args.command {
        Command::Strategies { json } => commands::strategies::execute(&config, json),
        Command::Estimate { strategy_id, json } => commands::estimate::execute(&config, &strategy_id, json),
        Command::Optimize { strategy_id, resume, job, ceiling, mock, json } => {
            commands::optimize::execute(
                &config,
                commands::optimize::OptimizeArgs { strategy_id, resume, job, ceiling, mock, json },
            )
            .await
        }
    }
}
