//! fairsim: run and compare fairgrid placement policies.
//!
//! # Usage
//!
//! ```text
//! fairsim run --ticks 500 --load 20 --results-dir results/
//! fairsim sweep --from 5 --to 50 --step 5 --format json
//! fairsim config init fairsim.toml
//! ```

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{RunArgs, SweepArgs};

#[derive(Parser)]
#[command(
    name = "fairsim",
    about = "fairgrid: price-aware fair scheduling simulator",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled policy on the same workload and print summaries.
    Run(RunArgs),
    /// Run one fresh world per load level.
    Sweep(SweepArgs),
    /// Scaffold or inspect a fairsim.toml.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration.
    Init {
        #[arg(default_value = "fairsim.toml")]
        path: std::path::PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration a run would use.
    Show {
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fairgrid=info,fairsim=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(&args).await,
        Commands::Sweep(args) => commands::sweep::sweep(&args).await,
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => commands::config::init(&path, force),
            ConfigAction::Show { config } => commands::config::show(config.as_deref()),
        },
    }
}
