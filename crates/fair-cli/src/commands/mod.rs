pub mod config;
pub mod run;
pub mod sweep;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use fair_core::SimConfig;
use fairgrid_metrics::{FileSink, MetricsSink, NullSink, PolicySummary, render_json, render_text};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Flags shared by `run` and `sweep`. Anything given here overrides the
/// config file.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Path to a fairsim.toml (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Ticks to simulate
    #[arg(long)]
    pub ticks: Option<u64>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub machines: Option<usize>,
    /// Cores per machine
    #[arg(long)]
    pub cores: Option<usize>,
    /// Procs generated per tick
    #[arg(long)]
    pub load: Option<usize>,
    #[arg(long)]
    pub shards: Option<usize>,
    /// Write every metrics channel to <dir>/<channel>.txt
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Args)]
pub struct SweepArgs {
    #[command(flatten)]
    pub run: RunArgs,
    /// First load level
    #[arg(long)]
    pub from: usize,
    /// Last load level (inclusive)
    #[arg(long)]
    pub to: usize,
    #[arg(long, default_value_t = 1)]
    pub step: usize,
}

impl RunArgs {
    /// Loads the config file (or defaults), applies flag overrides and
    /// validates the result.
    pub fn resolve(&self) -> anyhow::Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_file(path)?,
            None => SimConfig::default(),
        };

        let world = &mut config.world;
        if let Some(ticks) = self.ticks {
            world.ticks = ticks;
        }
        if let Some(seed) = self.seed {
            world.seed = seed;
        }
        if let Some(machines) = self.machines {
            world.machines = machines;
        }
        if let Some(cores) = self.cores {
            world.cores_per_machine = cores;
        }
        if let Some(load) = self.load {
            world.procs_per_tick = load;
        }
        if let Some(shards) = self.shards {
            world.shards = shards;
        }
        if let Some(dir) = &self.results_dir {
            config.metrics.results_dir = Some(dir.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

/// File sink when a results directory is configured, otherwise nothing.
pub fn sink_for(config: &SimConfig) -> anyhow::Result<Arc<dyn MetricsSink>> {
    match &config.metrics.results_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "writing metrics channels");
            Ok(Arc::new(FileSink::create(dir)?))
        }
        None => Ok(Arc::new(NullSink)),
    }
}

/// Prints summaries to stdout in `format`.
pub fn print_summaries(summaries: &[PolicySummary], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", render_text(summaries)),
        OutputFormat::Json => println!("{}", render_json(summaries)?),
    }
    Ok(())
}
