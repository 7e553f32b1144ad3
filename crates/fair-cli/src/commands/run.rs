use fairgrid_scheduler::World;
use tracing::info;

use super::{RunArgs, print_summaries, sink_for};

/// Runs one world for the configured number of ticks.
pub async fn run(args: &RunArgs) -> anyhow::Result<()> {
    let config = args.resolve()?;
    let ticks = config.world.ticks;
    let sink = sink_for(&config)?;

    let mut world = World::with_default_workload(config, sink)?;
    world.advance(ticks).await?;
    world.flush()?;

    info!(ticks, "run finished");
    print_summaries(&world.summaries(), args.format)
}
