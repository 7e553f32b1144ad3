use anyhow::ensure;
use fairgrid_scheduler::World;
use tracing::info;

use super::{SweepArgs, print_summaries, sink_for};

/// Runs one world per load level. All levels share one sink; the load
/// column keeps their rows apart.
pub async fn sweep(args: &SweepArgs) -> anyhow::Result<()> {
    ensure!(args.step > 0, "--step must be at least 1");
    ensure!(args.from <= args.to, "--from must not exceed --to");

    let base = args.run.resolve()?;
    let sink = sink_for(&base)?;
    let mut summaries = Vec::new();

    for load in (args.from..=args.to).step_by(args.step) {
        let mut config = base.clone();
        config.world.procs_per_tick = load;
        let ticks = config.world.ticks;

        let mut world = World::with_default_workload(config, sink.clone())?;
        world.advance(ticks).await?;
        info!(load, ticks, "load level finished");
        summaries.extend(world.summaries());
    }

    sink.flush()?;
    print_summaries(&summaries, args.run.format)
}
