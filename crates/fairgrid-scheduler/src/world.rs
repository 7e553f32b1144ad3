//! The simulation driver.
//!
//! One `World` owns a workload, a metrics sink and one lane per enabled
//! policy. Each tick it:
//! - Generates the tick's procs and hands every lane its own copy
//! - Runs placement, then execution, in each lane
//! - Writes analysis rows and folds outcomes into per-policy summaries
//! - Audits every lane's memory accounting
//!
//! All randomness comes from one master stream seeded from the config.
//! The workload and every policy get their own stream derived from it, so
//! enabling or disabling a policy never changes what another one sees.

use std::sync::Arc;

use fair_core::{PolicyKind, Proc, ProcId, SimConfig, Tick};
use fairgrid_loadgen::{TieredPareto, Workload};
use fairgrid_metrics::channel::{eviction_row, procs_done_row, sched_row, usage_row};
use fairgrid_metrics::{Channel, MetricsSink, PolicySummary, SchedTarget, SummaryCollector};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::error::{SchedulerError, SchedulerResult};
use crate::policy::{self, PlacementPolicy, PlacementReport, TickOutcome};

/// One policy and everything that belongs to it alone.
struct Lane {
    policy: Box<dyn PlacementPolicy>,
    rng: StdRng,
    summary: SummaryCollector,
}

pub struct World {
    config: SimConfig,
    workload: Box<dyn Workload>,
    workload_rng: StdRng,
    lanes: Vec<Lane>,
    sink: Arc<dyn MetricsSink>,
    now: Tick,
    ticks: u64,
    next_id: ProcId,
}

impl World {
    /// Build a world over `config`, drawing procs from `workload`.
    pub fn new(
        config: SimConfig,
        workload: Box<dyn Workload>,
        sink: Arc<dyn MetricsSink>,
    ) -> SchedulerResult<Self> {
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(format!("{e:#}")))?;

        let mut master = StdRng::seed_from_u64(config.world.seed);
        let workload_rng = StdRng::from_rng(&mut master);
        let load = config.world.procs_per_tick;

        // Every kind draws its stream, enabled or not.
        let mut lanes = Vec::new();
        for kind in PolicyKind::ALL {
            let rng = StdRng::from_rng(&mut master);
            if !config.world.policies.contains(&kind) {
                continue;
            }
            lanes.push(Lane {
                policy: policy::build(kind, &config),
                rng,
                summary: SummaryCollector::new(kind, load),
            });
        }

        info!(
            machines = config.world.machines,
            cores = config.world.cores_per_machine,
            load,
            seed = config.world.seed,
            policies = lanes.len(),
            "world built"
        );

        Ok(Self {
            config,
            workload,
            workload_rng,
            lanes,
            sink,
            now: 0.0,
            ticks: 0,
            next_id: 0,
        })
    }

    /// Build a world fed by the tiered-pareto generator from `config.workload`.
    pub fn with_default_workload(
        config: SimConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> SchedulerResult<Self> {
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(format!("{e:#}")))?;
        let workload = TieredPareto::new(&config.workload)?;
        Self::new(config, Box::new(workload), sink)
    }

    /// The validated configuration of this world.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The current tick.
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Enabled policies, in `PolicyKind::ALL` order.
    pub fn policies(&self) -> impl Iterator<Item = PolicyKind> + '_ {
        self.lanes.iter().map(|l| l.policy.kind())
    }

    /// The policy of `kind`, if enabled.
    pub fn policy(&self, kind: PolicyKind) -> Option<&dyn PlacementPolicy> {
        self.lanes
            .iter()
            .find(|l| l.policy.kind() == kind)
            .map(|l| l.policy.as_ref())
    }

    /// One summary per enabled policy, so far.
    pub fn summaries(&self) -> Vec<PolicySummary> {
        self.lanes.iter().map(|l| l.summary.summary()).collect()
    }

    /// Run `n` whole ticks.
    pub async fn advance(&mut self, n: u64) -> SchedulerResult<()> {
        for _ in 0..n {
            self.tick().await?;
        }
        info!(ticks = self.ticks, now = self.now, "advanced");
        Ok(())
    }

    /// Run one tick: generate, enqueue, place, execute, advance the clock.
    pub async fn tick(&mut self) -> SchedulerResult<()> {
        let now = self.now;
        let load = self.config.world.procs_per_tick;
        let epsilon = self.config.scheduler.tick_epsilon;

        let descriptors = self.workload.generate(load, &mut self.workload_rng);
        for desc in descriptors {
            let id = self.next_id;
            self.next_id += 1;
            for lane in &mut self.lanes {
                lane.policy.enqueue(Proc::new(id, desc.clone(), now));
            }
        }

        for lane in &mut self.lanes {
            let kind = lane.policy.kind();

            let placement = lane.policy.place(now, &mut lane.rng);
            record_placement(
                self.sink.as_ref(),
                &mut lane.summary,
                kind,
                load,
                now,
                &placement,
            );
            lane.policy.audit()?;

            let outcome = lane.policy.execute(now, &mut lane.rng).await;
            let backlog = lane.policy.backlog();
            record_outcome(
                self.sink.as_ref(),
                &mut lane.summary,
                kind,
                load,
                now,
                &outcome,
                backlog,
            );

            if outcome.max_core_ticks > 1.0 + epsilon {
                return Err(SchedulerError::invariant(
                    kind,
                    format!(
                        "a core consumed {:.6} ticks at tick {now}",
                        outcome.max_core_ticks
                    ),
                ));
            }
            lane.policy.audit()?;

            debug!(
                policy = %kind,
                tick = now,
                placed = placement.placed.len(),
                rejected = placement.rejected.len(),
                completed = outcome.completed.len(),
                evicted = placement.evicted.len() + outcome.evicted.len(),
                backlog,
                "tick done"
            );
        }

        self.now += 1.0;
        self.ticks += 1;
        Ok(())
    }

    /// Push any buffered rows out of the sink.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.sink.flush()
    }
}

// ── Internal helpers ───────────────────────────────────────────

fn record_placement(
    sink: &dyn MetricsSink,
    summary: &mut SummaryCollector,
    kind: PolicyKind,
    load: usize,
    now: Tick,
    report: &PlacementReport,
) {
    let sched = Channel::Sched.for_policy(kind);
    for &(id, target) in &report.placed {
        sink.record(&sched, sched_row(load, now, id, target));
    }
    for &id in &report.rejected {
        sink.record(&sched, sched_row(load, now, id, SchedTarget::Rejected));
    }
    summary.record_rejections(report.rejected.len());
    record_evictions(sink, summary, kind, load, now, &report.evicted);
}

fn record_outcome(
    sink: &dyn MetricsSink,
    summary: &mut SummaryCollector,
    kind: PolicyKind,
    load: usize,
    now: Tick,
    outcome: &TickOutcome,
    backlog: usize,
) {
    let done = Channel::ProcsDone.for_policy(kind);
    for proc in &outcome.completed {
        sink.record(&done, procs_done_row(load, proc));
        summary.record_completion(proc);
    }
    record_evictions(sink, summary, kind, load, now, &outcome.evicted);

    sink.record(
        &Channel::Usage.for_policy(kind),
        usage_row(
            load,
            now,
            outcome.ticks_used,
            outcome.capacity,
            outcome.memory_used,
            outcome.memory_total,
            backlog,
        ),
    );
    summary.record_usage(
        outcome.ticks_used,
        outcome.capacity,
        outcome.memory_used,
        outcome.memory_total,
        backlog,
    );
}

fn record_evictions(
    sink: &dyn MetricsSink,
    summary: &mut SummaryCollector,
    kind: PolicyKind,
    load: usize,
    now: Tick,
    evicted: &[Proc],
) {
    if evicted.is_empty() {
        return;
    }
    let channel = Channel::Evictions.for_policy(kind);
    for proc in evicted {
        sink.record(&channel, eviction_row(load, now, proc, proc.memory_in_use()));
        summary.record_eviction(proc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fair_core::{PriceTier, TaskDescriptor};
    use fairgrid_loadgen::ScriptedWorkload;
    use fairgrid_metrics::MemorySink;

    fn small_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.world.machines = 2;
        config.world.cores_per_machine = 2;
        config.world.memory_per_machine = 4_000;
        config.world.procs_per_tick = 2;
        config.world.shards = 1;
        config.workload.max_memory = 1_000;
        config
    }

    fn scripted(n: usize) -> ScriptedWorkload {
        ScriptedWorkload::new((0..n).map(|i| TaskDescriptor {
            compute: 0.5,
            compute_guess: 0.5,
            tier: PriceTier::new(i % 5).unwrap(),
            initial_memory: 100,
            max_memory: 200,
        }))
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = small_config();
        config.world.machines = 0;
        let err = World::new(config, Box::new(scripted(0)), Arc::new(MemorySink::new()))
            .err()
            .unwrap();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    }

    #[test]
    fn builds_only_enabled_policies() {
        let mut config = small_config();
        config.world.policies = vec![PolicyKind::Ideal, PolicyKind::Edf];
        let world =
            World::new(config, Box::new(scripted(0)), Arc::new(MemorySink::new())).unwrap();
        let kinds: Vec<_> = world.policies().collect();
        assert_eq!(kinds, vec![PolicyKind::Edf, PolicyKind::Ideal]);
        assert!(world.policy(PolicyKind::Sharded).is_none());
    }

    #[tokio::test]
    async fn every_policy_sees_the_same_procs() {
        let sink = Arc::new(MemorySink::new());
        let mut world = World::new(small_config(), Box::new(scripted(4)), sink.clone()).unwrap();
        world.advance(4).await.unwrap();

        assert_eq!(world.now(), 4.0);
        for summary in world.summaries() {
            assert_eq!(summary.completed, 4, "{} lost procs", summary.policy);
            assert_eq!(summary.ticks, 4);
        }
        for kind in PolicyKind::ALL {
            let usage = sink.entries(&Channel::Usage.for_policy(kind));
            assert_eq!(usage.len(), 4);
            let done = sink.entries(&Channel::ProcsDone.for_policy(kind));
            assert_eq!(done.len(), 4);
        }
    }
}
