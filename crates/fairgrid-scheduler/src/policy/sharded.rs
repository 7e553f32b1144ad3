//! Sharded least-loaded placement.
//!
//! The fleet is cut into contiguous, disjoint ranges of machines, each
//! with its own waiting queue. New procs go to shards in turn. Within a
//! shard, placement samples `k` machines and takes the one holding the
//! fewest procs among those with room for the proc's full footprint.
//! Machines split each core's tick evenly among the procs on it.

use std::ops::Range;

use async_trait::async_trait;
use fair_core::{MemoryModel, PolicyKind, Proc, ProcQueue, QueueOrder, SimConfig, Tick};
use fairgrid_metrics::SchedTarget;
use fairgrid_placement::power_of_k;
use rand::rngs::StdRng;
use tracing::{debug, trace};

use super::{
    PlacementPolicy, PlacementReport, TickOutcome, audit_machines, fold_machine_report,
    machine_usage,
};
use crate::core_sched::{CoreSettings, ShareRule};
use crate::error::SchedulerResult;
use crate::load_balancer::RoundRobinBalancer;
use crate::machine::{Dispatch, Machine, MachineSettings};

struct Shard {
    machines: Range<usize>,
    waiting: ProcQueue,
}

pub struct ShardedPolicy {
    machines: Vec<Machine>,
    shards: Vec<Shard>,
    admission: RoundRobinBalancer,
    k: usize,
}

impl ShardedPolicy {
    /// Builds the fleet and cuts it into `world.shards` shards.
    pub fn new(config: &SimConfig) -> Self {
        let world = &config.world;
        let core = CoreSettings::from_config(
            &config.scheduler,
            ShareRule::Equal,
            MemoryModel::Reserved,
        );
        let settings = MachineSettings {
            cores: world.cores_per_machine,
            memory: world.memory_per_machine,
            dispatch: Dispatch::Push,
            core,
        };
        let machines = (0..world.machines)
            .map(|id| Machine::new(id, settings.clone()))
            .collect();

        let shards = shard_ranges(world.machines, world.shards)
            .into_iter()
            .map(|machines| Shard {
                machines,
                waiting: ProcQueue::new(QueueOrder::Fifo),
            })
            .collect();

        Self {
            machines,
            shards,
            admission: RoundRobinBalancer::new(),
            k: config.placement.k_choices_down,
        }
    }

    /// Every machine of the fleet, by id.
    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    fn pick_machine(&self, range: &Range<usize>, proc: &Proc, rng: &mut StdRng) -> Option<usize> {
        let machines = &self.machines[range.clone()];
        let need = proc.footprint(MemoryModel::Reserved);
        let (offset, load) = power_of_k(rng, machines.len(), self.k, |i| {
            (machines[i].free_memory() >= need).then(|| machines[i].resident())
        })?;
        trace!(proc = proc.id, machine = range.start + offset, load, "least-loaded pick");
        Some(range.start + offset)
    }
}

#[async_trait]
impl PlacementPolicy for ShardedPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Sharded
    }

    fn enqueue(&mut self, proc: Proc) {
        let shard = self.admission.next(self.shards.len()).unwrap_or(0);
        self.shards[shard].waiting.push(proc);
    }

    fn place(&mut self, now: Tick, rng: &mut StdRng) -> PlacementReport {
        let mut report = PlacementReport::default();

        for s in 0..self.shards.len() {
            let range = self.shards[s].machines.clone();
            let waiting: Vec<Proc> = self.shards[s].waiting.drain().collect();

            for proc in waiting {
                match self.pick_machine(&range, &proc, rng) {
                    Some(machine) => {
                        report.placed.push((proc.id, SchedTarget::Machine(machine)));
                        self.machines[machine].admit(proc, now);
                    }
                    None => {
                        report.rejected.push(proc.id);
                        self.shards[s].waiting.push(proc);
                    }
                }
            }
        }

        debug!(
            placed = report.placed.len(),
            rejected = report.rejected.len(),
            "sharded placement done"
        );
        report
    }

    async fn execute(&mut self, now: Tick, _rng: &mut StdRng) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        for machine in &mut self.machines {
            let report = machine.run_tick(now).await;
            fold_machine_report(&mut outcome, report);
        }
        machine_usage(&mut outcome, &self.machines);
        outcome
    }

    fn backlog(&self) -> usize {
        self.shards.iter().map(|s| s.waiting.len()).sum()
    }

    fn audit(&self) -> SchedulerResult<()> {
        audit_machines(self.kind(), &self.machines)
    }
}

/// Splits `machines` into `shards` contiguous ranges; the last one takes
/// the remainder. Never yields an empty range while there are machines.
fn shard_ranges(machines: usize, shards: usize) -> Vec<Range<usize>> {
    let shards = shards.clamp(1, machines.max(1));
    let per = machines / shards;
    (0..shards)
        .map(|s| {
            let end = if s + 1 == shards { machines } else { (s + 1) * per };
            s * per..end
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fair_core::{PriceTier, ProcId, TaskDescriptor};
    use rand::SeedableRng;

    fn config(machines: usize, shards: usize) -> SimConfig {
        let mut config = SimConfig::default();
        config.world.machines = machines;
        config.world.cores_per_machine = 1;
        config.world.memory_per_machine = 1_000;
        config.world.shards = shards;
        config
    }

    fn proc(id: ProcId, compute: f64, initial: u64, max: u64) -> Proc {
        let desc = TaskDescriptor {
            compute,
            compute_guess: compute,
            tier: PriceTier::new(2).unwrap(),
            initial_memory: initial,
            max_memory: max,
        };
        Proc::new(id, desc, 0.0)
    }

    #[test]
    fn shard_ranges_cover_the_fleet() {
        assert_eq!(shard_ranges(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(shard_ranges(4, 4), vec![0..1, 1..2, 2..3, 3..4]);
        assert_eq!(shard_ranges(2, 5), vec![0..1, 1..2]);
        assert_eq!(shard_ranges(5, 0), vec![0..5]);
    }

    #[test]
    fn procs_stay_inside_their_shard() {
        let mut policy = ShardedPolicy::new(&config(6, 2));
        let mut rng = StdRng::seed_from_u64(7);
        for id in 0..8 {
            policy.enqueue(proc(id, 1.0, 10, 100));
        }
        let report = policy.place(0.0, &mut rng);
        assert_eq!(report.placed.len(), 8);
        for (id, target) in report.placed {
            let SchedTarget::Machine(m) = target else {
                panic!("expected a machine target");
            };
            // Even ids went to shard 0, odd ids to shard 1.
            if id % 2 == 0 {
                assert!(m < 3);
            } else {
                assert!(m >= 3);
            }
        }
        policy.audit().unwrap();
    }

    #[test]
    fn reserves_max_memory_and_waits_when_full() {
        let mut policy = ShardedPolicy::new(&config(1, 1));
        let mut rng = StdRng::seed_from_u64(8);
        policy.enqueue(proc(1, 1.0, 10, 600));
        policy.enqueue(proc(2, 1.0, 10, 600));

        let report = policy.place(0.0, &mut rng);
        assert_eq!(report.placed, vec![(1, SchedTarget::Machine(0))]);
        assert_eq!(report.rejected, vec![2]);
        assert_eq!(policy.machines()[0].memory_used(), 600);
        assert_eq!(policy.backlog(), 1);
    }

    #[test]
    fn least_loaded_machine_wins() {
        let mut cfg = config(2, 1);
        cfg.placement.k_choices_down = 2;
        let mut policy = ShardedPolicy::new(&cfg);
        let mut rng = StdRng::seed_from_u64(9);
        for id in 0..4 {
            policy.enqueue(proc(id, 5.0, 10, 100));
            policy.place(0.0, &mut rng);
        }
        assert_eq!(policy.machines()[0].resident(), 2);
        assert_eq!(policy.machines()[1].resident(), 2);
    }

    #[tokio::test]
    async fn equal_split_runs_every_proc() {
        let mut policy = ShardedPolicy::new(&config(1, 1));
        let mut rng = StdRng::seed_from_u64(10);
        policy.enqueue(proc(1, 0.25, 10, 100));
        policy.enqueue(proc(2, 4.0, 10, 100));
        policy.place(0.0, &mut rng);

        let outcome = policy.execute(0.0, &mut rng).await;
        assert_eq!(outcome.completed.len(), 1);
        assert_eq!(outcome.completed[0].id, 1);
        assert!(outcome.max_core_ticks <= 1.0 + 1e-5);
        assert_eq!(outcome.memory_used, 100);
        policy.audit().unwrap();
    }
}
