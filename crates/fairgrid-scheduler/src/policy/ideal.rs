//! Idealised baseline: one multi-queue feeding one aggregate pool.
//!
//! No per-machine memory, no placement cost. Procs leave the waiting
//! queue in multi-queue urgency order while the fleet's memory lasts, and
//! the pool runs resident procs in the same order.

use async_trait::async_trait;
use fair_core::{MultiQueue, PolicyKind, Proc, SimConfig, Tick};
use fairgrid_metrics::SchedTarget;
use rand::rngs::StdRng;

use super::{PlacementPolicy, PlacementReport, TickOutcome, pool_outcome};
use crate::error::{SchedulerError, SchedulerResult};
use crate::water_fill::AggregatePool;

pub struct IdealPolicy {
    waiting: MultiQueue,
    pool: AggregatePool<MultiQueue>,
}

impl IdealPolicy {
    /// Builds one pool spanning the whole fleet.
    pub fn new(config: &SimConfig) -> Self {
        let world = &config.world;
        Self {
            waiting: MultiQueue::new(),
            pool: AggregatePool::new(
                MultiQueue::new(),
                world.machines * world.cores_per_machine,
                world.memory_per_machine * world.machines as u64,
                config.scheduler.tick_epsilon,
            ),
        }
    }

    /// The fleet-wide pool.
    pub fn pool(&self) -> &AggregatePool<MultiQueue> {
        &self.pool
    }
}

#[async_trait]
impl PlacementPolicy for IdealPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Ideal
    }

    fn enqueue(&mut self, proc: Proc) {
        self.waiting.enqueue(proc);
    }

    fn place(&mut self, now: Tick, _rng: &mut StdRng) -> PlacementReport {
        let mut report = PlacementReport::default();
        while let Some(proc) = self.waiting.dequeue(now) {
            let id = proc.id;
            if let Err(proc) = self.pool.admit(proc, now) {
                report.rejected.push(id);
                self.waiting.requeue_front(proc);
                break;
            }
            report.placed.push((id, SchedTarget::Aggregate));
        }
        report
    }

    async fn execute(&mut self, now: Tick, _rng: &mut StdRng) -> TickOutcome {
        let report = self.pool.run_tick(now);
        pool_outcome(&self.pool, report)
    }

    fn backlog(&self) -> usize {
        self.waiting.len()
    }

    fn audit(&self) -> SchedulerResult<()> {
        if self.pool.memory_used() > self.pool.capacity() {
            return Err(SchedulerError::invariant(
                self.kind(),
                format!(
                    "pool reserves {} MB of {} MB",
                    self.pool.memory_used(),
                    self.pool.capacity()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fair_core::{PriceTier, ProcId, TaskDescriptor};
    use rand::SeedableRng;

    fn proc(id: ProcId, compute: f64, tier: usize, memory: u64, admitted: Tick) -> Proc {
        let desc = TaskDescriptor {
            compute,
            compute_guess: compute,
            tier: PriceTier::new(tier).unwrap(),
            initial_memory: memory,
            max_memory: memory,
        };
        Proc::new(id, desc, admitted)
    }

    fn config() -> SimConfig {
        let mut config = SimConfig::default();
        config.world.machines = 2;
        config.world.cores_per_machine = 2;
        config.world.memory_per_machine = 500;
        config
    }

    #[test]
    fn places_by_urgency_until_memory_runs_out() {
        let mut policy = IdealPolicy::new(&config());
        let mut rng = StdRng::seed_from_u64(11);
        // At tick 4: tier 0 waited 4 / 0.3, tier 4 waited 1 / 2.0.
        policy.enqueue(proc(1, 1.0, 0, 400, 0.0));
        policy.enqueue(proc(2, 1.0, 4, 400, 3.0));
        policy.enqueue(proc(3, 1.0, 4, 400, 3.0));

        let report = policy.place(4.0, &mut rng);
        assert_eq!(
            report.placed,
            vec![(2, SchedTarget::Aggregate), (3, SchedTarget::Aggregate)]
        );
        assert_eq!(report.rejected, vec![1]);
        assert_eq!(policy.backlog(), 1);
        policy.audit().unwrap();
    }

    #[tokio::test]
    async fn consumes_the_fleet_budget() {
        let mut policy = IdealPolicy::new(&config());
        let mut rng = StdRng::seed_from_u64(12);
        for id in 0..6 {
            policy.enqueue(proc(id, 2.0, id as usize % 5, 10, 0.0));
        }
        policy.place(0.0, &mut rng);
        let outcome = policy.execute(0.0, &mut rng).await;
        assert_eq!(outcome.capacity, 4.0);
        assert!((outcome.ticks_used - 4.0).abs() < 1e-9);
        assert!(outcome.completed.is_empty());
        assert_eq!(policy.pool().resident(), 6);
    }
}
