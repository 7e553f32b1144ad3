//! Global earliest-deadline-first over one aggregate pool.
//!
//! Waiting procs are admitted to the pool in deadline order. Admission is
//! strict: when the earliest-deadline proc does not fit in fleet memory,
//! nothing behind it is tried this tick.

use async_trait::async_trait;
use fair_core::{PolicyKind, Proc, ProcQueue, QueueOrder, SimConfig, Tick};
use fairgrid_metrics::SchedTarget;
use rand::rngs::StdRng;
use tracing::debug;

use super::{PlacementPolicy, PlacementReport, TickOutcome, pool_outcome};
use crate::error::{SchedulerError, SchedulerResult};
use crate::water_fill::AggregatePool;

pub struct EdfPolicy {
    waiting: ProcQueue,
    pool: AggregatePool<ProcQueue>,
}

impl EdfPolicy {
    /// Builds one pool spanning the whole fleet.
    pub fn new(config: &SimConfig) -> Self {
        let world = &config.world;
        let cores = world.machines * world.cores_per_machine;
        let memory = world.memory_per_machine * world.machines as u64;
        Self {
            waiting: ProcQueue::new(QueueOrder::Fifo),
            pool: AggregatePool::new(
                ProcQueue::new(QueueOrder::Fifo),
                cores,
                memory,
                config.scheduler.tick_epsilon,
            ),
        }
    }

    /// The fleet-wide pool.
    pub fn pool(&self) -> &AggregatePool<ProcQueue> {
        &self.pool
    }

    /// Removes the waiting proc with the earliest deadline.
    pub fn dequeue(&mut self) -> Option<Proc> {
        self.waiting.take_min_deadline()
    }
}

#[async_trait]
impl PlacementPolicy for EdfPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Edf
    }

    fn enqueue(&mut self, proc: Proc) {
        self.waiting.push(proc);
    }

    fn place(&mut self, now: Tick, _rng: &mut StdRng) -> PlacementReport {
        let mut report = PlacementReport::default();

        while let Some(head) = self.waiting.peek_min_deadline() {
            if !self.pool.fits(head) {
                debug!(
                    proc = head.id,
                    need = head.desc.max_memory,
                    used = self.pool.memory_used(),
                    "fleet memory full"
                );
                report.rejected.push(head.id);
                break;
            }
            let Some(proc) = self.dequeue() else { break };
            let id = proc.id;
            match self.pool.admit(proc, now) {
                Ok(()) => report.placed.push((id, SchedTarget::Aggregate)),
                Err(proc) => {
                    report.rejected.push(proc.id);
                    self.waiting.push_front(proc);
                    break;
                }
            }
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
