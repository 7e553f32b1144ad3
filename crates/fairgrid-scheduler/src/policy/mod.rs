//! Placement policies.
//!
//! Every policy owns its own copy of the fleet and sees the same procs at
//! the same ticks. Each tick the driver calls `place`, then `execute`.

mod edf;
mod idle_heap;
mod ideal;
mod sharded;

pub use edf::EdfPolicy;
pub use idle_heap::IdleHeapPolicy;
pub use ideal::IdealPolicy;
pub use sharded::ShardedPolicy;

use async_trait::async_trait;
use fair_core::{Mem, PolicyKind, Proc, ProcId, SimConfig, Tick};
use fairgrid_metrics::SchedTarget;
use rand::rngs::StdRng;

use crate::error::{SchedulerError, SchedulerResult};
use crate::machine::{Machine, MachineTickReport};
use crate::water_fill::{AggregatePool, PoolTickReport, ReadySet};

/// Outcome of one placement step.
#[derive(Debug, Default)]
pub struct PlacementReport {
    pub placed: Vec<(ProcId, SchedTarget)>,
    /// Procs that were tried and sent back to wait for the next tick.
    pub rejected: Vec<ProcId>,
    /// Procs killed to make room.
    pub evicted: Vec<Proc>,
}

/// Outcome of one execution step.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub completed: Vec<Proc>,
    pub evicted: Vec<Proc>,
    pub ticks_used: f64,
    /// Compute available this tick, in tick-units.
    pub capacity: f64,
    /// Largest budget consumed by any single (virtual) core.
    pub max_core_ticks: f64,
    pub memory_used: Mem,
    pub memory_total: Mem,
}

#[async_trait]
pub trait PlacementPolicy: Send {
    fn kind(&self) -> PolicyKind;

    /// Accepts a newly generated proc.
    fn enqueue(&mut self, proc: Proc);

    /// Places waiting procs.
    fn place(&mut self, now: Tick, rng: &mut StdRng) -> PlacementReport;

    /// Runs one tick of compute on everything placed.
    async fn execute(&mut self, now: Tick, rng: &mut StdRng) -> TickOutcome;

    /// Procs still waiting for placement.
    fn backlog(&self) -> usize;

    /// Checks memory accounting after a completed tick.
    fn audit(&self) -> SchedulerResult<()>;
}

/// Builds the policy of `kind` for the fleet described by `config`.
pub fn build(kind: PolicyKind, config: &SimConfig) -> Box<dyn PlacementPolicy> {
    match kind {
        PolicyKind::IdleHeap => Box::new(IdleHeapPolicy::new(config)),
        PolicyKind::Edf => Box::new(EdfPolicy::new(config)),
        PolicyKind::Sharded => Box::new(ShardedPolicy::new(config)),
        PolicyKind::Ideal => Box::new(IdealPolicy::new(config)),
    }
}

// ── Internal helpers ───────────────────────────────────────────

/// Memory accounting checks shared by the machine-based policies.
fn audit_machines(kind: PolicyKind, machines: &[Machine]) -> SchedulerResult<()> {
    for m in machines {
        if m.memory_used() > m.capacity() {
            return Err(SchedulerError::invariant(
                kind,
                format!(
                    "machine {} uses {} MB of {} MB",
                    m.id(),
                    m.memory_used(),
                    m.capacity()
                ),
            ));
        }
        if m.accounted_memory() != m.memory_used() {
            return Err(SchedulerError::invariant(
                kind,
                format!(
                    "machine {} charges {} MB but its procs hold {} MB",
                    m.id(),
                    m.memory_used(),
                    m.accounted_memory()
                ),
            ));
        }
    }
    Ok(())
}

fn fold_machine_report(outcome: &mut TickOutcome, report: MachineTickReport) {
    outcome.ticks_used += report.ticks_used;
    outcome.max_core_ticks = outcome.max_core_ticks.max(report.max_core_ticks);
    outcome.completed.extend(report.completed);
    outcome.evicted.extend(report.evicted);
}

fn machine_usage(outcome: &mut TickOutcome, machines: &[Machine]) {
    outcome.capacity = machines.iter().map(|m| m.core_count() as f64).sum();
    outcome.memory_used = machines.iter().map(Machine::memory_used).sum();
    outcome.memory_total = machines.iter().map(Machine::capacity).sum();
}

fn pool_outcome<R: ReadySet>(pool: &AggregatePool<R>, report: PoolTickReport) -> TickOutcome {
    TickOutcome {
        completed: report.completed,
        evicted: Vec::new(),
        ticks_used: report.ticks_used,
        capacity: pool.cores() as f64,
        max_core_ticks: report.max_core_ticks,
        memory_used: pool.memory_used(),
        memory_total: pool.capacity(),
    }
}
