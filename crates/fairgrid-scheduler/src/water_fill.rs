//! An aggregate compute pool that water-fills its ticks.
//!
//! The pool stands in for a whole fleet: `cores` virtual cores of one
//! tick each, and one memory budget with no per-machine partitioning.
//! Each tick the pool takes ready procs in the order the ready set
//! dictates and hands each to the virtual core with the most budget
//! left. A proc that finishes gives back what it did not use; one that
//! does not finish drains its core and waits for the next tick. No proc
//! runs twice in the same tick.

use fair_core::{Mem, MultiQueue, Proc, ProcQueue, Tick};
use tracing::trace;

/// Ordering of the procs resident in a pool.
pub trait ReadySet: Send {
    fn insert(&mut self, proc: Proc);

    /// Removes the proc that should run next.
    fn take_next(&mut self, now: Tick) -> Option<Proc>;

    /// Returns procs that ran this tick, in the order they were taken.
    fn restore(&mut self, ran: Vec<Proc>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Earliest deadline first, by linear scan.
impl ReadySet for ProcQueue {
    fn insert(&mut self, proc: Proc) {
        self.push(proc);
    }

    fn take_next(&mut self, _now: Tick) -> Option<Proc> {
        self.take_min_deadline()
    }

    fn restore(&mut self, ran: Vec<Proc>) {
        for proc in ran.into_iter().rev() {
            self.push_front(proc);
        }
    }

    fn len(&self) -> usize {
        ProcQueue::len(self)
    }
}

/// Paid-for urgency across price tiers.
impl ReadySet for MultiQueue {
    fn insert(&mut self, proc: Proc) {
        self.enqueue(proc);
    }

    fn take_next(&mut self, now: Tick) -> Option<Proc> {
        self.dequeue(now)
    }

    fn restore(&mut self, ran: Vec<Proc>) {
        for proc in ran.into_iter().rev() {
            self.requeue_front(proc);
        }
    }

    fn len(&self) -> usize {
        MultiQueue::len(self)
    }
}

#[derive(Debug, Default)]
pub struct PoolTickReport {
    pub completed: Vec<Proc>,
    pub ticks_used: f64,
    /// Largest budget consumed by a single virtual core.
    pub max_core_ticks: f64,
    /// Procs that got a slice this tick.
    pub ran: usize,
}

#[derive(Debug)]
pub struct AggregatePool<R> {
    ready: R,
    cores: usize,
    memory: Mem,
    used: Mem,
    epsilon: f64,
}

impl<R: ReadySet> AggregatePool<R> {
    /// Creates an empty pool of `cores` cores and `memory` MB fed from `ready`.
    pub fn new(ready: R, cores: usize, memory: Mem, epsilon: f64) -> Self {
        Self {
            ready,
            cores,
            memory,
            used: 0,
            epsilon,
        }
    }

    /// Cores in the pool.
    pub fn cores(&self) -> usize {
        self.cores
    }

    /// Total memory of the pool in MB.
    pub fn capacity(&self) -> Mem {
        self.memory
    }

    /// Memory reserved by running procs.
    pub fn memory_used(&self) -> Mem {
        self.used
    }

    /// Procs admitted and not yet finished.
    pub fn resident(&self) -> usize {
        self.ready.len()
    }

    /// Whether `proc` can be reserved its full footprint right now.
    pub fn fits(&self, proc: &Proc) -> bool {
        self.used + proc.desc.max_memory <= self.memory
    }

    /// Reserves `proc`'s max footprint and makes it ready. Hands the proc
    /// back if it does not fit.
    pub fn admit(&mut self, mut proc: Proc, now: Tick) -> Result<(), Proc> {
        if !self.fits(&proc) {
            return Err(proc);
        }
        self.used += proc.desc.max_memory;
        proc.placed_at = Some(now);
        self.ready.insert(proc);
        Ok(())
    }

    pub fn run_tick(&mut self, now: Tick) -> PoolTickReport {
        let mut report = PoolTickReport::default();
        let mut budgets = vec![1.0_f64; self.cores];
        let mut ran = Vec::new();

        while let Some(core) = widest(&budgets).filter(|&c| budgets[c] > self.epsilon) {
            let Some(mut proc) = self.ready.take_next(now) else {
                break;
            };
            let (used, done) = proc.run_till_out_or_done(budgets[core]);
            budgets[core] -= used;
            report.ticks_used += used;
            report.ran += 1;

            if done {
                proc.completed_at = Some(now + (1.0 - budgets[core]));
                self.used = self.used.saturating_sub(proc.desc.max_memory);
                report.completed.push(proc);
            } else {
                ran.push(proc);
            }
        }

        self.ready.restore(ran);
        report.max_core_ticks = budgets.iter().map(|b| 1.0 - b).fold(0.0, f64::max);
        trace!(
            used = report.ticks_used,
            ran = report.ran,
            completed = report.completed.len(),
            "pool tick finished"
        );
        report
    }
}

/// Index of the core with the most budget left; lowest index on a tie.
fn widest(budgets: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, b) in budgets.iter().enumerate() {
        if best.is_none_or(|j| *b > budgets[j]) {
            best = Some(i);
        }
    }
    best
}
