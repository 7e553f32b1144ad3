//! Task descriptors and the provider-side `Proc` record.
//!
//! A `TaskDescriptor` is what a workload hands over: immutable demand.
//! A `Proc` wraps one with the provider's bookkeeping (identity, admission,
//! placement and completion ticks) and the compute delivered so far.

use serde::{Deserialize, Serialize};

use crate::types::{Mem, PriceTier, ProcId, Tick};

/// Immutable demand of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Compute actually required, in tick-units.
    pub compute: f64,
    /// What the submitter claims it needs. May be off in either direction.
    pub compute_guess: f64,
    pub tier: PriceTier,
    /// Footprint when the proc starts.
    pub initial_memory: Mem,
    /// Footprint once the proc has done all of its work.
    pub max_memory: Mem,
}

/// How a host charges a proc's memory against its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryModel {
    /// Charge the live footprint, which grows with progress.
    #[default]
    Live,
    /// Charge `max_memory` up front.
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proc {
    pub id: ProcId,
    pub desc: TaskDescriptor,
    pub admitted_at: Tick,
    pub placed_at: Option<Tick>,
    pub completed_at: Option<Tick>,
    /// Absolute deadline: admission plus the compute stretched by how far
    /// below the top tier this proc pays.
    pub deadline: Tick,
    comp_done: f64,
}

impl Proc {
    /// Creates a fresh proc admitted at `admitted_at`, with its deadline fixed from its tier.
    pub fn new(id: ProcId, desc: TaskDescriptor, admitted_at: Tick) -> Self {
        let deadline = admitted_at + desc.compute * desc.tier.stretch();
        Self {
            id,
            desc,
            admitted_at,
            placed_at: None,
            completed_at: None,
            deadline,
            comp_done: 0.0,
        }
    }

    /// Runs for up to `offered` ticks. Returns the ticks consumed and
    /// whether the proc finished. Never consumes more than it needs.
    pub fn run_till_out_or_done(&mut self, offered: f64) -> (f64, bool) {
        let offered = offered.max(0.0);
        let work_left = self.desc.compute - self.comp_done;
        if work_left <= offered {
            self.comp_done = self.desc.compute;
            (work_left.max(0.0), true)
        } else {
            self.comp_done += offered;
            (offered, false)
        }
    }

    /// Compute finished so far.
    pub fn comp_done(&self) -> f64 {
        self.comp_done
    }

    /// Compute still owed.
    pub fn remaining(&self) -> f64 {
        self.desc.compute - self.comp_done
    }

    pub fn is_done(&self) -> bool {
        self.comp_done >= self.desc.compute
    }

    pub fn tier(&self) -> PriceTier {
        self.desc.tier
    }

    /// Price paid per tick of compute.
    pub fn dollars(&self) -> f64 {
        self.desc.tier.dollars()
    }

    /// Fraction of the work done, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.desc.compute <= 0.0 {
            return 1.0;
        }
        (self.comp_done / self.desc.compute).clamp(0.0, 1.0)
    }

    /// Live footprint, interpolated between initial and max memory.
    pub fn memory_in_use(&self) -> Mem {
        let lo = self.desc.initial_memory.min(self.desc.max_memory);
        let span = (self.desc.max_memory - lo) as f64;
        lo + (span * self.progress()).round() as Mem
    }

    /// Memory charged against a host under `model`.
    pub fn footprint(&self, model: MemoryModel) -> Mem {
        match model {
            MemoryModel::Live => self.memory_in_use(),
            MemoryModel::Reserved => self.desc.max_memory,
        }
    }

    /// Higher means cheaper to kill: little sunk work at a low price.
    pub fn killable_score(&self) -> f64 {
        1.0 / ((1.0 + self.comp_done) * self.dollars())
    }

    /// Value thrown away if this proc is killed now.
    pub fn wasted_value(&self) -> f64 {
        self.comp_done * self.dollars()
    }

    /// Ticks from admission to completion.
    pub fn latency(&self) -> Option<Tick> {
        self.completed_at.map(|done| done - self.admitted_at)
    }

    /// How many times longer than its bare compute the proc took.
    pub fn slowdown(&self) -> Option<f64> {
        self.latency().map(|l| l / self.desc.compute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(compute: f64, tier: usize) -> TaskDescriptor {
        TaskDescriptor {
            compute,
            compute_guess: compute,
            tier: PriceTier::new(tier).unwrap(),
            initial_memory: 100,
            max_memory: 1100,
        }
    }

    #[test]
    fn partial_run_consumes_all_offered() {
        let mut p = Proc::new(1, desc(2.0, 2), 0.0);
        let (used, done) = p.run_till_out_or_done(0.5);
        assert_eq!(used, 0.5);
        assert!(!done);
        assert_eq!(p.comp_done(), 0.5);
        assert_eq!(p.remaining(), 1.5);
    }

    #[test]
    fn finishing_run_returns_only_what_was_needed() {
        let mut p = Proc::new(1, desc(1.0, 2), 0.0);
        p.run_till_out_or_done(0.75);
        let (used, done) = p.run_till_out_or_done(0.5);
        assert!((used - 0.25).abs() < 1e-12);
        assert!(done);
        assert!(p.is_done());
        assert_eq!(p.comp_done(), 1.0);
    }

    #[test]
    fn progress_never_decreases() {
        let mut p = Proc::new(1, desc(3.0, 0), 0.0);
        let mut last = 0.0;
        for offer in [0.1, 0.0, -1.0, 0.7, 5.0] {
            p.run_till_out_or_done(offer);
            assert!(p.comp_done() >= last);
            assert!(p.comp_done() <= p.desc.compute);
            last = p.comp_done();
        }
        assert!(p.is_done());
    }

    #[test]
    fn deadline_stretches_cheap_tiers() {
        let top = Proc::new(1, desc(2.0, 4), 10.0);
        let cheap = Proc::new(2, desc(2.0, 0), 10.0);
        assert_eq!(top.deadline, 12.0);
        assert!(cheap.deadline > top.deadline);
        assert!((cheap.deadline - (10.0 + 2.0 * 2.0 / 0.3)).abs() < 1e-9);
    }

    #[test]
    fn memory_grows_with_progress() {
        let mut p = Proc::new(1, desc(2.0, 1), 0.0);
        assert_eq!(p.memory_in_use(), 100);
        p.run_till_out_or_done(1.0);
        assert_eq!(p.memory_in_use(), 600);
        p.run_till_out_or_done(1.0);
        assert_eq!(p.memory_in_use(), 1100);
        assert_eq!(p.footprint(MemoryModel::Reserved), 1100);
    }

    #[test]
    fn killable_score_prefers_cheap_fresh_procs() {
        let fresh_cheap = Proc::new(1, desc(5.0, 0), 0.0);
        let mut worked_pricey = Proc::new(2, desc(5.0, 4), 0.0);
        worked_pricey.run_till_out_or_done(2.0);
        assert!(fresh_cheap.killable_score() > worked_pricey.killable_score());
        assert_eq!(fresh_cheap.wasted_value(), 0.0);
        assert_eq!(worked_pricey.wasted_value(), 4.0);
    }

    #[test]
    fn latency_needs_completion() {
        let mut p = Proc::new(1, desc(1.0, 3), 4.0);
        assert!(p.latency().is_none());
        p.completed_at = Some(6.5);
        assert_eq!(p.latency(), Some(2.5));
        assert_eq!(p.slowdown(), Some(2.5));
    }
}
