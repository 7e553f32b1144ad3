//! Eviction planning.
//!
//! Victims are ranked by killable score, most killable first: procs that
//! pay little and have little sunk work go before procs that have paid
//! more or progressed further. Plans only name victims; the caller removes
//! them and reports the loss.

use std::cmp::Ordering;

use fair_core::{Mem, Proc, ProcId};
use tracing::debug;

/// What eviction needs to know about a resident proc.
#[derive(Debug, Clone, PartialEq)]
pub struct Victim {
    pub proc: ProcId,
    pub price: f64,
    /// Memory the host gets back if this proc is killed.
    pub memory: Mem,
    pub killable_score: f64,
    pub wasted_value: f64,
}

impl Victim {
    /// Describes `proc`, which frees `memory` MB if killed.
    pub fn of(proc: &Proc, memory: Mem) -> Self {
        Self {
            proc: proc.id,
            price: proc.dollars(),
            memory,
            killable_score: proc.killable_score(),
            wasted_value: proc.wasted_value(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvictionPlan {
    pub victims: Vec<ProcId>,
    pub freed: Mem,
    /// Sum of the victims' wasted value.
    pub cost: f64,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.victims.is_empty()
    }
}

/// Plans room for a proc that needs `need` MB on a host with `free` MB,
/// killing only procs that pay strictly less than `price`. Returns `None`
/// if even evicting every eligible victim would not make room.
pub fn plan_admission(
    free: Mem,
    need: Mem,
    price: f64,
    candidates: &[Victim],
) -> Option<EvictionPlan> {
    if free >= need {
        return Some(EvictionPlan::default());
    }
    let eligible: Vec<&Victim> = candidates.iter().filter(|v| v.price < price).collect();
    let plan = take_until(ranked(eligible), need - free);
    (free + plan.freed >= need).then_some(plan)
}

/// Plans kills that bring a host `excess` MB over capacity back under it.
/// Any resident proc is eligible. The plan may fall short if the
/// candidates do not hold enough memory.
pub fn plan_pressure_relief(excess: Mem, candidates: &[Victim]) -> EvictionPlan {
    if excess == 0 {
        return EvictionPlan::default();
    }
    let plan = take_until(ranked(candidates.iter().collect()), excess);
    if plan.freed < excess {
        debug!(excess, freed = plan.freed, "pressure relief falls short");
    }
    plan
}

// ── Internal helpers ───────────────────────────────────────────

fn ranked(mut victims: Vec<&Victim>) -> Vec<&Victim> {
    victims.sort_by(|a, b| {
        b.killable_score
            .partial_cmp(&a.killable_score)
            .unwrap_or(Ordering::Equal)
            .then(a.proc.cmp(&b.proc))
    });
    victims
}

fn take_until(victims: Vec<&Victim>, target: Mem) -> EvictionPlan {
    let mut plan = EvictionPlan::default();
    for v in victims {
        if plan.freed >= target {
            break;
        }
        plan.victims.push(v.proc);
        plan.freed += v.memory;
        plan.cost += v.wasted_value;
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn victim(proc: ProcId, price: f64, memory: Mem, comp_done: f64) -> Victim {
        Victim {
            proc,
            price,
            memory,
            killable_score: 1.0 / ((1.0 + comp_done) * price),
            wasted_value: comp_done * price,
        }
    }

    #[test]
    fn no_plan_needed_when_it_fits() {
        let plan = plan_admission(500, 400, 1.0, &[]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.cost, 0.0);
    }

    #[test]
    fn admission_only_kills_cheaper_procs() {
        let candidates = vec![
            victim(1, 2.0, 1_000, 0.0),
            victim(2, 0.3, 200, 1.0),
            victim(3, 1.0, 1_000, 0.0),
        ];
        // Needs 500 more; the 2.0 proc pays more than 1.5 and is off limits.
        let plan = plan_admission(0, 500, 1.5, &candidates).unwrap();
        assert_eq!(plan.victims, vec![2, 3]);
        assert_eq!(plan.freed, 1_200);
        assert!((plan.cost - 0.3).abs() < 1e-12);
    }

    #[test]
    fn admission_fails_without_enough_victims() {
        let candidates = vec![victim(1, 0.3, 100, 0.0), victim(2, 2.0, 5_000, 0.0)];
        assert!(plan_admission(0, 1_000, 1.0, &candidates).is_none());
    }

    #[test]
    fn equal_price_is_not_a_victim() {
        let candidates = vec![victim(1, 1.0, 5_000, 0.0)];
        assert!(plan_admission(0, 100, 1.0, &candidates).is_none());
    }

    #[test]
    fn pressure_relief_goes_most_killable_first() {
        let candidates = vec![
            victim(1, 1.0, 300, 3.0),
            victim(2, 1.0, 300, 0.0),
            victim(3, 2.0, 300, 0.0),
        ];
        let plan = plan_pressure_relief(400, &candidates);
        assert_eq!(plan.victims, vec![2, 3]);
        assert_eq!(plan.freed, 600);
    }

    #[test]
    fn pressure_relief_may_fall_short() {
        let candidates = vec![victim(1, 1.0, 100, 0.0)];
        let plan = plan_pressure_relief(400, &candidates);
        assert_eq!(plan.victims, vec![1]);
        assert_eq!(plan.freed, 100);
        assert!(plan_pressure_relief(0, &candidates).is_empty());
    }
}
