//! Channel names and row layouts.
//!
//! Every row is one comma-separated line ending in a newline. The first
//! column is always the load (procs generated per tick) so rows from a
//! sweep can be told apart after the fact.

use fair_core::{MachineId, Mem, PolicyKind, Proc, ProcId, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// `load, tick, proc, tier_price, latency, compute, memory`
    ProcsDone,
    /// `load, tick, proc, tier_price, compute_done, memory`
    Evictions,
    /// `load, tick, ticks_used, capacity, memory_used, memory_total, backlog`
    Usage,
    /// `load, tick, proc, machine|aggregate|rejected`
    Sched,
}

impl Channel {
    /// Unscoped channel name.
    pub fn name(self) -> &'static str {
        match self {
            Channel::ProcsDone => "procs_done",
            Channel::Evictions => "evictions",
            Channel::Usage => "usage",
            Channel::Sched => "sched",
        }
    }

    /// Channel name scoped to one policy, e.g. `edf_usage`.
    pub fn for_policy(self, policy: PolicyKind) -> String {
        format!("{}_{}", policy.label(), self.name())
    }
}

/// Where the sched channel says a proc went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedTarget {
    Machine(MachineId),
    Aggregate,
    Rejected,
}

/// Row for a finished proc.
pub fn procs_done_row(load: usize, proc: &Proc) -> String {
    format!(
        "{}, {:.2}, {}, {:.1}, {:.4}, {:.4}, {}\n",
        load,
        proc.completed_at.unwrap_or_default(),
        proc.id,
        proc.dollars(),
        proc.latency().unwrap_or_default(),
        proc.desc.compute,
        proc.desc.max_memory
    )
}

/// Row for a proc killed at `now` while holding `memory` MB.
pub fn eviction_row(load: usize, now: Tick, proc: &Proc, memory: Mem) -> String {
    format!(
        "{}, {:.2}, {}, {:.1}, {:.4}, {}\n",
        load,
        now,
        proc.id,
        proc.dollars(),
        proc.comp_done(),
        memory
    )
}

/// Per-tick utilisation row.
pub fn usage_row(
    load: usize,
    now: Tick,
    ticks_used: f64,
    capacity: f64,
    memory_used: Mem,
    memory_total: Mem,
    backlog: usize,
) -> String {
    format!(
        "{}, {:.2}, {:.4}, {:.1}, {}, {}, {}\n",
        load, now, ticks_used, capacity, memory_used, memory_total, backlog
    )
}

/// Row recording where placement sent `proc`.
pub fn sched_row(load: usize, now: Tick, proc: ProcId, target: SchedTarget) -> String {
    let target = match target {
        SchedTarget::Machine(m) => m.to_string(),
        SchedTarget::Aggregate => "aggregate".to_string(),
        SchedTarget::Rejected => "rejected".to_string(),
    };
    format!("{}, {:.2}, {}, {}\n", load, now, proc, target)
}
