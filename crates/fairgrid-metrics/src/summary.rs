//! Per-policy run summaries.

use fair_core::{Mem, N_PRIORITIES, PolicyKind, PriceTier, Proc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
struct TierTally {
    completed: u64,
    evicted: u64,
    latency_sum: f64,
    slowdown_sum: f64,
    missed_deadlines: u64,
}

/// Accumulates one policy's outcomes over a run.
#[derive(Debug, Clone)]
pub struct SummaryCollector {
    policy: PolicyKind,
    load: usize,
    tiers: Vec<TierTally>,
    rejections: u64,
    ticks: u64,
    ticks_used: f64,
    capacity: f64,
    memory_used: f64,
    memory_total: f64,
    backlog: usize,
}

impl SummaryCollector {
    /// Starts an empty tally for `policy` at `load` procs per tick.
    pub fn new(policy: PolicyKind, load: usize) -> Self {
        Self {
            policy,
            load,
            tiers: vec![TierTally::default(); N_PRIORITIES],
            rejections: 0,
            ticks: 0,
            ticks_used: 0.0,
            capacity: 0.0,
            memory_used: 0.0,
            memory_total: 0.0,
            backlog: 0,
        }
    }

    /// Counts a finished proc against its tier.
    pub fn record_completion(&mut self, proc: &Proc) {
        let tally = &mut self.tiers[proc.tier().index()];
        tally.completed += 1;
        tally.latency_sum += proc.latency().unwrap_or_default();
        tally.slowdown_sum += proc.slowdown().unwrap_or_default();
        if proc.completed_at.is_some_and(|t| t > proc.deadline) {
            tally.missed_deadlines += 1;
        }
    }

    pub fn record_eviction(&mut self, proc: &Proc) {
        self.tiers[proc.tier().index()].evicted += 1;
    }

    /// Adds placement rejections from one tick.
    pub fn record_rejections(&mut self, count: usize) {
        self.rejections += count as u64;
    }

    /// Adds one tick of utilisation figures.
    pub fn record_usage(
        &mut self,
        ticks_used: f64,
        capacity: f64,
        memory_used: Mem,
        memory_total: Mem,
        backlog: usize,
    ) {
        self.ticks += 1;
        self.ticks_used += ticks_used;
        self.capacity += capacity;
        self.memory_used += memory_used as f64;
        self.memory_total += memory_total as f64;
        self.backlog = backlog;
    }

    /// Condenses everything recorded so far.
    pub fn summary(&self) -> PolicySummary {
        let tiers: Vec<TierSummary> = PriceTier::all()
            .map(|tier| {
                let t = &self.tiers[tier.index()];
                TierSummary {
                    tier_price: tier.dollars(),
                    completed: t.completed,
                    evicted: t.evicted,
                    mean_latency: mean(t.latency_sum, t.completed),
                    mean_slowdown: mean(t.slowdown_sum, t.completed),
                    missed_deadlines: t.missed_deadlines,
                }
            })
            .collect();

        PolicySummary {
            policy: self.policy,
            load: self.load,
            ticks: self.ticks,
            completed: tiers.iter().map(|t| t.completed).sum(),
            evicted: tiers.iter().map(|t| t.evicted).sum(),
            rejections: self.rejections,
            backlog: self.backlog,
            compute_utilisation: ratio(self.ticks_used, self.capacity),
            memory_utilisation: ratio(self.memory_used, self.memory_total),
            tiers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSummary {
    pub tier_price: f64,
    pub completed: u64,
    pub evicted: u64,
    pub mean_latency: f64,
    pub mean_slowdown: f64,
    pub missed_deadlines: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySummary {
    pub policy: PolicyKind,
    pub load: usize,
    pub ticks: u64,
    pub completed: u64,
    pub evicted: u64,
    pub rejections: u64,
    /// Procs still waiting for placement at the end of the run.
    pub backlog: usize,
    pub compute_utilisation: f64,
    pub memory_utilisation: f64,
    pub tiers: Vec<TierSummary>,
}

/// Renders summaries as a plain-text report, one block per policy.
pub fn render_text(summaries: &[PolicySummary]) -> String {
    let mut out = String::new();
    for s in summaries {
        out.push_str(&format!(
            "{} (load {}, {} ticks): completed {}, evicted {}, rejected {}, backlog {}\n",
            s.policy, s.load, s.ticks, s.completed, s.evicted, s.rejections, s.backlog
        ));
        out.push_str(&format!(
            "  utilisation: compute {:.1}%, memory {:.1}%\n",
            s.compute_utilisation * 100.0,
            s.memory_utilisation * 100.0
        ));
        out.push_str("  tier   done  evicted  late  mean_latency  mean_slowdown\n");
        for t in &s.tiers {
            out.push_str(&format!(
                "  {:<5.1} {:>5} {:>8} {:>5} {:>13.3} {:>14.3}\n",
                t.tier_price,
                t.completed,
                t.evicted,
                t.missed_deadlines,
                t.mean_latency,
                t.mean_slowdown
            ));
        }
    }
    out
}

/// Renders summaries as a pretty JSON array.
pub fn render_json(summaries: &[PolicySummary]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(summaries)?)
}

fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den <= 0.0 { 0.0 } else { num / den }
}
