//! Core-level scheduler.
//!
//! Each tick a core has one tick-unit of compute to hand out among the
//! procs resident on it. Under the proportional rule, a proc's share is
//! weighted by `R / remaining`, where `R` is the total remaining work on
//! the core, so procs near the end get more. Under the equal rule each
//! proc gets the leftover budget divided by the procs still to run.
//!
//! A tick is a sequence of rounds. A round snapshots the shares of the
//! current leftover budget and runs every resident proc once. Budget a
//! finishing proc did not need carries into the next round, until less
//! than `epsilon` is left or the core runs dry.

use std::collections::VecDeque;
use std::sync::Arc;

use fair_core::{
    CoreId, MachineId, MemoryModel, Proc, ProcId, ProcQueue, QueueOrder, SchedulerConfig, Tick,
};
use fairgrid_placement::{Victim, plan_pressure_relief};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::gauge::MemoryGauge;
use crate::protocol::{CoreLink, CoreRequest};

/// How a core divides its budget within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareRule {
    /// Inverse-remaining-work weighting.
    Proportional,
    /// Leftover divided evenly among the procs still to run.
    Equal,
}

#[derive(Debug, Clone)]
pub struct CoreSettings {
    pub epsilon: f64,
    pub low_water: usize,
    pub order: QueueOrder,
    pub share_rule: ShareRule,
    pub memory_model: MemoryModel,
}

impl CoreSettings {
    /// Core settings from the `[scheduler]` section plus the policy's rule and model.
    pub fn from_config(
        config: &SchedulerConfig,
        share_rule: ShareRule,
        memory_model: MemoryModel,
    ) -> Self {
        Self {
            epsilon: config.tick_epsilon,
            low_water: config.low_water_qlen,
            order: config.core_queue_order,
            share_rule,
            memory_model,
        }
    }
}

/// What one core did during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreTickReport {
    pub ticks_used: f64,
    pub rounds: u32,
    pub completed: usize,
    pub evicted: usize,
    /// Resident procs left out of a round because they had no work left.
    pub skipped: usize,
    /// Running mean of `deadline - completed_at` over every proc this core
    /// has finished so far; negative when procs finish late on average.
    pub sla_distance: f64,
}

pub struct CoreSched {
    id: CoreId,
    machine: MachineId,
    settings: CoreSettings,
    queue: ProcQueue,
    inbox: mpsc::UnboundedReceiver<Proc>,
    requests: mpsc::UnboundedSender<CoreRequest>,
    gauge: Arc<MemoryGauge>,
    /// Running mean of `deadline - completed_at` over finished procs.
    /// Diagnostic only.
    sla_distance: f64,
    finished: u64,
}

impl CoreSched {
    /// Creates an empty core wired to its machine through `link`.
    pub fn new(
        id: CoreId,
        machine: MachineId,
        settings: CoreSettings,
        link: CoreLink,
        gauge: Arc<MemoryGauge>,
    ) -> Self {
        let queue = ProcQueue::new(settings.order);
        Self {
            id,
            machine,
            settings,
            queue,
            inbox: link.inbox,
            requests: link.requests,
            gauge,
            sla_distance: 0.0,
            finished: 0,
        }
    }

    pub fn id(&self) -> CoreId {
        self.id
    }

    /// Number of procs in the run queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Procs in the run queue, in queue order.
    pub fn procs(&self) -> impl Iterator<Item = &Proc> {
        self.queue.iter()
    }

    /// Moves every proc pushed by the machine into the run queue.
    pub fn drain_inbox(&mut self) {
        while let Ok(proc) = self.inbox.try_recv() {
            self.queue.push(proc);
        }
    }

    /// Eviction candidates among the resident procs.
    pub fn victims(&self) -> Vec<Victim> {
        let model = self.settings.memory_model;
        self.queue
            .iter()
            .map(|p| Victim::of(p, p.footprint(model)))
            .collect()
    }

    /// Removes a resident proc without touching memory accounting.
    pub fn take(&mut self, id: ProcId) -> Option<Proc> {
        self.queue.remove(id)
    }

    /// Runs one tick starting at `now`.
    pub async fn run_tick(&mut self, now: Tick) -> CoreTickReport {
        let mut report = CoreTickReport::default();
        let mut leftover = 1.0_f64;

        while leftover > self.settings.epsilon {
            self.drain_inbox();
            if self.queue.len() < self.settings.low_water {
                self.request_work().await;
            }
            if self.queue.is_empty() {
                break;
            }

            report.rounds += 1;
            let used = self.run_round(now, leftover, &mut report);
            leftover -= used;
            if used <= 0.0 {
                break;
            }
        }

        report.sla_distance = self.sla_distance;
        trace!(
            machine = self.machine,
            core = self.id,
            used = report.ticks_used,
            rounds = report.rounds,
            sla_distance = report.sla_distance,
            "core tick finished"
        );
        report
    }

    // ── Internal helpers ───────────────────────────────────────────

    async fn request_work(&mut self) {
        let (reply, rx) = oneshot::channel();
        let request = CoreRequest::NeedWork {
            core: self.id,
            reply,
        };
        if self.requests.send(request).is_err() {
            warn!(machine = self.machine, core = self.id, "machine gone, no work to request");
            return;
        }
        match rx.await {
            Ok(Some(proc)) => {
                debug!(machine = self.machine, core = self.id, proc = proc.id, "pulled work");
                self.queue.push(proc);
            }
            Ok(None) => {}
            Err(_) => warn!(machine = self.machine, core = self.id, "work request dropped"),
        }
    }

    /// One pass over every resident proc. Returns the budget consumed.
    fn run_round(&mut self, now: Tick, budget: f64, report: &mut CoreTickReport) -> f64 {
        let procs: Vec<Proc> = self.queue.drain().collect();
        let shares = match self.settings.share_rule {
            ShareRule::Proportional => self.proportional_shares(&procs, budget, report),
            ShareRule::Equal => vec![0.0; procs.len()],
        };
        let mut batch: VecDeque<(Proc, f64)> = procs.into_iter().zip(shares).collect();
        let mut survivors: Vec<Proc> = Vec::with_capacity(batch.len());
        let model = self.settings.memory_model;
        let mut used_round = 0.0;

        while let Some((mut proc, share)) = batch.pop_front() {
            let share = match self.settings.share_rule {
                ShareRule::Proportional => share,
                ShareRule::Equal => (budget - used_round) / (batch.len() + 1) as f64,
            };
            if share <= 0.0 {
                survivors.push(proc);
                continue;
            }

            let charged = proc.footprint(model);
            let (used, done) = proc.run_till_out_or_done(share);
            used_round += used;
            report.ticks_used += used;

            if done {
                proc.completed_at = Some(now + report.ticks_used);
                self.gauge.release(charged);
                self.note_completion(&proc);
                report.completed += 1;
                self.send(CoreRequest::Done {
                    core: self.id,
                    proc,
                });
                continue;
            }

            self.gauge.charge(proc.footprint(model).saturating_sub(charged));
            survivors.push(proc);
            if self.gauge.is_over() {
                report.evicted += self.relieve_pressure(now, &mut survivors, &mut batch);
            }
        }

        for proc in survivors {
            self.queue.push(proc);
        }
        used_round
    }

    fn proportional_shares(
        &self,
        procs: &[Proc],
        budget: f64,
        report: &mut CoreTickReport,
    ) -> Vec<f64> {
        let total: f64 = procs.iter().map(Proc::remaining).filter(|r| *r > 0.0).sum();
        let weights: Vec<f64> = procs
            .iter()
            .map(|p| {
                let remaining = p.remaining();
                debug_assert!(remaining > 0.0, "resident proc {} has no work left", p.id);
                if remaining <= 0.0 {
                    error!(
                        machine = self.machine,
                        core = self.id,
                        proc = p.id,
                        remaining,
                        "resident proc has no remaining work, skipping this round"
                    );
                    report.skipped += 1;
                    return 0.0;
                }
                total / remaining
            })
            .collect();

        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return vec![0.0; procs.len()];
        }
        weights.iter().map(|w| w / sum * budget).collect()
    }

    /// Evicts the most killable procs of this round until the machine is
    /// back within capacity or this core has nothing left to give up.
    fn relieve_pressure(
        &mut self,
        now: Tick,
        survivors: &mut Vec<Proc>,
        batch: &mut VecDeque<(Proc, f64)>,
    ) -> usize {
        let model = self.settings.memory_model;
        let candidates: Vec<Victim> = survivors
            .iter()
            .chain(batch.iter().map(|(p, _)| p))
            .map(|p| Victim::of(p, p.footprint(model)))
            .collect();
        let plan = plan_pressure_relief(self.gauge.excess(), &candidates);

        let mut evicted = 0;
        for id in plan.victims {
            let proc = match survivors.iter().position(|p| p.id == id) {
                Some(i) => survivors.remove(i),
                None => match batch.iter().position(|(p, _)| p.id == id) {
                    Some(i) => match batch.remove(i) {
                        Some((p, _)) => p,
                        None => continue,
                    },
                    None => continue,
                },
            };
            self.gauge.release(proc.footprint(model));
            debug!(
                machine = self.machine,
                core = self.id,
                proc = proc.id,
                tick = now,
                "evicted under memory pressure"
            );
            self.send(CoreRequest::Evicted {
                core: self.id,
                proc,
            });
            evicted += 1;
        }
        evicted
    }

    fn note_completion(&mut self, proc: &Proc) {
        let distance = proc.completed_at.map_or(0.0, |t| proc.deadline - t);
        self.finished += 1;
        self.sla_distance += (distance - self.sla_distance) / self.finished as f64;
    }

    fn send(&self, request: CoreRequest) {
        if self.requests.send(request).is_err() {
            warn!(machine = self.machine, core = self.id, "machine gone, dropping report");
        }
    }
}
