//! A machine: a memory budget shared by a set of cores.
//!
//! Procs placed on a machine either wait in its pending queue until a
//! core asks for work (`Dispatch::Pull`) or are dealt to the cores in turn
//! (`Dispatch::Push`). A pushed proc goes through the core's inbox and is
//! drained into its run queue right away, so it is accounted, evictable
//! and visible to audits from the moment it is admitted. During a tick the machine drives
//! its cores one at a time, in core-id order, serving their requests
//! while each one runs, so every run of the simulator is reproducible.

use std::sync::Arc;

use fair_core::{
    MachineId, Mem, MemoryModel, PlacementConfig, Proc, ProcId, ProcQueue, Tick,
};
use fairgrid_placement::{
    EvictionPlan, IdleDirectory, IdleRecord, Victim, plan_admission, plan_pressure_relief,
    power_of_k,
};
use rand::Rng;
use tracing::{debug, warn};

use crate::core_sched::{CoreSched, CoreSettings, CoreTickReport};
use crate::gauge::MemoryGauge;
use crate::load_balancer::RoundRobinBalancer;
use crate::protocol::{self, CoreRequest};

/// How placed procs reach the cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Held on the machine until a core asks.
    Pull,
    /// Dealt round-robin into core inboxes.
    Push,
}

#[derive(Debug, Clone)]
pub struct MachineSettings {
    pub cores: usize,
    pub memory: Mem,
    pub dispatch: Dispatch,
    pub core: CoreSettings,
}

/// What one machine did during one tick.
#[derive(Debug, Default)]
pub struct MachineTickReport {
    pub completed: Vec<Proc>,
    pub evicted: Vec<Proc>,
    pub ticks_used: f64,
    /// Largest budget consumed by a single core.
    pub max_core_ticks: f64,
    pub skipped: usize,
}

impl MachineTickReport {
    fn absorb(&mut self, core: &CoreTickReport) {
        self.ticks_used += core.ticks_used;
        self.max_core_ticks = self.max_core_ticks.max(core.ticks_used);
        self.skipped += core.skipped;
    }
}

pub struct Machine {
    id: MachineId,
    model: MemoryModel,
    dispatch: Dispatch,
    cores: Vec<CoreSched>,
    pushes: Vec<tokio::sync::mpsc::UnboundedSender<Proc>>,
    requests: tokio::sync::mpsc::UnboundedReceiver<CoreRequest>,
    pending: ProcQueue,
    gauge: Arc<MemoryGauge>,
    /// Procs handed to cores and not yet reported done or evicted.
    on_cores: usize,
    deal: RoundRobinBalancer,
    home_shard: Option<usize>,
}

impl Machine {
    /// Builds a machine with `settings.cores` idle cores and an empty gauge.
    pub fn new(id: MachineId, settings: MachineSettings) -> Self {
        let gauge = Arc::new(MemoryGauge::new(settings.memory));
        let (link, core_links) = protocol::wire(settings.cores);
        let cores = core_links
            .into_iter()
            .enumerate()
            .map(|(core_id, core_link)| {
                CoreSched::new(
                    core_id,
                    id,
                    settings.core.clone(),
                    core_link,
                    Arc::clone(&gauge),
                )
            })
            .collect();

        Self {
            id,
            model: settings.core.memory_model,
            dispatch: settings.dispatch,
            cores,
            pushes: link.pushes,
            requests: link.requests,
            pending: ProcQueue::new(settings.core.order),
            gauge,
            on_cores: 0,
            deal: RoundRobinBalancer::new(),
            home_shard: None,
        }
    }

    /// Machine id, unique within a policy.
    pub fn id(&self) -> MachineId {
        self.id
    }

    /// Total memory in MB.
    pub fn capacity(&self) -> Mem {
        self.gauge.capacity()
    }

    /// Memory currently charged against the gauge.
    pub fn memory_used(&self) -> Mem {
        self.gauge.used()
    }

    /// Memory not yet charged.
    pub fn free_memory(&self) -> Mem {
        self.gauge.free()
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Directory shard this machine publishes to, once it has joined one.
    pub fn home_shard(&self) -> Option<usize> {
        self.home_shard
    }

    /// Procs placed here that have neither finished nor been evicted.
    pub fn resident(&self) -> usize {
        self.pending.len() + self.on_cores
    }

    /// Memory a proc is charged on this machine at admission.
    pub fn admission_footprint(&self, proc: &Proc) -> Mem {
        proc.footprint(self.model)
    }

    /// Sum of the footprints of every proc the machine can see.
    pub fn accounted_memory(&self) -> Mem {
        self.procs().map(|p| p.footprint(self.model)).sum()
    }

    /// Highest price paid by any proc on the machine.
    pub fn highest_price(&self) -> f64 {
        self.procs().map(Proc::dollars).fold(0.0, f64::max)
    }

    /// Places `proc` here and charges its footprint.
    pub fn admit(&mut self, mut proc: Proc, now: Tick) {
        self.gauge.charge(proc.footprint(self.model));
        proc.placed_at = Some(now);
        match self.dispatch {
            Dispatch::Pull => self.pending.push(proc),
            Dispatch::Push => {
                let core = self.deal.next(self.pushes.len()).unwrap_or(0);
                match self.pushes[core].send(proc) {
                    Ok(()) => {
                        self.cores[core].drain_inbox();
                        self.on_cores += 1;
                    }
                    Err(e) => {
                        warn!(machine = self.id, core, "core inbox closed, holding proc");
                        self.pending.push(e.0);
                    }
                }
            }
        }
    }

    /// What it would take to fit a proc of `price` that needs `need` MB.
    pub fn admission_plan(&self, need: Mem, price: f64) -> Option<EvictionPlan> {
        plan_admission(self.gauge.free(), need, price, &self.victims())
    }

    /// Removes the procs named by `plan`, releasing their memory.
    pub fn evict(&mut self, plan: &EvictionPlan) -> Vec<Proc> {
        let mut evicted = Vec::with_capacity(plan.victims.len());
        for &id in &plan.victims {
            if let Some(proc) = self.take(id) {
                self.gauge.release(proc.footprint(self.model));
                evicted.push(proc);
            }
        }
        evicted
    }

    /// Runs every core for one tick, then resolves any memory overflow.
    pub async fn run_tick(&mut self, now: Tick) -> MachineTickReport {
        let mut report = MachineTickReport::default();
        let Machine {
            cores,
            requests,
            pending,
            on_cores,
            id,
            ..
        } = &mut *self;

        for core in cores.iter_mut() {
            let run = core.run_tick(now);
            tokio::pin!(run);
            let core_report = loop {
                tokio::select! {
                    biased;
                    r = &mut run => break r,
                    Some(req) = requests.recv() => serve(*id, req, pending, on_cores, &mut report),
                }
            };
            while let Ok(req) = requests.try_recv() {
                serve(*id, req, pending, on_cores, &mut report);
            }
            report.absorb(&core_report);
        }

        if self.gauge.is_over() {
            let plan = plan_pressure_relief(self.gauge.excess(), &self.victims());
            let evicted = self.evict(&plan);
            debug!(
                machine = self.id,
                evicted = evicted.len(),
                tick = now,
                "machine-wide eviction"
            );
            report.evicted.extend(evicted);
        }
        report
    }

    /// Re-evaluates this machine's idle status and publishes it to its home
    /// directory shard, joining one (power-of-k on directory size) the
    /// first time.
    pub fn refresh_idle<R: Rng + ?Sized>(
        &mut self,
        directories: &[Arc<IdleDirectory>],
        placement: &PlacementConfig,
        rng: &mut R,
    ) {
        if directories.is_empty() {
            return;
        }
        let home = match self.home_shard {
            Some(home) => home,
            None => {
                let home = power_of_k(rng, directories.len(), placement.k_choices_up, |i| {
                    Some(directories[i].len())
                })
                .map_or(0, |(i, _)| i);
                debug!(machine = self.id, shard = home, "joined directory shard");
                self.home_shard = Some(home);
                home
            }
        };

        let directory = &directories[home];
        let qlen = self.resident();
        let free = self.gauge.free();
        if qlen <= placement.idle_qlen_threshold && free > placement.idle_memory_threshold {
            directory.upsert(IdleRecord {
                machine: self.id,
                available: free,
                highest_cost: self.highest_price(),
                qlen,
            });
        } else {
            directory.remove(self.id);
        }
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn procs(&self) -> impl Iterator<Item = &Proc> {
        self.pending
            .iter()
            .chain(self.cores.iter().flat_map(CoreSched::procs))
    }

    fn victims(&self) -> Vec<Victim> {
        let mut victims: Vec<Victim> = self
            .pending
            .iter()
            .map(|p| Victim::of(p, p.footprint(self.model)))
            .collect();
        for core in &self.cores {
            victims.extend(core.victims());
        }
        victims
    }

    fn take(&mut self, id: ProcId) -> Option<Proc> {
        if let Some(proc) = self.pending.remove(id) {
            return Some(proc);
        }
        let proc = self.cores.iter_mut().find_map(|c| c.take(id))?;
        self.on_cores = self.on_cores.saturating_sub(1);
        Some(proc)
    }
}

fn serve(
    machine: MachineId,
    request: CoreRequest,
    pending: &mut ProcQueue,
    on_cores: &mut usize,
    report: &mut MachineTickReport,
) {
    match request {
        CoreRequest::NeedWork { core, reply } => {
            let next = pending.pop_front();
            let handed = next.is_some();
            if reply.send(next).is_err() {
                warn!(machine, core, "core stopped waiting for work");
                return;
            }
            if handed {
                *on_cores += 1;
            }
        }
        CoreRequest::Done { proc, .. } => {
            *on_cores = on_cores.saturating_sub(1);
            report.completed.push(proc);
        }
        CoreRequest::Evicted { proc, .. } => {
            *on_cores = on_cores.saturating_sub(1);
            report.evicted.push(proc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sched::ShareRule;
    use fair_core::{PriceTier, QueueOrder, TaskDescriptor};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn core_settings(rule: ShareRule, model: MemoryModel) -> CoreSettings {
        CoreSettings {
            epsilon: 1e-5,
            low_water: 1,
            order: QueueOrder::Fifo,
            share_rule: rule,
            memory_model: model,
        }
    }

    fn machine(dispatch: Dispatch, cores: usize, memory: Mem, model: MemoryModel) -> Machine {
        Machine::new(
            3,
            MachineSettings {
                cores,
                memory,
                dispatch,
                core: core_settings(ShareRule::Proportional, model),
            },
        )
    }

    fn proc(id: ProcId, compute: f64, tier: usize, initial: Mem, max: Mem) -> Proc {
        let desc = TaskDescriptor {
            compute,
            compute_guess: compute,
            tier: PriceTier::new(tier).unwrap(),
            initial_memory: initial,
            max_memory: max,
        };
        Proc::new(id, desc, 0.0)
    }

    #[tokio::test]
    async fn pull_machine_feeds_idle_cores() {
        let mut m = machine(Dispatch::Pull, 2, 10_000, MemoryModel::Live);
        m.admit(proc(1, 0.5, 2, 100, 100), 0.0);
        m.admit(proc(2, 3.0, 2, 100, 100), 0.0);
        m.admit(proc(3, 3.0, 2, 100, 100), 0.0);
        assert_eq!(m.resident(), 3);
        assert_eq!(m.memory_used(), 300);

        let report = m.run_tick(0.0).await;
        // Core 0 finishes proc 1, then pulls proc 2; core 1 pulls proc 3.
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].id, 1);
        assert!((report.ticks_used - 2.0).abs() < 1e-9);
        assert_eq!(m.resident(), 2);
        assert_eq!(m.memory_used(), 200);
        assert_eq!(m.accounted_memory(), m.memory_used());
    }

    #[tokio::test]
    async fn push_machine_deals_across_cores() {
        let mut m = machine(Dispatch::Push, 2, 10_000, MemoryModel::Reserved);
        for id in 0..4 {
            m.admit(proc(id, 10.0, 1, 100, 500), 0.0);
        }
        assert_eq!(m.memory_used(), 2_000);
        assert_eq!(m.accounted_memory(), 2_000);
        let report = m.run_tick(0.0).await;
        assert!((report.ticks_used - 2.0).abs() < 1e-9);
        assert!((report.max_core_ticks - 1.0).abs() < 1e-9);
        assert_eq!(m.resident(), 4);
        assert_eq!(m.accounted_memory(), 2_000);
    }

    #[tokio::test]
    async fn overflow_is_resolved_by_end_of_tick() {
        let mut m = machine(Dispatch::Pull, 2, 1_400, MemoryModel::Live);
        m.admit(proc(1, 2.0, 4, 100, 1_400), 0.0);
        m.admit(proc(2, 2.0, 0, 100, 1_400), 0.0);
        let report = m.run_tick(0.0).await;
        assert!(m.memory_used() <= m.capacity());
        assert_eq!(m.accounted_memory(), m.memory_used());
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.evicted[0].id, 2);
    }

    #[test]
    fn admission_plan_prefers_cheap_victims() {
        let mut m = machine(Dispatch::Pull, 1, 1_000, MemoryModel::Reserved);
        m.admit(proc(1, 1.0, 0, 400, 400), 0.0);
        m.admit(proc(2, 1.0, 3, 400, 400), 0.0);

        let plan = m.admission_plan(500, PriceTier::HIGHEST.dollars()).unwrap();
        assert_eq!(plan.victims, vec![1]);
        assert!(m.admission_plan(500, PriceTier::LOWEST.dollars()).is_none());

        let evicted = m.evict(&plan);
        assert_eq!(evicted.len(), 1);
        assert_eq!(m.free_memory(), 600);
        assert_eq!(m.resident(), 1);
    }

    #[tokio::test]
    async fn pushed_procs_are_evictable_before_they_run() {
        let mut m = machine(Dispatch::Push, 2, 1_000, MemoryModel::Reserved);
        m.admit(proc(1, 1.0, 0, 400, 400), 0.0);
        m.admit(proc(2, 1.0, 0, 400, 400), 0.0);
        assert_eq!(m.accounted_memory(), m.memory_used());
        assert_eq!(m.highest_price(), PriceTier::LOWEST.dollars());

        let plan = m.admission_plan(500, PriceTier::HIGHEST.dollars()).unwrap();
        assert_eq!(plan.victims.len(), 1);
        let evicted = m.evict(&plan);
        assert_eq!(evicted.len(), 1);
        assert_eq!(m.resident(), 1);
        assert_eq!(m.memory_used(), 400);
        assert_eq!(m.accounted_memory(), 400);

        let report = m.run_tick(0.0).await;
        assert_eq!(report.completed.len(), 1);
        assert_eq!(m.resident(), 0);
        assert_eq!(m.memory_used(), 0);
    }

    #[test]
    fn idle_status_follows_load() {
        let dirs = vec![Arc::new(IdleDirectory::new(0)), Arc::new(IdleDirectory::new(1))];
        let placement = PlacementConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut m = machine(Dispatch::Pull, 1, 1_000, MemoryModel::Live);

        m.refresh_idle(&dirs, &placement, &mut rng);
        let home = m.home_shard().unwrap();
        let record = dirs[home].get(3).unwrap();
        assert_eq!(record.available, 1_000);
        assert_eq!(record.qlen, 0);

        for id in 0..6 {
            m.admit(proc(id, 1.0, 1, 10, 10), 0.0);
        }
        m.refresh_idle(&dirs, &placement, &mut rng);
        assert!(dirs[home].get(3).is_none());
        assert_eq!(m.home_shard(), Some(home));
    }
}
