//! Idle-heap placement with a power-of-k fallback.
//!
//! The fleet is served by several global schedulers. Each one owns a
//! multi-queue of waiting procs and one shard of the idle-machine
//! directory; new procs are dealt to schedulers in turn. A scheduler
//! first claims capacity from the cheapest idle machine in its shard. If
//! none has room, it samples `k` machines from the whole fleet and picks
//! the one where admission destroys the least value, giving up when even
//! that costs more than the waste threshold.
//!
//! Machines publish their own idle status after every tick, so the
//! directory is eventually consistent with the fleet.

use std::sync::Arc;

use async_trait::async_trait;
use fair_core::{MemoryModel, MultiQueue, PlacementConfig, PolicyKind, Proc, SimConfig, Tick};
use fairgrid_metrics::SchedTarget;
use fairgrid_placement::{IdleDirectory, power_of_k};
use rand::rngs::StdRng;
use tracing::debug;

use super::{
    PlacementPolicy, PlacementReport, TickOutcome, audit_machines, fold_machine_report,
    machine_usage,
};
use crate::core_sched::{CoreSettings, ShareRule};
use crate::error::{SchedulerError, SchedulerResult};
use crate::load_balancer::RoundRobinBalancer;
use crate::machine::{Dispatch, Machine, MachineSettings};

/// Where a placement attempt ended up.
enum Placed {
    Directory(usize),
    Sampled(usize, Vec<Proc>),
}

pub struct IdleHeapPolicy {
    machines: Vec<Machine>,
    /// One waiting queue per global scheduler.
    queues: Vec<MultiQueue>,
    directories: Vec<Arc<IdleDirectory>>,
    admission: RoundRobinBalancer,
    placement: PlacementConfig,
}

impl IdleHeapPolicy {
    /// Builds the fleet plus one scheduler and directory shard per `world.shards`.
    pub fn new(config: &SimConfig) -> Self {
        let core = CoreSettings::from_config(
            &config.scheduler,
            ShareRule::Proportional,
            MemoryModel::Live,
        );
        let settings = MachineSettings {
            cores: config.world.cores_per_machine,
            memory: config.world.memory_per_machine,
            dispatch: Dispatch::Pull,
            core,
        };
        let machines = (0..config.world.machines)
            .map(|id| Machine::new(id, settings.clone()))
            .collect();
        let shards = config.world.shards.max(1);

        Self {
            machines,
            queues: (0..shards).map(|_| MultiQueue::new()).collect(),
            directories: (0..shards).map(|s| Arc::new(IdleDirectory::new(s))).collect(),
            admission: RoundRobinBalancer::new(),
            placement: config.placement.clone(),
        }
    }

    /// Every machine of the fleet, by id.
    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    /// Directory shards, indexed by shard number.
    pub fn directories(&self) -> &[Arc<IdleDirectory>] {
        &self.directories
    }

    fn place_one(&mut self, shard: usize, proc: &Proc, rng: &mut StdRng) -> Option<Placed> {
        let need = proc.footprint(MemoryModel::Live);
        let headroom = proc.desc.max_memory;
        let price = proc.dollars();

        if let Some(machine) = self.directories[shard].claim(
            headroom,
            need,
            price,
            self.placement.idle_memory_threshold,
        ) {
            return Some(Placed::Directory(machine));
        }

        let machines = &self.machines;
        let (machine, cost) = power_of_k(rng, machines.len(), self.placement.k_choices_down, |i| {
            machines[i].admission_plan(need, price).map(|plan| plan.cost)
        })?;
        if cost > self.placement.waste_threshold {
            debug!(proc = proc.id, machine, cost, "cheapest eviction too wasteful");
            return None;
        }

        let plan = self.machines[machine].admission_plan(need, price)?;
        let evicted = self.machines[machine].evict(&plan);
        Some(Placed::Sampled(machine, evicted))
    }
}

#[async_trait]
impl PlacementPolicy for IdleHeapPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::IdleHeap
    }

    fn enqueue(&mut self, proc: Proc) {
        let shard = self.admission.next(self.queues.len()).unwrap_or(0);
        self.queues[shard].enqueue(proc);
    }

    fn place(&mut self, now: Tick, rng: &mut StdRng) -> PlacementReport {
        let mut report = PlacementReport::default();

        for shard in 0..self.queues.len() {
            let mut queue = std::mem::take(&mut self.queues[shard]);
            let mut retry = Vec::new();

            while let Some(proc) = queue.dequeue(now) {
                match self.place_one(shard, &proc, rng) {
                    Some(Placed::Directory(machine)) => {
                        report.placed.push((proc.id, SchedTarget::Machine(machine)));
                        self.machines[machine].admit(proc, now);
                    }
                    Some(Placed::Sampled(machine, evicted)) => {
                        report.placed.push((proc.id, SchedTarget::Machine(machine)));
                        report.evicted.extend(evicted);
                        self.machines[machine].admit(proc, now);
                        self.machines[machine].refresh_idle(
                            &self.directories,
                            &self.placement,
                            rng,
                        );
                    }
                    None => {
                        report.rejected.push(proc.id);
                        retry.push(proc);
                    }
                }
            }

            for proc in retry {
                queue.enqueue(proc);
            }
            self.queues[shard] = queue;
        }

        debug!(
            placed = report.placed.len(),
            rejected = report.rejected.len(),
            evicted = report.evicted.len(),
            "idle-heap placement done"
        );
        report
    }

    async fn execute(&mut self, now: Tick, rng: &mut StdRng) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        for machine in &mut self.machines {
            let report = machine.run_tick(now).await;
            fold_machine_report(&mut outcome, report);
            machine.refresh_idle(&self.directories, &self.placement, rng);
        }
        machine_usage(&mut outcome, &self.machines);
        outcome
    }

    fn backlog(&self) -> usize {
        self.queues.iter().map(MultiQueue::len).sum()
    }

    fn audit(&self) -> SchedulerResult<()> {
        audit_machines(self.kind(), &self.machines)?;
        for directory in &self.directories {
            for record in directory.snapshot() {
                let Some(machine) = self.machines.get(record.machine) else {
                    return Err(SchedulerError::invariant(
                        self.kind(),
                        format!(
                            "directory {} lists unknown machine {}",
                            directory.shard(),
                            record.machine
                        ),
                    ));
                };
                if record.available != machine.free_memory() {
                    return Err(SchedulerError::invariant(
                        self.kind(),
                        format!(
                            "directory {} says machine {} has {} MB free, it has {} MB",
                            directory.shard(),
                            record.machine,
                            record.available,
                            machine.free_memory()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}
