//! fairsim.toml configuration parser.

use std::path::{Path, PathBuf};

use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::queue::QueueOrder;
use crate::types::{Mem, PolicyKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub world: WorldConfig,
    pub scheduler: SchedulerConfig,
    pub placement: PlacementConfig,
    pub workload: WorkloadConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub machines: usize,
    pub cores_per_machine: usize,
    pub memory_per_machine: Mem,
    pub procs_per_tick: usize,
    /// Independent shards for the sharded policy; also the number of
    /// global schedulers (and directory shards) of the idle-heap policy.
    pub shards: usize,
    pub seed: u64,
    pub ticks: u64,
    pub policies: Vec<PolicyKind>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            machines: 10,
            cores_per_machine: 4,
            memory_per_machine: 32_000,
            procs_per_tick: 10,
            shards: 2,
            seed: 42,
            ticks: 200,
            policies: PolicyKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// A core stops handing out budget once less than this is left.
    pub tick_epsilon: f64,
    /// A core asks for more work while it holds fewer procs than this.
    pub low_water_qlen: usize,
    pub core_queue_order: QueueOrder,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_epsilon: 1e-5,
            low_water_qlen: 1,
            core_queue_order: QueueOrder::Fifo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Machines sampled when the idle directory has nothing suitable.
    pub k_choices_down: usize,
    /// Directory shards sampled by a machine picking its home shard.
    pub k_choices_up: usize,
    /// Records with less free memory than this leave the directory.
    pub idle_memory_threshold: Mem,
    /// Machines holding more procs than this are not idle.
    pub idle_qlen_threshold: usize,
    /// Placement gives up rather than destroy more value than this.
    pub waste_threshold: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            k_choices_down: 3,
            k_choices_up: 2,
            idle_memory_threshold: 100,
            idle_qlen_threshold: 5,
            waste_threshold: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub min_compute: f64,
    pub mean_compute: f64,
    pub compute_std_dev: f64,
    pub max_compute: f64,
    pub pareto_alpha: f64,
    /// Relative spread of `compute_guess` around the true compute.
    pub estimate_std_dev: f64,
    pub initial_memory: Mem,
    pub max_memory: Mem,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            min_compute: 0.2,
            mean_compute: 2.0,
            compute_std_dev: 5.0,
            max_compute: 100.0,
            pareto_alpha: 25.0,
            estimate_std_dev: 0.2,
            initial_memory: 100,
            max_memory: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// When set, every channel is appended to `<results_dir>/<channel>.txt`.
    pub results_dir: Option<PathBuf>,
}

impl SimConfig {
    /// Reads and validates a TOML config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SimConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the config as pretty TOML.
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Rejects configurations no policy can run on.
    pub fn validate(&self) -> anyhow::Result<()> {
        let w = &self.world;
        ensure!(w.machines > 0, "world.machines must be at least 1");
        ensure!(w.cores_per_machine > 0, "world.cores_per_machine must be at least 1");
        ensure!(w.memory_per_machine > 0, "world.memory_per_machine must be positive");
        ensure!(w.shards > 0, "world.shards must be at least 1");
        ensure!(
            w.shards <= w.machines,
            "world.shards ({}) cannot exceed world.machines ({})",
            w.shards,
            w.machines
        );
        ensure!(!w.policies.is_empty(), "world.policies must name at least one policy");

        let s = &self.scheduler;
        ensure!(
            s.tick_epsilon > 0.0 && s.tick_epsilon < 1.0,
            "scheduler.tick_epsilon must be in (0, 1)"
        );

        let p = &self.placement;
        ensure!(p.k_choices_down > 0, "placement.k_choices_down must be at least 1");
        ensure!(p.k_choices_up > 0, "placement.k_choices_up must be at least 1");
        ensure!(p.waste_threshold >= 0.0, "placement.waste_threshold must be non-negative");

        let wl = &self.workload;
        ensure!(wl.min_compute > 0.0, "workload.min_compute must be positive");
        ensure!(
            wl.max_compute >= wl.min_compute,
            "workload.max_compute must be at least workload.min_compute"
        );
        ensure!(wl.compute_std_dev >= 0.0, "workload.compute_std_dev must be non-negative");
        ensure!(wl.pareto_alpha > 0.0, "workload.pareto_alpha must be positive");
        ensure!(wl.estimate_std_dev >= 0.0, "workload.estimate_std_dev must be non-negative");
        ensure!(
            wl.initial_memory <= wl.max_memory,
            "workload.initial_memory must not exceed workload.max_memory"
        );
        ensure!(
            wl.max_memory <= w.memory_per_machine,
            "workload.max_memory ({}) must fit on one machine ({})",
            wl.max_memory,
            w.memory_per_machine
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SimConfig::default();
        config.validate().unwrap();
        assert_eq!(config.world.policies.len(), 4);
        assert_eq!(config.placement.k_choices_down, 3);
    }

    #[test]
    fn test_parse_partial() {
        let toml_str = r#"
[world]
machines = 4
shards = 4
policies = ["edf", "ideal"]

[scheduler]
core_queue_order = "deadline"
"#;
        let config: SimConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.world.machines, 4);
        assert_eq!(config.world.cores_per_machine, 4);
        assert_eq!(config.world.policies, vec![PolicyKind::Edf, PolicyKind::Ideal]);
        assert_eq!(config.scheduler.core_queue_order, QueueOrder::Deadline);
        assert_eq!(config.workload.max_memory, 10_000);
        config.validate().unwrap();
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = SimConfig::default();
        config.metrics.results_dir = Some(PathBuf::from("results"));
        let text = config.to_toml_string().unwrap();
        let parsed: SimConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_more_shards_than_machines() {
        let mut config = SimConfig::default();
        config.world.shards = 11;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("shards"));
    }

    #[test]
    fn test_rejects_oversized_procs() {
        let mut config = SimConfig::default();
        config.workload.max_memory = 64_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fairsim.toml");
        std::fs::write(&path, "[world]\nseed = 7\n").unwrap();
        let config = SimConfig::from_file(&path).unwrap();
        assert_eq!(config.world.seed, 7);

        std::fs::write(&path, "[world]\nmachines = 0\n").unwrap();
        assert!(SimConfig::from_file(&path).is_err());
    }
}
