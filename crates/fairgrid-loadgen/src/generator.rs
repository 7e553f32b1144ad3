use std::collections::VecDeque;

use anyhow::anyhow;
use fair_core::{Mem, N_PRIORITIES, PriceTier, TaskDescriptor, WorkloadConfig};
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Pareto};
use tracing::debug;

/// Source of task descriptors.
pub trait Workload: Send {
    /// Produces `count` descriptors, drawing randomness only from `rng`.
    fn generate(&mut self, count: usize, rng: &mut StdRng) -> Vec<TaskDescriptor>;
}

/// Heavy-tailed compute, uniform price tier, uniform memory ceiling.
///
/// Each proc draws a base compute from a clamped normal, then stretches
/// it with a pareto tail whose scale is that base.
#[derive(Debug, Clone)]
pub struct TieredPareto {
    base: Normal<f64>,
    estimate_noise: Normal<f64>,
    alpha: f64,
    min_compute: f64,
    max_compute: f64,
    initial_memory: Mem,
    max_memory: Mem,
}

impl TieredPareto {
    /// Builds the generator, rejecting parameters its distributions cannot take.
    pub fn new(config: &WorkloadConfig) -> anyhow::Result<Self> {
        let base = Normal::new(config.mean_compute, config.compute_std_dev)
            .map_err(|e| anyhow!("invalid compute distribution: {e}"))?;
        let estimate_noise = Normal::new(0.0, config.estimate_std_dev)
            .map_err(|e| anyhow!("invalid estimate distribution: {e}"))?;
        // The tail is rebuilt per sample around a varying scale.
        anyhow::ensure!(
            config.pareto_alpha > 0.0,
            "pareto alpha {} must be positive",
            config.pareto_alpha
        );
        anyhow::ensure!(
            config.min_compute > 0.0,
            "min compute {} must be positive",
            config.min_compute
        );
        anyhow::ensure!(
            config.initial_memory <= config.max_memory,
            "initial memory {} exceeds max memory {}",
            config.initial_memory,
            config.max_memory
        );

        Ok(Self {
            base,
            estimate_noise,
            alpha: config.pareto_alpha,
            min_compute: config.min_compute,
            max_compute: config.max_compute,
            initial_memory: config.initial_memory,
            max_memory: config.max_memory,
        })
    }

    fn sample_compute(&self, rng: &mut StdRng) -> f64 {
        let scale = self
            .base
            .sample(rng)
            .clamp(self.min_compute, self.max_compute);
        match Pareto::new(scale, self.alpha) {
            Ok(tail) => tail.sample(rng),
            Err(_) => scale,
        }
    }

    fn sample_guess(&self, compute: f64, rng: &mut StdRng) -> f64 {
        let noisy = compute * (1.0 + self.estimate_noise.sample(rng));
        noisy.max(self.min_compute)
    }

    fn sample_max_memory(&self, rng: &mut StdRng) -> Mem {
        if self.max_memory == self.initial_memory {
            return self.max_memory;
        }
        rng.random_range(self.initial_memory..self.max_memory)
    }
}

impl Workload for TieredPareto {
    fn generate(&mut self, count: usize, rng: &mut StdRng) -> Vec<TaskDescriptor> {
        let descs: Vec<TaskDescriptor> = (0..count)
            .map(|_| {
                let compute = self.sample_compute(rng);
                let compute_guess = self.sample_guess(compute, rng);
                let tier = PriceTier::new(rng.random_range(0..N_PRIORITIES))
                    .unwrap_or(PriceTier::LOWEST);
                TaskDescriptor {
                    compute,
                    compute_guess,
                    tier,
                    initial_memory: self.initial_memory,
                    max_memory: self.sample_max_memory(rng),
                }
            })
            .collect();
        debug!(count, "generated task descriptors");
        descs
    }
}

/// Replays a fixed script of descriptors in order, ignoring `rng`.
///
/// Each call hands out up to `count` descriptors; once the script runs
/// dry it produces nothing.
#[derive(Debug, Clone, Default)]
pub struct ScriptedWorkload {
    script: VecDeque<TaskDescriptor>,
}

impl ScriptedWorkload {
    /// Creates a workload that replays `script`.
    pub fn new(script: impl IntoIterator<Item = TaskDescriptor>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Descriptors not yet handed out.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Workload for ScriptedWorkload {
    fn generate(&mut self, count: usize, _rng: &mut StdRng) -> Vec<TaskDescriptor> {
        let n = count.min(self.script.len());
        self.script.drain(..n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn same_seed_same_descriptors() {
        let config = WorkloadConfig::default();
        let mut a = TieredPareto::new(&config).unwrap();
        let mut b = TieredPareto::new(&config).unwrap();
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        assert_eq!(a.generate(50, &mut rng_a), b.generate(50, &mut rng_b));
    }

    #[test]
    fn descriptors_respect_bounds() {
        let config = WorkloadConfig::default();
        let mut wl = TieredPareto::new(&config).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for d in wl.generate(2000, &mut rng) {
            assert!(d.compute >= config.min_compute);
            assert!(d.compute_guess >= config.min_compute);
            assert_eq!(d.initial_memory, config.initial_memory);
            assert!(d.max_memory >= config.initial_memory);
            assert!(d.max_memory < config.max_memory);
        }
    }

    #[test]
    fn every_tier_shows_up() {
        let mut wl = TieredPareto::new(&WorkloadConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = [false; N_PRIORITIES];
        for d in wl.generate(500, &mut rng) {
            seen[d.tier.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn rejects_bad_parameters() {
        let config = WorkloadConfig {
            pareto_alpha: 0.0,
            ..WorkloadConfig::default()
        };
        let err = TieredPareto::new(&config).err().unwrap();
        assert!(err.to_string().contains("pareto alpha"));

        let config = WorkloadConfig {
            min_compute: 0.0,
            ..WorkloadConfig::default()
        };
        assert!(TieredPareto::new(&config).is_err());

        let config = WorkloadConfig {
            initial_memory: 500,
            max_memory: 100,
            ..WorkloadConfig::default()
        };
        assert!(TieredPareto::new(&config).is_err());
    }

    #[test]
    fn scripted_workload_runs_dry() {
        let desc = TaskDescriptor {
            compute: 1.0,
            compute_guess: 1.0,
            tier: PriceTier::HIGHEST,
            initial_memory: 1,
            max_memory: 1,
        };
        let mut wl = ScriptedWorkload::new(vec![desc.clone(), desc.clone(), desc]);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(wl.generate(2, &mut rng).len(), 2);
        assert_eq!(wl.remaining(), 1);
        assert_eq!(wl.generate(2, &mut rng).len(), 1);
        assert!(wl.generate(2, &mut rng).is_empty());
    }
}
