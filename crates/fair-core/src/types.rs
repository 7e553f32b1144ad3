//! Shared types used across fairgrid crates.

use serde::{Deserialize, Serialize};

/// Simulation time. Whole values mark tick boundaries; completions land
/// between them.
pub type Tick = f64;

/// Memory in MB.
pub type Mem = u64;

pub type ProcId = u64;
pub type MachineId = usize;
pub type CoreId = usize;

/// Number of discrete willingness-to-pay levels.
pub const N_PRIORITIES: usize = 5;

const DOLLARS_PER_TIER: [f64; N_PRIORITIES] = [0.3, 0.7, 1.0, 1.5, 2.0];

/// A price tier. Higher tiers pay more per tick of compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PriceTier(u8);

impl PriceTier {
    pub const LOWEST: PriceTier = PriceTier(0);
    pub const HIGHEST: PriceTier = PriceTier(N_PRIORITIES as u8 - 1);

    /// Tier at `index`, or `None` past the last tier.
    pub fn new(index: usize) -> Option<Self> {
        (index < N_PRIORITIES).then_some(PriceTier(index as u8))
    }

    /// Every tier, cheapest first.
    pub fn all() -> impl Iterator<Item = PriceTier> {
        (0..N_PRIORITIES as u8).map(PriceTier)
    }

    /// Zero-based position, cheapest tier first.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Dollars paid per tick of compute at this tier.
    pub fn dollars(self) -> f64 {
        DOLLARS_PER_TIER[self.index()]
    }

    /// `dollars(HIGHEST) / dollars(self)`, always ≥ 1.
    pub fn stretch(self) -> f64 {
        Self::HIGHEST.dollars() / self.dollars()
    }
}

impl TryFrom<u8> for PriceTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PriceTier::new(usize::from(value))
            .ok_or_else(|| format!("price tier {value} out of range 0..{N_PRIORITIES}"))
    }
}

impl From<PriceTier> for u8 {
    fn from(tier: PriceTier) -> u8 {
        tier.0
    }
}

impl std::fmt::Display for PriceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.dollars())
    }
}

/// The four comparable placement strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    IdleHeap,
    Edf,
    Sharded,
    Ideal,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 4] = [
        PolicyKind::IdleHeap,
        PolicyKind::Edf,
        PolicyKind::Sharded,
        PolicyKind::Ideal,
    ];

    /// Snake-case name used in config files and channel names.
    pub fn label(self) -> &'static str {
        match self {
            PolicyKind::IdleHeap => "idle_heap",
            PolicyKind::Edf => "edf",
            PolicyKind::Sharded => "sharded",
            PolicyKind::Ideal => "ideal",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_monotonic_in_price() {
        let prices: Vec<f64> = PriceTier::all().map(PriceTier::dollars).collect();
        assert_eq!(prices.len(), N_PRIORITIES);
        assert!(prices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn tier_out_of_range_is_rejected() {
        assert!(PriceTier::new(N_PRIORITIES).is_none());
        assert!(PriceTier::try_from(9u8).is_err());
    }

    #[test]
    fn stretch_is_one_at_top_tier() {
        assert_eq!(PriceTier::HIGHEST.stretch(), 1.0);
        assert!(PriceTier::LOWEST.stretch() > 6.0);
    }

    #[test]
    fn policy_labels_are_unique() {
        let mut labels: Vec<_> = PolicyKind::ALL.iter().map(|p| p.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 4);
    }
}
