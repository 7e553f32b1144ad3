//! Machine-wide memory accounting shared by a machine and its cores.

use std::sync::atomic::{AtomicU64, Ordering};

use fair_core::Mem;

#[derive(Debug)]
pub struct MemoryGauge {
    capacity: Mem,
    used: AtomicU64,
}

impl MemoryGauge {
    /// Creates an empty gauge of `capacity` MB.
    pub fn new(capacity: Mem) -> Self {
        Self {
            capacity,
            used: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> Mem {
        self.capacity
    }

    /// Memory charged so far.
    pub fn used(&self) -> Mem {
        self.used.load(Ordering::Relaxed)
    }

    /// Memory left before the gauge is full; zero when over.
    pub fn free(&self) -> Mem {
        self.capacity.saturating_sub(self.used())
    }

    /// How far usage is above capacity; zero when within it.
    pub fn excess(&self) -> Mem {
        self.used().saturating_sub(self.capacity)
    }

    pub fn is_over(&self) -> bool {
        self.excess() > 0
    }

    /// Charges `amount` MB. May push usage past capacity; callers resolve
    /// that by eviction.
    pub fn charge(&self, amount: Mem) {
        self.used.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn release(&self, amount: Mem) {
        let _ = self
            .used
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |u| {
                Some(u.saturating_sub(amount))
            });
    }
}
