//! Idle-machine directory.
//!
//! One directory shard is shared by a global scheduler and every machine
//! that calls it home. Machines publish their own record at the end of
//! each tick; the scheduler claims capacity from records when it places
//! a proc. All access goes through one lock per shard, so a claim is a
//! single read-modify-write.
//!
//! Records are keyed by machine id, which keeps iteration (and therefore
//! tie-breaking) deterministic.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use fair_core::{MachineId, Mem};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdleRecord {
    pub machine: MachineId,
    /// Free memory as last published or claimed.
    pub available: Mem,
    /// Highest price paid by any proc on the machine.
    pub highest_cost: f64,
    /// Procs resident or pending on the machine.
    pub qlen: usize,
}

#[derive(Debug, Default)]
pub struct IdleDirectory {
    shard: usize,
    records: Mutex<BTreeMap<MachineId, IdleRecord>>,
}

impl IdleDirectory {
    /// Creates an empty directory shard.
    pub fn new(shard: usize) -> Self {
        Self {
            shard,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Inserts or replaces the record of `record.machine`.
    pub fn upsert(&self, record: IdleRecord) {
        self.lock().insert(record.machine, record);
    }

    /// Drops the record of `machine`, if present.
    pub fn remove(&self, machine: MachineId) -> Option<IdleRecord> {
        self.lock().remove(&machine)
    }

    /// Copy of the record of `machine`.
    pub fn get(&self, machine: MachineId) -> Option<IdleRecord> {
        self.lock().get(&machine).cloned()
    }

    /// Number of machines currently listed as idle.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Every record, in machine-id order.
    pub fn snapshot(&self) -> Vec<IdleRecord> {
        self.lock().values().cloned().collect()
    }

    /// Best record for a proc that may grow to `headroom` MB: the lowest
    /// `highest_cost` among records with at least that much free, then
    /// the most free memory, then the lowest machine id.
    pub fn best_fit(&self, headroom: Mem) -> Option<IdleRecord> {
        select(&self.lock(), headroom).cloned()
    }

    /// Atomically picks the best record (as `best_fit`), charges `reserve`
    /// MB against it and bumps its cost and queue length. The record stays
    /// only while its free memory is above `retain_above`.
    pub fn claim(
        &self,
        headroom: Mem,
        reserve: Mem,
        price: f64,
        retain_above: Mem,
    ) -> Option<MachineId> {
        let mut records = self.lock();
        let machine = select(&records, headroom)?.machine;

        let record = records.get_mut(&machine)?;
        record.available = record.available.saturating_sub(reserve);
        record.highest_cost = record.highest_cost.max(price);
        record.qlen += 1;

        if record.available <= retain_above {
            records.remove(&machine);
            debug!(shard = self.shard, machine, "machine no longer idle after claim");
        }
        Some(machine)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<MachineId, IdleRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Internal helpers ───────────────────────────────────────────

fn select(records: &BTreeMap<MachineId, IdleRecord>, headroom: Mem) -> Option<&IdleRecord> {
    let mut best: Option<&IdleRecord> = None;
    for r in records.values().filter(|r| r.available >= headroom) {
        let better = match best {
            None => true,
            Some(b) => {
                r.highest_cost < b.highest_cost
                    || (r.highest_cost == b.highest_cost && r.available > b.available)
            }
        };
        if better {
            best = Some(r);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(machine: MachineId, available: Mem, highest_cost: f64) -> IdleRecord {
        IdleRecord {
            machine,
            available,
            highest_cost,
            qlen: 0,
        }
    }

    #[test]
    fn best_fit_prefers_cheapest_eligible() {
        let dir = IdleDirectory::new(0);
        dir.upsert(record(0, 5_000, 0.3));
        dir.upsert(record(1, 20_000, 1.0));
        dir.upsert(record(2, 15_000, 0.7));
        assert_eq!(dir.best_fit(1_000).map(|r| r.machine), Some(0));
        assert_eq!(dir.best_fit(10_000).map(|r| r.machine), Some(2));
        assert!(dir.best_fit(30_000).is_none());
    }

    #[test]
    fn best_fit_ties_break_on_memory_then_id() {
        let dir = IdleDirectory::new(0);
        dir.upsert(record(3, 8_000, 1.0));
        dir.upsert(record(1, 9_000, 1.0));
        dir.upsert(record(2, 9_000, 1.0));
        assert_eq!(dir.best_fit(100).map(|r| r.machine), Some(1));
    }

    #[test]
    fn claim_reserves_and_updates_record() {
        let dir = IdleDirectory::new(0);
        dir.upsert(record(4, 10_000, 0.3));
        let got = dir.claim(5_000, 100, 1.5, 100);
        assert_eq!(got, Some(4));

        let r = dir.get(4).unwrap();
        assert_eq!(r.available, 9_900);
        assert_eq!(r.highest_cost, 1.5);
        assert_eq!(r.qlen, 1);
    }

    #[test]
    fn claim_drops_record_below_threshold() {
        let dir = IdleDirectory::new(0);
        dir.upsert(record(4, 250, 0.3));
        assert_eq!(dir.claim(200, 200, 0.3, 100), Some(4));
        assert!(dir.get(4).is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn claim_keeps_lower_cost() {
        let dir = IdleDirectory::new(0);
        dir.upsert(record(1, 10_000, 2.0));
        dir.claim(100, 100, 0.3, 0);
        assert_eq!(dir.get(1).unwrap().highest_cost, 2.0);
    }

    #[test]
    fn concurrent_claims_never_oversubscribe() {
        let dir = Arc::new(IdleDirectory::new(0));
        dir.upsert(record(0, 1_000, 0.3));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = Arc::clone(&dir);
                std::thread::spawn(move || dir.claim(100, 100, 0.3, 0).is_some())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 8);
        assert_eq!(dir.get(0).map(|r| r.available), Some(200));
        assert_eq!(dir.get(0).map(|r| r.qlen), Some(8));
    }
}
