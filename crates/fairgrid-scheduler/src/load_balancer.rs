//! Round-robin rotation.
//!
//! Used wherever work is dealt out in turn: new procs across shards or
//! global schedulers, pushed procs across the cores of a machine.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    /// Creates a balancer whose first pick is slot 0.
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }

    /// Next slot out of `count`, or `None` when there are no slots.
    pub fn next(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(idx % count)
    }
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deals_in_turn_and_wraps() {
        let rr = RoundRobinBalancer::new();
        let picks: Vec<_> = (0..5).filter_map(|_| rr.next(3)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn no_slots_no_pick() {
        let rr = RoundRobinBalancer::new();
        assert_eq!(rr.next(0), None);
        assert_eq!(rr.next(2), Some(0));
    }

    #[test]
    fn even_spread_over_shards() {
        let rr = RoundRobinBalancer::new();
        let mut per_shard = [0usize; 4];
        for _ in 0..40 {
            per_shard[rr.next(4).unwrap()] += 1;
        }
        assert_eq!(per_shard, [10, 10, 10, 10]);
    }
}
