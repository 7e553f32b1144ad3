//! One FIFO queue per price tier, arbitrated by paid-for urgency.
//!
//! Dequeue serves the tier whose head has the smallest
//! `(now - admitted_at) / dollars`. Ties go to the lowest tier index.

use crate::proc::Proc;
use crate::queue::{ProcQueue, QueueOrder};
use crate::types::{N_PRIORITIES, PriceTier, Tick};

#[derive(Debug, Clone)]
pub struct MultiQueue {
    tiers: Vec<ProcQueue>,
}

impl Default for MultiQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiQueue {
    /// Creates one empty FIFO per price tier.
    pub fn new() -> Self {
        Self {
            tiers: (0..N_PRIORITIES)
                .map(|_| ProcQueue::new(QueueOrder::Fifo))
                .collect(),
        }
    }

    /// Routes `proc` to the queue of its own tier.
    pub fn enqueue(&mut self, proc: Proc) {
        self.tiers[proc.tier().index()].push(proc);
    }

    /// Puts a proc back at the head of its tier's queue.
    pub fn requeue_front(&mut self, proc: Proc) {
        self.tiers[proc.tier().index()].push_front(proc);
    }

    /// Tier that `dequeue(now)` would serve.
    pub fn next_tier(&self, now: Tick) -> Option<PriceTier> {
        let mut best: Option<(PriceTier, f64)> = None;
        for tier in PriceTier::all() {
            let Some(head) = self.tiers[tier.index()].front() else {
                continue;
            };
            let ratio = (now - head.admitted_at) / tier.dollars();
            if best.is_none_or(|(_, r)| ratio < r) {
                best = Some((tier, ratio));
            }
        }
        best.map(|(tier, _)| tier)
    }

    /// Proc `dequeue(now)` would return, left in place.
    pub fn peek(&self, now: Tick) -> Option<&Proc> {
        let tier = self.next_tier(now)?;
        self.tiers[tier.index()].front()
    }

    /// Removes the head of the most urgent tier at `now`.
    pub fn dequeue(&mut self, now: Tick) -> Option<Proc> {
        let tier = self.next_tier(now)?;
        self.tiers[tier.index()].pop_front()
    }

    /// Procs queued across every tier.
    pub fn len(&self) -> usize {
        self.tiers.iter().map(ProcQueue::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(ProcQueue::is_empty)
    }

    /// Procs queued in `tier`.
    pub fn tier_len(&self, tier: PriceTier) -> usize {
        self.tiers[tier.index()].len()
    }

    /// Every queued proc, cheapest tier first.
    pub fn iter(&self) -> impl Iterator<Item = &Proc> {
        self.tiers.iter().flat_map(ProcQueue::iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::TaskDescriptor;
    use crate::types::ProcId;

    fn proc(id: ProcId, tier: usize, admitted_at: Tick) -> Proc {
        let desc = TaskDescriptor {
            compute: 1.0,
            compute_guess: 1.0,
            tier: PriceTier::new(tier).unwrap(),
            initial_memory: 10,
            max_memory: 10,
        };
        Proc::new(id, desc, admitted_at)
    }

    #[test]
    fn routes_by_tier() {
        let mut mq = MultiQueue::new();
        mq.enqueue(proc(1, 0, 0.0));
        mq.enqueue(proc(2, 3, 0.0));
        mq.enqueue(proc(3, 3, 0.0));
        assert_eq!(mq.len(), 3);
        assert_eq!(mq.tier_len(PriceTier::new(3).unwrap()), 2);
        assert_eq!(mq.tier_len(PriceTier::LOWEST), 1);
    }

    #[test]
    fn serves_smallest_wait_to_price_ratio() {
        let mut mq = MultiQueue::new();
        // ratio (10 - 0) / 0.3 = 33.3
        mq.enqueue(proc(1, 0, 0.0));
        // ratio (10 - 8) / 2.0 = 1.0
        mq.enqueue(proc(2, 4, 8.0));
        // ratio (10 - 9) / 0.7 = 1.43
        mq.enqueue(proc(3, 1, 9.0));
        assert_eq!(mq.dequeue(10.0).map(|p| p.id), Some(2));
        assert_eq!(mq.dequeue(10.0).map(|p| p.id), Some(3));
        assert_eq!(mq.dequeue(10.0).map(|p| p.id), Some(1));
        assert!(mq.dequeue(10.0).is_none());
    }

    #[test]
    fn tie_goes_to_lowest_tier() {
        let mut mq = MultiQueue::new();
        mq.enqueue(proc(1, 4, 5.0));
        mq.enqueue(proc(2, 2, 5.0));
        mq.enqueue(proc(3, 1, 5.0));
        assert_eq!(mq.next_tier(5.0), PriceTier::new(1));
        assert_eq!(mq.dequeue(5.0).map(|p| p.id), Some(3));
    }

    #[test]
    fn requeue_front_restores_head() {
        let mut mq = MultiQueue::new();
        mq.enqueue(proc(1, 2, 0.0));
        mq.enqueue(proc(2, 2, 1.0));
        let head = mq.dequeue(3.0).unwrap();
        mq.requeue_front(head);
        assert_eq!(mq.peek(3.0).map(|p| p.id), Some(1));
    }

    #[test]
    fn empty_queue_has_no_tier() {
        let mq = MultiQueue::default();
        assert!(mq.is_empty());
        assert!(mq.next_tier(0.0).is_none());
    }
}
