//! Ordered proc container shared by every scheduler.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::proc::Proc;
use crate::types::ProcId;

/// Where `push` puts a proc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOrder {
    /// Arrival order.
    #[default]
    Fifo,
    /// Ascending deadline; equal deadlines keep arrival order.
    Deadline,
}

#[derive(Debug, Clone, Default)]
pub struct ProcQueue {
    order: QueueOrder,
    procs: VecDeque<Proc>,
}

impl ProcQueue {
    /// Creates an empty queue that inserts by `order`.
    pub fn new(order: QueueOrder) -> Self {
        Self {
            order,
            procs: VecDeque::new(),
        }
    }

    /// Insertion order of this queue.
    pub fn order(&self) -> QueueOrder {
        self.order
    }

    /// Inserts `proc` according to the queue order.
    pub fn push(&mut self, proc: Proc) {
        match self.order {
            QueueOrder::Fifo => self.procs.push_back(proc),
            QueueOrder::Deadline => {
                let at = self.procs.partition_point(|p| p.deadline <= proc.deadline);
                self.procs.insert(at, proc);
            }
        }
    }

    /// Puts a proc back at the head, ignoring the queue order.
    pub fn push_front(&mut self, proc: Proc) {
        self.procs.push_front(proc);
    }

    /// Removes the head of the queue.
    pub fn pop_front(&mut self) -> Option<Proc> {
        self.procs.pop_front()
    }

    /// Head of the queue, if any.
    pub fn front(&self) -> Option<&Proc> {
        self.procs.front()
    }

    /// Removes the proc with the smallest deadline. Linear scan; the first
    /// one found wins a tie.
    pub fn take_min_deadline(&mut self) -> Option<Proc> {
        let idx = self.min_deadline_index()?;
        self.procs.remove(idx)
    }

    /// Proc `take_min_deadline` would remove, left in place.
    pub fn peek_min_deadline(&self) -> Option<&Proc> {
        self.min_deadline_index().and_then(|i| self.procs.get(i))
    }

    /// Removes the proc with `id`, wherever it sits.
    pub fn remove(&mut self, id: ProcId) -> Option<Proc> {
        let idx = self.procs.iter().position(|p| p.id == id)?;
        self.procs.remove(idx)
    }

    pub fn contains(&self, id: ProcId) -> bool {
        self.procs.iter().any(|p| p.id == id)
    }

    /// Number of queued procs.
    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    /// Queued procs from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Proc> {
        self.procs.iter()
    }

    /// Empties the queue, yielding procs from head to tail.
    pub fn drain(&mut self) -> impl Iterator<Item = Proc> + '_ {
        self.procs.drain(..)
    }

    /// Sum of remaining work over every queued proc.
    pub fn remaining_work(&self) -> f64 {
        self.procs.iter().map(Proc::remaining).sum()
    }

    /// Highest price paid by any queued proc, or zero when empty.
    pub fn highest_price(&self) -> f64 {
        self.procs.iter().map(Proc::dollars).fold(0.0, f64::max)
    }

    fn min_deadline_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, p) in self.procs.iter().enumerate() {
            if best.is_none_or(|(_, d)| p.deadline < d) {
                best = Some((i, p.deadline));
            }
        }
        best.map(|(i, _)| i)
    }
}
