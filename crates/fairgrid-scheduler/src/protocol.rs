//! Messages between a core and the machine that owns it.
//!
//! A core asks for work with `NeedWork` and waits on the oneshot for
//! exactly one reply. Completions and evictions are fire-and-forget.
//! The machine can also push procs straight into a core's inbox, which
//! the core drains without blocking at the top of every round.

use fair_core::{CoreId, Proc};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum CoreRequest {
    NeedWork {
        core: CoreId,
        reply: oneshot::Sender<Option<Proc>>,
    },
    Done {
        core: CoreId,
        proc: Proc,
    },
    Evicted {
        core: CoreId,
        proc: Proc,
    },
}

/// Core end of the links to its machine.
#[derive(Debug)]
pub struct CoreLink {
    pub requests: mpsc::UnboundedSender<CoreRequest>,
    pub inbox: mpsc::UnboundedReceiver<Proc>,
}

/// Machine end: one request stream shared by all cores, one push sender
/// per core.
#[derive(Debug)]
pub struct MachineLink {
    pub requests: mpsc::UnboundedReceiver<CoreRequest>,
    pub pushes: Vec<mpsc::UnboundedSender<Proc>>,
}

/// Wires `cores` cores to one machine.
pub fn wire(cores: usize) -> (MachineLink, Vec<CoreLink>) {
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let mut pushes = Vec::with_capacity(cores);
    let mut links = Vec::with_capacity(cores);
    for _ in 0..cores {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        pushes.push(push_tx);
        links.push(CoreLink {
            requests: req_tx.clone(),
            inbox: push_rx,
        });
    }
    (
        MachineLink {
            requests: req_rx,
            pushes,
        },
        links,
    )
}
