//! fair-core: shared vocabulary of the fairgrid simulator.
//!
//! Every other crate speaks in these types: price tiers, task
//! descriptors, the `Proc` accounting record, the queues that hold procs
//! while they wait or run, and the TOML configuration.

pub mod config;
pub mod multiqueue;
pub mod proc;
pub mod queue;
pub mod types;

pub use config::{
    MetricsConfig, PlacementConfig, SchedulerConfig, SimConfig, WorkloadConfig, WorldConfig,
};
pub use multiqueue::MultiQueue;
pub use proc::{MemoryModel, Proc, TaskDescriptor};
pub use queue::{ProcQueue, QueueOrder};
pub use types::*;
