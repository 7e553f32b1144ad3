//! fairgrid-loadgen: the workload side of the simulator.
//!
//! The scheduler treats a workload as an opaque producer of task
//! descriptors. Randomness is never ambient: the caller owns the stream
//! and passes it in, so a seed fully determines the generated demand.

pub mod generator;

pub use generator::{ScriptedWorkload, TieredPareto, Workload};
