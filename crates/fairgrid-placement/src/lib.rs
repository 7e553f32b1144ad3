//! fairgrid-placement: building blocks shared by the placement policies.
//!
//! This crate does not own machines or run procs (that is
//! `fairgrid-scheduler`). It answers three questions the policies ask.
//!
//! # Components
//!
//! - **`directory`**: which machines are idle enough to take more work
//! - **`eviction`**: which procs to kill to make room, and at what cost
//! - **`choices`**: power-of-k sampling over machines or shards

pub mod choices;
pub mod directory;
pub mod eviction;

pub use choices::{power_of_k, sample_k};
pub use directory::{IdleDirectory, IdleRecord};
pub use eviction::{EvictionPlan, Victim, plan_admission, plan_pressure_relief};
