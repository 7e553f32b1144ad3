//! fairgrid-scheduler: price-aware fair scheduling over a simulated fleet.
//!
//! Runs four placement policies side by side on identical workloads so
//! their outcomes can be compared tick for tick:
//!
//! - **idle-heap**: sharded idle-machine directory, power-of-k fallback,
//!   value-aware eviction
//! - **edf**: global earliest-deadline-first into one water-filled pool
//! - **sharded**: least-loaded machine among `k` samples per shard
//! - **ideal**: multi-queue urgency into one water-filled pool
//!
//! # Architecture
//!
//! ```text
//! World
//!   ├── Workload (generate → one Proc copy per policy)
//!   ├── MetricsSink (<policy>_<channel> rows)
//!   └── Lane per policy
//!       ├── PlacementPolicy::place / execute
//!       │     ├── Machine (MemoryGauge, pending queue)
//!       │     │     └── CoreSched × cores (proportional or equal share)
//!       │     │           ⇅ CoreRequest: NeedWork / Done / Evicted
//!       │     └── AggregatePool<ReadySet> (water-filling)
//!       └── SummaryCollector
//! ```

pub mod core_sched;
pub mod error;
pub mod gauge;
pub mod load_balancer;
pub mod machine;
pub mod policy;
pub mod protocol;
pub mod water_fill;
pub mod world;

pub use core_sched::{CoreSched, CoreSettings, CoreTickReport, ShareRule};
pub use error::{SchedulerError, SchedulerResult};
pub use gauge::MemoryGauge;
pub use load_balancer::RoundRobinBalancer;
pub use machine::{Dispatch, Machine, MachineSettings, MachineTickReport};
pub use policy::{
    EdfPolicy, IdealPolicy, IdleHeapPolicy, PlacementPolicy, PlacementReport, ShardedPolicy,
    TickOutcome,
};
pub use water_fill::{AggregatePool, PoolTickReport, ReadySet};
pub use world::World;
