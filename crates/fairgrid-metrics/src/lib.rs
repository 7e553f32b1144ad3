//! fairgrid-metrics: what the simulator reports, and where it goes.
//!
//! The scheduler writes analysis rows to a `MetricsSink` and never reads
//! them back. Alongside the raw rows, each policy feeds a
//! `SummaryCollector` that condenses a run into a `PolicySummary`.
//!
//! # Architecture
//!
//! ```text
//! World (per tick, per policy)
//!   ├── MetricsSink::record("<policy>_<channel>", row)
//!   │     ├── MemorySink  (tests, in-process analysis)
//!   │     ├── FileSink    (<results_dir>/<channel>.txt)
//!   │     └── NullSink
//!   └── SummaryCollector → PolicySummary → render_text / render_json
//! ```

pub mod channel;
pub mod sink;
pub mod summary;

pub use channel::{Channel, SchedTarget};
pub use sink::{FileSink, MemorySink, MetricsSink, NullSink};
pub use summary::{PolicySummary, SummaryCollector, TierSummary, render_json, render_text};
