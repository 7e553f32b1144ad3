//! Scheduler error types.

use fair_core::PolicyKind;
use thiserror::Error;

/// Errors surfaced by the simulation driver.
///
/// Placement rejections and evictions are normal outcomes, reported in
/// `PlacementReport` and `TickOutcome`, never as errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invariant violated by {policy} policy: {detail}")]
    InvariantViolation { policy: PolicyKind, detail: String },

    #[error("workload error: {0}")]
    Workload(#[from] anyhow::Error),
}

impl SchedulerError {
    pub(crate) fn invariant(policy: PolicyKind, detail: impl Into<String>) -> Self {
        SchedulerError::InvariantViolation {
            policy,
            detail: detail.into(),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
