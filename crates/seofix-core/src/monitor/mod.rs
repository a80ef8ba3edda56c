//! Execution monitor: checkpoint, apply, validate, then commit or roll back.

pub mod checkpoint;
pub mod execution;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use execution::{
    ExecutionEvidence, ExecutionMonitor, ExecutionReport, ExecutionState, MonitorError,
    RollbackCause,
};
