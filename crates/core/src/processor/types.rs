//! Types for the processor module.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::catalog::SeatLayout;
use crate::job::{Partition, PartitionStatus};
use crate::partition::SeatRange;

/// Why a partition did not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PartitionFailure {
    /// A chunk kept failing transiently after all retries.
    #[error("chunk {range} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        range: SeatRange,
        attempts: u32,
        last_error: String,
    },

    /// The sink rejected a seat that already exists.
    #[error("seat {seat_index} of concert {concert_id} collided with an existing ticket")]
    SeatCollision { concert_id: i64, seat_index: u64 },

    /// Non-retryable persistence or layout failure.
    #[error("fatal: {0}")]
    Fatal(String),

    /// The partition exceeded its wall-clock budget.
    #[error("partition exceeded its {0:?} time budget")]
    Timeout(Duration),

    /// Checkpoint or status bookkeeping failed.
    #[error("checkpoint bookkeeping failed: {0}")]
    Checkpoint(String),
}

/// Result of one partition dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionOutcome {
    /// Every seat of the partition is committed.
    Completed { tickets_written: u64 },
    /// The partition stopped on a failure.
    Failed(PartitionFailure),
    /// Cancellation was observed between chunks.
    Stopped,
}

impl PartitionOutcome {
    /// Status persisted for the partition after this outcome.
    ///
    /// A stopped partition goes back to `NotStarted`, keeping its checkpoint.
    pub fn status(&self) -> PartitionStatus {
        match self {
            PartitionOutcome::Completed { .. } => PartitionStatus::Completed,
            PartitionOutcome::Failed(PartitionFailure::Timeout(_)) => PartitionStatus::TimedOut,
            PartitionOutcome::Failed(_) => PartitionStatus::Failed,
            PartitionOutcome::Stopped => PartitionStatus::NotStarted,
        }
    }

    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            PartitionOutcome::Stopped => "stopped",
            other => other.status().as_str(),
        }
    }
}

/// Why a single chunk commit was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Cancellation was observed while waiting to retry.
    Cancelled,
    /// The chunk cannot be committed.
    Failed(PartitionFailure),
}

/// Everything a worker needs to process one partition.
#[derive(Debug, Clone)]
pub struct PartitionWork {
    pub partition: Partition,
    pub layout: Arc<SeatLayout>,
    pub chunk_size: std::num::NonZeroU64,
    /// Skip leading chunks the sink already holds (set on resume).
    pub reconcile: bool,
    pub cancel: CancellationToken,
}
