//! Job run persistence trait.

use thiserror::Error;

use super::{
    Fingerprint, JobRun, JobRunFilter, JobStatus, NewJobRun, Partition, PartitionStatus,
};
use crate::partition::SeatRange;

/// Error type for job run persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobStoreError {
    /// Job run or partition not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A compare-and-swap precondition did not hold, or the fingerprint is taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Storage for job runs, their partitions, and checkpoints.
///
/// Every state change is a compare-and-swap against the expected current
/// status, so two processes can never both move the same record.
pub trait JobStore: Send + Sync {
    /// Persist a run in `Created` with one `NotStarted` partition per planned range.
    ///
    /// Fails with `Conflict` if the fingerprint already has a run.
    fn create_run(&self, run: NewJobRun, plan: &[SeatRange]) -> Result<JobRun, JobStoreError>;

    /// Get a run by id.
    fn get_run(&self, id: &str) -> Result<Option<JobRun>, JobStoreError>;

    /// Get the run registered for a fingerprint.
    fn find_by_fingerprint(&self, fingerprint: &Fingerprint)
        -> Result<Option<JobRun>, JobStoreError>;

    /// List runs, newest first.
    fn list_runs(&self, filter: &JobRunFilter) -> Result<Vec<JobRun>, JobStoreError>;

    /// Partitions of a run in plan order.
    fn partitions(&self, job_run_id: &str) -> Result<Vec<Partition>, JobStoreError>;

    /// Get one partition by id.
    fn get_partition(&self, id: i64) -> Result<Option<Partition>, JobStoreError>;

    /// Move a run to `to` if its current status is one of `from`.
    fn transition_run(
        &self,
        id: &str,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<JobRun, JobStoreError>;

    /// Move a partition to `to` if its current status is one of `from`.
    ///
    /// Entering `Running` counts as a dispatch attempt. `error` replaces the
    /// partition's last error.
    fn transition_partition(
        &self,
        id: i64,
        from: &[PartitionStatus],
        to: PartitionStatus,
        error: Option<&str>,
    ) -> Result<Partition, JobStoreError>;

    /// Raise the checkpoint to `offset` (never lowers it, clamped to the range end).
    fn advance_checkpoint(&self, id: i64, offset: u64) -> Result<Partition, JobStoreError>;

    /// Record an out-of-order committed sub-range (thread-pool strategy).
    fn record_committed_range(&self, id: i64, range: SeatRange) -> Result<(), JobStoreError>;

    /// Sub-ranges recorded for a partition.
    fn committed_ranges(&self, id: i64) -> Result<Vec<SeatRange>, JobStoreError>;

    /// Move runs left `Running` by a dead process to `Stopped`, and their
    /// `Running` partitions back to `NotStarted`. Returns the affected run ids.
    fn reset_interrupted(&self) -> Result<Vec<String>, JobStoreError>;
}
