//! Types for the job orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::job::{JobRun, JobStatus, JobStoreError, Partition, Strategy};
use crate::ticket::SinkError;

/// Errors surfaced to callers of the orchestrator.
///
/// Partition-level failures never appear here; they are recorded on the
/// partition and visible through [`JobStatusReport`].
#[derive(Debug, Error)]
pub enum JobError {
    /// Rejected before any state was persisted.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A run for the fingerprint is executing.
    #[error("job run {job_run_id} is already running")]
    JobAlreadyRunning { job_run_id: String },

    /// A run for the fingerprint completed and force was not set.
    #[error("job run {job_run_id} is already complete")]
    JobAlreadyComplete { job_run_id: String },

    /// A forced rerun found the sink out of step with the completed run.
    #[error("job run {job_run_id} is complete but the sink holds {actual} of {expected} tickets")]
    VerificationFailed {
        job_run_id: String,
        expected: u64,
        actual: u64,
    },

    /// The run is not executing in this process.
    #[error("job run {job_run_id} is not running (status: {status})")]
    NotRunning {
        job_run_id: String,
        status: JobStatus,
    },

    /// Job run not found.
    #[error("job run not found: {0}")]
    JobNotFound(String),

    /// Job store error.
    #[error("job store error: {0}")]
    Store(#[from] JobStoreError),

    /// Catalog error other than a missing concert.
    #[error("catalog error: {0}")]
    Catalog(CatalogError),

    /// Ticket sink error while verifying.
    #[error("ticket sink error: {0}")]
    Sink(#[from] SinkError),
}

impl From<CatalogError> for JobError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ConcertNotFound(id) => {
                JobError::InvalidParameters(format!("concert {} not found", id))
            }
            CatalogError::InvalidLayout(e) => JobError::InvalidParameters(e.to_string()),
            other => JobError::Catalog(other),
        }
    }
}

/// Request to launch (or resume) a job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub strategy: Strategy,
    pub concert_id: i64,
    /// Caller-supplied idempotency key.
    pub run_key: String,
    /// Partitions (partitioned strategy). Defaults to the engine config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<u64>,
    /// Workers (multithreaded strategy). Defaults to the engine config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_pool_size: Option<u64>,
    /// Tickets per transaction. Defaults to the engine config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    /// Re-verify a completed run instead of rejecting the launch.
    #[serde(default)]
    pub force: bool,
}

impl LaunchRequest {
    pub fn new(strategy: Strategy, concert_id: i64, run_key: impl Into<String>) -> Self {
        Self {
            strategy,
            concert_id,
            run_key: run_key.into(),
            grid_size: None,
            thread_pool_size: None,
            chunk_size: None,
            force: false,
        }
    }

    pub fn with_grid_size(mut self, grid_size: u64) -> Self {
        self.grid_size = Some(grid_size);
        self
    }

    pub fn with_thread_pool_size(mut self, thread_pool_size: u64) -> Self {
        self.thread_pool_size = Some(thread_pool_size);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// How an accepted launch was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchKind {
    /// A new run was created.
    Started,
    /// A failed or stopped run was resumed.
    Resumed,
    /// A forced rerun of a completed run verified the sink and wrote nothing.
    Verified,
}

impl LaunchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchKind::Started => "started",
            LaunchKind::Resumed => "resumed",
            LaunchKind::Verified => "verified",
        }
    }
}

/// Accepted launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Launched {
    pub job_run_id: String,
    pub kind: LaunchKind,
}

/// Point-in-time view of a job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub run: JobRun,
    pub partitions: Vec<Partition>,
    /// Tickets committed by this run across all partitions.
    pub tickets_written: u64,
    /// Whether a worker for the run is attached in this process.
    pub active: bool,
}

impl JobStatusReport {
    pub fn status(&self) -> JobStatus {
        self.run.status
    }
}
