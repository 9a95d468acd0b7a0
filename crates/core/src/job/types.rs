//! Job run and partition records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::partition::SeatRange;

// ============================================================================
// Strategy
// ============================================================================

/// Execution strategy for a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One partition, one worker.
    Sequential,
    /// `grid_size` partitions processed in parallel.
    Partitioned,
    /// One logical partition shared by `thread_pool_size` workers.
    Multithreaded,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Partitioned => "partitioned",
            Strategy::Multithreaded => "multithreaded",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Strategy::Sequential),
            "partitioned" => Ok(Strategy::Partitioned),
            "multithreaded" => Ok(Strategy::Multithreaded),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

// ============================================================================
// Status enums
// ============================================================================

/// Lifecycle of a job run.
///
/// `Created -> Running -> {Completed, Failed, Stopped}`; a failed or stopped
/// run goes back to `Running` when resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }

    /// Returns true if no worker is (or will be) attached to the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped
        )
    }

    /// Returns true if a relaunch of the fingerprint resumes this run.
    pub fn is_resumable(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Stopped)
    }

    /// Returns true if `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Stopped)
                | (Failed, Running)
                | (Stopped, Running)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(JobStatus::Created),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "stopped" => Ok(JobStatus::Stopped),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Lifecycle of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl PartitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionStatus::NotStarted => "not_started",
            PartitionStatus::Running => "running",
            PartitionStatus::Completed => "completed",
            PartitionStatus::Failed => "failed",
            PartitionStatus::TimedOut => "timed_out",
        }
    }

    /// States a worker may pick the partition up from.
    pub const DISPATCHABLE: &'static [PartitionStatus] = &[
        PartitionStatus::NotStarted,
        PartitionStatus::Failed,
        PartitionStatus::TimedOut,
    ];

    pub fn is_dispatchable(&self) -> bool {
        Self::DISPATCHABLE.contains(self)
    }
}

impl fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(PartitionStatus::NotStarted),
            "running" => Ok(PartitionStatus::Running),
            "completed" => Ok(PartitionStatus::Completed),
            "failed" => Ok(PartitionStatus::Failed),
            "timed_out" => Ok(PartitionStatus::TimedOut),
            other => Err(format!("unknown partition status: {}", other)),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Identity of a job run for single-flight and resume: (concert, run key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub concert_id: i64,
    pub run_key: String,
}

impl Fingerprint {
    pub fn new(concert_id: i64, run_key: impl Into<String>) -> Self {
        Self {
            concert_id,
            run_key: run_key.into(),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.concert_id, self.run_key)
    }
}

/// A persisted job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    /// Unique identifier (UUID).
    pub id: String,
    pub strategy: Strategy,
    pub concert_id: i64,
    pub run_key: String,
    pub status: JobStatus,
    /// Number of partitions in the plan.
    pub grid_size: u64,
    /// Worker count for the thread-pool strategy, 1 otherwise.
    pub thread_pool_size: u64,
    pub chunk_size: u64,
    /// Seat count (N) the plan was computed for.
    pub ticket_amount: u64,
    pub created_at: DateTime<Utc>,
    /// Set when the run last reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRun {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.concert_id, self.run_key.clone())
    }
}

/// A persisted partition of a job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: i64,
    pub job_run_id: String,
    /// Position in the plan, starting at 0.
    pub ordinal: u32,
    pub range: SeatRange,
    pub status: PartitionStatus,
    /// First seat index not yet known to be committed.
    pub checkpoint_offset: u64,
    /// Tickets committed by this partition so far.
    pub committed_count: u64,
    /// Number of times the partition was dispatched.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Partition {
    /// Seats still to be generated in sequential order.
    pub fn remaining(&self) -> SeatRange {
        self.range.from_offset(self.checkpoint_offset)
    }
}

/// Request to persist a new job run.
#[derive(Debug, Clone)]
pub struct NewJobRun {
    pub strategy: Strategy,
    pub fingerprint: Fingerprint,
    pub grid_size: u64,
    pub thread_pool_size: u64,
    pub chunk_size: u64,
    pub ticket_amount: u64,
}

/// Filter for listing job runs.
#[derive(Debug, Clone, Default)]
pub struct JobRunFilter {
    pub status: Option<JobStatus>,
    pub concert_id: Option<i64>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl JobRunFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            concert_id: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_concert(mut self, concert_id: i64) -> Self {
        self.concert_id = Some(concert_id);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}
