//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Chunk commits (tickets written, retries, commit latency)
//! - Partitions (outcomes)
//! - Job runs (launches, active runs, run duration)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Chunk Metrics
// =============================================================================

/// Tickets committed to the sink.
pub static TICKETS_WRITTEN: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seatbatch_tickets_written_total",
        "Total tickets committed to the sink",
    )
    .unwrap()
});

/// Chunk commit attempts by result.
pub static CHUNK_COMMITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seatbatch_chunk_commits_total", "Total chunk commit attempts"),
        &["result"], // "committed", "transient", "collision", "fatal"
    )
    .unwrap()
});

/// Chunk retries after transient failures.
pub static CHUNK_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seatbatch_chunk_retries_total",
        "Total chunk retries after transient persistence failures",
    )
    .unwrap()
});

/// Chunk commit duration in seconds.
pub static CHUNK_COMMIT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "seatbatch_chunk_commit_duration_seconds",
            "Duration of a single chunk write",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["result"], // "committed", "failed"
    )
    .unwrap()
});

// =============================================================================
// Partition Metrics
// =============================================================================

/// Partition dispatch outcomes by final status.
pub static PARTITION_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seatbatch_partition_outcomes_total",
            "Total partition dispatches by outcome",
        ),
        &["status"], // "completed", "failed", "timed_out", "stopped"
    )
    .unwrap()
});

// =============================================================================
// Job Metrics
// =============================================================================

/// Launch requests by strategy and outcome.
pub static JOB_LAUNCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seatbatch_job_launches_total", "Total job launch requests"),
        &["strategy", "outcome"], // outcome: "started", "resumed", "verified", "rejected"
    )
    .unwrap()
});

/// Job runs currently executing in this process.
pub static JOB_RUNS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "seatbatch_job_runs_active",
        "Job runs currently executing in this process",
    )
    .unwrap()
});

/// Job run execution duration in seconds.
pub static JOB_RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "seatbatch_job_run_duration_seconds",
            "Duration of a job run execution",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        &["strategy", "status"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Chunks
        Box::new(TICKETS_WRITTEN.clone()),
        Box::new(CHUNK_COMMITS.clone()),
        Box::new(CHUNK_RETRIES.clone()),
        Box::new(CHUNK_COMMIT_DURATION.clone()),
        // Partitions
        Box::new(PARTITION_OUTCOMES.clone()),
        // Jobs
        Box::new(JOB_LAUNCHES.clone()),
        Box::new(JOB_RUNS_ACTIVE.clone()),
        Box::new(JOB_RUN_DURATION.clone()),
    ]
}
