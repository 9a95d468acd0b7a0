//! Job lifecycle integration tests.
//!
//! These tests drive the orchestrator against the in-memory catalog and sink
//! with a file-backed job store:
//! launch -> partitions dispatched -> chunks committed -> run completed,
//! plus the failure, stop, and resume paths in between.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use seatbatch_core::{
    job::NewJobRun,
    testing::{fixtures, MockConcertCatalog, MockTicketSink},
    EngineConfig, Fingerprint, JobError, JobOrchestrator, JobRunFilter, JobStatus, JobStore,
    LaunchKind, LaunchRequest, PartitionStatus, RetryConfig, SeatLayout, SeatRange, SqliteJobStore,
    Strategy, TicketSink,
};

/// Test helper to create all dependencies for orchestrator testing.
struct TestHarness {
    catalog: Arc<MockConcertCatalog>,
    sink: Arc<MockTicketSink>,
    jobs: Arc<SqliteJobStore>,
    _temp_dir: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let jobs = Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));
        let catalog = Arc::new(MockConcertCatalog::new());
        catalog.add_concert(fixtures::concert_snapshot(42, 100)).await;

        Self {
            catalog,
            sink: Arc::new(MockTicketSink::new()),
            jobs,
            _temp_dir: temp_dir,
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
            .with_chunk_size(10)
            .with_retry(RetryConfig::default().with_delays(1, 5))
    }

    fn create_orchestrator(&self, config: EngineConfig) -> JobOrchestrator {
        JobOrchestrator::new(
            config,
            Arc::clone(&self.catalog) as Arc<dyn seatbatch_core::ConcertCatalog>,
            Arc::clone(&self.sink) as Arc<dyn TicketSink>,
            Arc::clone(&self.jobs) as Arc<dyn JobStore>,
        )
    }
}

fn all_seats(n: u64) -> Vec<u64> {
    (0..n).collect()
}

#[tokio::test]
async fn test_sequential_issues_every_seat_once() {
    let harness = TestHarness::new().await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());

    let launched = orchestrator
        .launch(LaunchRequest::new(Strategy::Sequential, 42, "seq"))
        .await
        .unwrap();
    assert_eq!(launched.kind, LaunchKind::Started);

    let report = orchestrator.wait(&launched.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Completed);
    assert_eq!(report.tickets_written, 100);
    assert_eq!(report.partitions.len(), 1);
    assert_eq!(report.partitions[0].checkpoint_offset, 100);
    assert!(report.run.completed_at.is_some());

    assert_eq!(harness.sink.seat_indices(42).await, all_seats(100));
    assert_eq!(harness.sink.committed_chunks().await.len(), 10);
}

#[tokio::test]
async fn test_partitioned_run_covers_disjoint_ranges() {
    let harness = TestHarness::new().await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());

    let launched = orchestrator
        .launch(LaunchRequest::new(Strategy::Partitioned, 42, "grid").with_grid_size(4))
        .await
        .unwrap();
    let report = orchestrator.wait(&launched.job_run_id).await.unwrap();

    assert_eq!(report.status(), JobStatus::Completed);
    let ranges: Vec<SeatRange> = report.partitions.iter().map(|p| p.range).collect();
    assert_eq!(
        ranges,
        vec![
            SeatRange::new(0, 25),
            SeatRange::new(25, 50),
            SeatRange::new(50, 75),
            SeatRange::new(75, 100),
        ]
    );
    for partition in &report.partitions {
        assert_eq!(partition.status, PartitionStatus::Completed);
        assert_eq!(partition.committed_count, 25);
    }

    assert_eq!(harness.sink.seat_indices(42).await, all_seats(100));
}

#[tokio::test]
async fn test_multithreaded_run_shares_one_partition() {
    let harness = TestHarness::new().await;
    harness
        .catalog
        .add_concert(fixtures::concert_snapshot(7, 1000))
        .await;
    harness.sink.set_write_delay(Duration::from_millis(1)).await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());

    let launched = orchestrator
        .launch(LaunchRequest::new(Strategy::Multithreaded, 7, "pool").with_thread_pool_size(8))
        .await
        .unwrap();
    let report = orchestrator.wait(&launched.job_run_id).await.unwrap();

    assert_eq!(report.status(), JobStatus::Completed);
    assert_eq!(report.run.thread_pool_size, 8);
    assert_eq!(report.partitions.len(), 1);
    assert_eq!(report.partitions[0].checkpoint_offset, 1000);

    assert_eq!(harness.sink.seat_indices(7).await, all_seats(1000));
    assert_eq!(harness.sink.committed_chunks().await.len(), 100);
    assert!(harness.sink.max_concurrent_writes().await <= 8);
}

#[tokio::test]
async fn test_partition_concurrency_is_capped() {
    let harness = TestHarness::new().await;
    harness.sink.set_write_delay(Duration::from_millis(3)).await;
    let orchestrator =
        harness.create_orchestrator(TestHarness::config().with_max_concurrent_partitions(2));

    let launched = orchestrator
        .launch(LaunchRequest::new(Strategy::Partitioned, 42, "capped").with_grid_size(8))
        .await
        .unwrap();
    let report = orchestrator.wait(&launched.job_run_id).await.unwrap();

    assert_eq!(report.status(), JobStatus::Completed);
    assert!(harness.sink.max_concurrent_writes().await <= 2);
    assert_eq!(harness.sink.seat_indices(42).await, all_seats(100));
}

#[tokio::test]
async fn test_transient_failures_are_retried_transparently() {
    let harness = TestHarness::new().await;
    harness.sink.inject_transient_failures(45, 2).await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());

    let launched = orchestrator
        .launch(LaunchRequest::new(Strategy::Partitioned, 42, "flaky").with_grid_size(4))
        .await
        .unwrap();
    let report = orchestrator.wait(&launched.job_run_id).await.unwrap();

    assert_eq!(report.status(), JobStatus::Completed);
    assert_eq!(harness.sink.seat_indices(42).await, all_seats(100));
    // Three chunks per partition plus two rejected attempts
    assert_eq!(harness.sink.write_calls().await, 14);
}

#[tokio::test]
async fn test_collision_is_contained_to_its_partition() {
    let harness = TestHarness::new().await;
    harness.sink.seed_existing(42, 60).await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());

    let launched = orchestrator
        .launch(LaunchRequest::new(Strategy::Partitioned, 42, "collide").with_grid_size(4))
        .await
        .unwrap();
    let report = orchestrator.wait(&launched.job_run_id).await.unwrap();

    assert_eq!(report.status(), JobStatus::Failed);

    let statuses: Vec<PartitionStatus> = report.partitions.iter().map(|p| p.status).collect();
    assert_eq!(
        statuses,
        vec![
            PartitionStatus::Completed,
            PartitionStatus::Completed,
            PartitionStatus::Failed,
            PartitionStatus::Completed,
        ]
    );

    let failed = &report.partitions[2];
    assert_eq!(failed.checkpoint_offset, 60);
    assert!(failed.last_error.as_deref().unwrap_or_default().contains("60"));

    // [0, 60) and [75, 100) issued by the run, seat 60 pre-existing
    let mut expected: Vec<u64> = (0..61).collect();
    expected.extend(75..100);
    assert_eq!(harness.sink.seat_indices(42).await, expected);
}

#[tokio::test]
async fn test_completed_run_is_not_repeated() {
    let harness = TestHarness::new().await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());
    let request = LaunchRequest::new(Strategy::Partitioned, 42, "once").with_grid_size(4);

    let launched = orchestrator.launch(request.clone()).await.unwrap();
    orchestrator.wait(&launched.job_run_id).await.unwrap();
    let calls_after_run = harness.sink.write_calls().await;

    let result = orchestrator.launch(request.clone()).await;
    assert!(matches!(
        result,
        Err(JobError::JobAlreadyComplete { ref job_run_id }) if *job_run_id == launched.job_run_id
    ));

    let forced = orchestrator
        .launch(request.clone().with_force(true))
        .await
        .unwrap();
    assert_eq!(forced.kind, LaunchKind::Verified);
    assert_eq!(forced.job_run_id, launched.job_run_id);

    assert_eq!(harness.sink.write_calls().await, calls_after_run);
    assert_eq!(harness.sink.count(42).await, 100);
    assert_eq!(orchestrator.list_runs(&JobRunFilter::new()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_forced_rerun_reports_sink_mismatch() {
    let harness = TestHarness::new().await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());
    let request = LaunchRequest::new(Strategy::Sequential, 42, "drift");

    let launched = orchestrator.launch(request.clone()).await.unwrap();
    orchestrator.wait(&launched.job_run_id).await.unwrap();

    // A ticket issued outside the run
    harness.sink.seed_existing(42, 500).await;

    let result = orchestrator.launch(request.with_force(true)).await;
    assert!(matches!(
        result,
        Err(JobError::VerificationFailed {
            expected: 100,
            actual: 101,
            ..
        })
    ));
}

#[tokio::test]
async fn test_concurrent_launch_is_rejected() {
    let harness = TestHarness::new().await;
    harness.sink.set_write_delay(Duration::from_millis(10)).await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());
    let request = LaunchRequest::new(Strategy::Sequential, 42, "busy");

    let launched = orchestrator.launch(request.clone()).await.unwrap();

    let result = orchestrator.launch(request).await;
    assert!(matches!(
        result,
        Err(JobError::JobAlreadyRunning { ref job_run_id }) if *job_run_id == launched.job_run_id
    ));

    let report = orchestrator.wait(&launched.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Completed);
    assert_eq!(harness.sink.seat_indices(42).await, all_seats(100));
}

#[tokio::test]
async fn test_failed_run_resumes_from_checkpoint() {
    let harness = TestHarness::new().await;
    harness.sink.inject_fatal_failure(60).await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());
    let request = LaunchRequest::new(Strategy::Partitioned, 42, "resume").with_grid_size(4);

    let first = orchestrator.launch(request.clone()).await.unwrap();
    let report = orchestrator.wait(&first.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Failed);
    assert_eq!(report.partitions[2].status, PartitionStatus::Failed);
    assert_eq!(report.partitions[2].checkpoint_offset, 60);

    harness.sink.clear_failures().await;
    let chunks_before = harness.sink.committed_chunks().await.len();

    let second = orchestrator.launch(request).await.unwrap();
    assert_eq!(second.kind, LaunchKind::Resumed);
    assert_eq!(second.job_run_id, first.job_run_id);

    let report = orchestrator.wait(&second.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Completed);
    assert_eq!(report.tickets_written, 100);

    // Only the failed partition's remainder was written
    let chunks = harness.sink.committed_chunks().await;
    assert_eq!(
        chunks[chunks_before..].to_vec(),
        vec![SeatRange::new(60, 70), SeatRange::new(70, 75)]
    );
    assert_eq!(harness.sink.seat_indices(42).await, all_seats(100));
}

#[tokio::test]
async fn test_multithreaded_failed_run_resumes_only_uncommitted_subranges() {
    let harness = TestHarness::new().await;
    harness.sink.inject_fatal_failure(55).await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());
    let request =
        LaunchRequest::new(Strategy::Multithreaded, 42, "pool-resume").with_thread_pool_size(4);

    let first = orchestrator.launch(request.clone()).await.unwrap();
    let report = orchestrator.wait(&first.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Failed);

    let partition_id = report.partitions[0].id;
    let recorded = harness.jobs.committed_ranges(partition_id).unwrap();
    assert!(!recorded.contains(&SeatRange::new(50, 60)));

    harness.sink.clear_failures().await;
    let chunks_before = harness.sink.committed_chunks().await.len();

    let second = orchestrator.launch(request).await.unwrap();
    assert_eq!(second.kind, LaunchKind::Resumed);
    let report = orchestrator.wait(&second.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Completed);
    assert_eq!(report.tickets_written, 100);

    // Every recorded sub-range is skipped, every other one is written once
    let resumed = harness.sink.committed_chunks().await[chunks_before..].to_vec();
    assert!(resumed.contains(&SeatRange::new(50, 60)));
    assert!(resumed.iter().all(|chunk| !recorded.contains(chunk)));
    assert_eq!(recorded.len() + resumed.len(), 10);
    assert_eq!(harness.sink.seat_indices(42).await, all_seats(100));
}

#[tokio::test]
async fn test_resume_rejects_changed_strategy() {
    let harness = TestHarness::new().await;
    harness.sink.inject_fatal_failure(5).await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());

    let first = orchestrator
        .launch(LaunchRequest::new(Strategy::Sequential, 42, "switch"))
        .await
        .unwrap();
    let report = orchestrator.wait(&first.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Failed);

    let result = orchestrator
        .launch(LaunchRequest::new(Strategy::Partitioned, 42, "switch").with_grid_size(4))
        .await;
    assert!(matches!(result, Err(JobError::InvalidParameters(_))));

    let result = orchestrator
        .status(&first.job_run_id)
        .await
        .unwrap()
        .status();
    assert_eq!(result, JobStatus::Failed);
}

#[tokio::test]
async fn test_stop_then_resume() {
    let harness = TestHarness::new().await;
    harness.sink.set_write_delay(Duration::from_millis(20)).await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());
    let request = LaunchRequest::new(Strategy::Sequential, 42, "pause");

    let launched = orchestrator.launch(request.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.stop(&launched.job_run_id).await.unwrap();

    let report = orchestrator.wait(&launched.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Stopped);
    assert!(!report.active);

    let partition = &report.partitions[0];
    assert_eq!(partition.status, PartitionStatus::NotStarted);
    assert!(partition.checkpoint_offset < 100);
    assert_eq!(partition.checkpoint_offset % 10, 0);
    assert_eq!(
        harness.sink.count(42).await,
        partition.checkpoint_offset
    );

    harness.sink.set_write_delay(Duration::ZERO).await;
    let resumed = orchestrator.launch(request).await.unwrap();
    assert_eq!(resumed.kind, LaunchKind::Resumed);

    let report = orchestrator.wait(&resumed.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Completed);
    assert_eq!(harness.sink.seat_indices(42).await, all_seats(100));
}

#[tokio::test]
async fn test_timed_out_partition_is_redispatched_then_fails() {
    let harness = TestHarness::new().await;
    harness.sink.set_write_delay(Duration::from_millis(10)).await;
    let orchestrator = harness.create_orchestrator(
        TestHarness::config()
            .with_partition_timeout_ms(35)
            .with_partition_attempts(2),
    );
    let request = LaunchRequest::new(Strategy::Sequential, 42, "slow");

    let launched = orchestrator.launch(request.clone()).await.unwrap();
    let report = orchestrator.wait(&launched.job_run_id).await.unwrap();

    assert_eq!(report.status(), JobStatus::Failed);
    let partition = &report.partitions[0];
    assert_eq!(partition.status, PartitionStatus::TimedOut);
    assert_eq!(partition.attempts, 2);
    assert!(partition.checkpoint_offset > 0);
    assert!(partition.checkpoint_offset < 100);
    assert_eq!(harness.sink.count(42).await, partition.checkpoint_offset);

    // A relaunch resumes where the timeouts left off
    harness.sink.set_write_delay(Duration::ZERO).await;
    let resumed = orchestrator.launch(request).await.unwrap();
    let report = orchestrator.wait(&resumed.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Completed);
    assert_eq!(harness.sink.seat_indices(42).await, all_seats(100));
}

#[tokio::test]
async fn test_interrupted_run_is_recovered_and_resumed() {
    let harness = TestHarness::new().await;

    // A previous process committed seats [0, 40) but only checkpointed 30
    let run = harness
        .jobs
        .create_run(
            NewJobRun {
                strategy: Strategy::Sequential,
                fingerprint: Fingerprint::new(42, "crash"),
                grid_size: 1,
                thread_pool_size: 1,
                chunk_size: 10,
                ticket_amount: 100,
            },
            &[SeatRange::new(0, 100)],
        )
        .unwrap();
    harness
        .jobs
        .transition_run(&run.id, &[JobStatus::Created], JobStatus::Running)
        .unwrap();
    let partition_id = harness.jobs.partitions(&run.id).unwrap()[0].id;
    harness
        .jobs
        .transition_partition(
            partition_id,
            &[PartitionStatus::NotStarted],
            PartitionStatus::Running,
            None,
        )
        .unwrap();
    harness.jobs.advance_checkpoint(partition_id, 30).unwrap();

    let layout = SeatLayout::from_snapshot(&fixtures::concert_snapshot(42, 100)).unwrap();
    for start in (0..40).step_by(10) {
        let tickets = layout.build_tickets(SeatRange::new(start, start + 10)).unwrap();
        harness.sink.write_chunk(42, &tickets).await.unwrap();
    }

    let orchestrator = harness.create_orchestrator(TestHarness::config());
    let request = LaunchRequest::new(Strategy::Sequential, 42, "crash");

    // Still marked running until recovery
    let result = orchestrator.launch(request.clone()).await;
    assert!(matches!(result, Err(JobError::JobAlreadyRunning { .. })));

    let recovered = orchestrator.recover_interrupted().await.unwrap();
    assert_eq!(recovered, vec![run.id.clone()]);

    let report = orchestrator.status(&run.id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Stopped);
    assert_eq!(report.partitions[0].status, PartitionStatus::NotStarted);
    assert_eq!(report.partitions[0].checkpoint_offset, 30);

    let resumed = orchestrator.launch(request).await.unwrap();
    assert_eq!(resumed.kind, LaunchKind::Resumed);
    assert_eq!(resumed.job_run_id, run.id);

    let report = orchestrator.wait(&run.id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Completed);
    assert_eq!(harness.sink.seat_indices(42).await, all_seats(100));
}

#[tokio::test]
async fn test_invalid_layout_creates_nothing() {
    let harness = TestHarness::new().await;
    harness
        .catalog
        .add_concert(fixtures::misallocated_snapshot(9, 50))
        .await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());

    let result = orchestrator
        .launch(LaunchRequest::new(Strategy::Sequential, 9, "bad"))
        .await;
    assert!(matches!(result, Err(JobError::InvalidParameters(_))));

    assert!(orchestrator.list_runs(&JobRunFilter::new()).unwrap().is_empty());
    assert_eq!(harness.sink.write_calls().await, 0);
}

#[tokio::test]
async fn test_shutdown_stops_active_runs() {
    let harness = TestHarness::new().await;
    harness.sink.set_write_delay(Duration::from_millis(20)).await;
    let orchestrator = harness.create_orchestrator(TestHarness::config());

    let launched = orchestrator
        .launch(LaunchRequest::new(Strategy::Partitioned, 42, "bye").with_grid_size(2))
        .await
        .unwrap();
    assert_eq!(orchestrator.active_runs().await, vec![launched.job_run_id.clone()]);

    orchestrator.shutdown().await;

    let report = orchestrator.status(&launched.job_run_id).await.unwrap();
    assert_eq!(report.status(), JobStatus::Stopped);
    assert!(orchestrator.active_runs().await.is_empty());
}
