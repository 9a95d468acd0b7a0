//! Chunk processor: materializes a seat range and commits it chunk by chunk.

use std::num::NonZeroU64;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::config::ProcessorConfig;
use super::types::{ChunkError, PartitionFailure, PartitionOutcome, PartitionWork};
use crate::catalog::SeatLayout;
use crate::job::{JobStore, Partition, PartitionStatus};
use crate::metrics;
use crate::partition::SeatRange;
use crate::ticket::{SinkError, TicketSink};

/// Turns seat ranges into ticket rows and commits them in bounded chunks.
///
/// Each chunk is one `write_chunk` call, so it is committed atomically or
/// not at all. The partition checkpoint is advanced only after the sink
/// reports a commit.
pub struct ChunkProcessor {
    config: ProcessorConfig,
    sink: Arc<dyn TicketSink>,
    jobs: Arc<dyn JobStore>,
}

impl ChunkProcessor {
    pub fn new(
        config: ProcessorConfig,
        sink: Arc<dyn TicketSink>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self { config, sink, jobs }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn TicketSink> {
        &self.sink
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Deadline for a dispatch starting now, if a partition timeout is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.config.partition_timeout.map(|timeout| Instant::now() + timeout)
    }

    /// Process one partition from its checkpoint to the end of its range.
    ///
    /// The partition is persisted as `Running` before any ticket is written,
    /// and its final status is persisted before this returns.
    pub async fn process_partition(&self, work: PartitionWork) -> PartitionOutcome {
        let span = info_span!(
            "partition",
            job_run_id = %work.partition.job_run_id,
            ordinal = work.partition.ordinal,
            range = %work.partition.range,
        );

        async move {
            let partition = match self.claim(&work.partition) {
                Ok(p) => p,
                Err(failure) => return PartitionOutcome::Failed(failure),
            };

            let outcome = self.run_partition(&partition, &work).await;
            self.finish(&partition, &outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    /// Mark a dispatchable partition `Running`.
    pub fn claim(&self, partition: &Partition) -> Result<Partition, PartitionFailure> {
        let claimed = self
            .jobs
            .transition_partition(
                partition.id,
                PartitionStatus::DISPATCHABLE,
                PartitionStatus::Running,
                None,
            )
            .map_err(|e| {
                warn!(partition_id = partition.id, error = %e, "Could not claim partition");
                PartitionFailure::Checkpoint(e.to_string())
            })?;

        info!(
            partition_id = claimed.id,
            checkpoint = claimed.checkpoint_offset,
            attempt = claimed.attempts,
            "Partition started"
        );
        Ok(claimed)
    }

    /// Persist the status that follows `outcome` for a claimed partition.
    pub fn finish(&self, partition: &Partition, outcome: &PartitionOutcome) {
        metrics::PARTITION_OUTCOMES
            .with_label_values(&[outcome.label()])
            .inc();

        let error_text = match outcome {
            PartitionOutcome::Failed(failure) => Some(failure.to_string()),
            _ => None,
        };

        match outcome {
            PartitionOutcome::Completed { tickets_written } => {
                info!(partition_id = partition.id, tickets_written, "Partition completed")
            }
            PartitionOutcome::Failed(failure) => {
                error!(partition_id = partition.id, error = %failure, "Partition failed")
            }
            PartitionOutcome::Stopped => {
                info!(partition_id = partition.id, "Partition stopped")
            }
        }

        if let Err(e) = self.jobs.transition_partition(
            partition.id,
            &[PartitionStatus::Running],
            outcome.status(),
            error_text.as_deref(),
        ) {
            error!(
                partition_id = partition.id,
                error = %e,
                "Failed to persist partition outcome"
            );
        }
    }

    async fn run_partition(&self, partition: &Partition, work: &PartitionWork) -> PartitionOutcome {
        let deadline = self.deadline();

        let mut offset = partition.checkpoint_offset;
        if work.reconcile {
            offset = match self
                .reconcile(partition, work.layout.concert_id(), work.chunk_size)
                .await
            {
                Ok(offset) => offset,
                Err(failure) => return PartitionOutcome::Failed(failure),
            };
        }

        let mut tickets_written = 0;
        for chunk in partition.range.from_offset(offset).chunks(work.chunk_size) {
            if work.cancel.is_cancelled() {
                return PartitionOutcome::Stopped;
            }
            if let Some(failure) = self.check_deadline(deadline) {
                return PartitionOutcome::Failed(failure);
            }

            match self.commit_chunk(&work.layout, chunk, &work.cancel).await {
                Ok(written) => tickets_written += written,
                Err(ChunkError::Cancelled) => return PartitionOutcome::Stopped,
                Err(ChunkError::Failed(failure)) => return PartitionOutcome::Failed(failure),
            }

            if let Err(e) = self.jobs.advance_checkpoint(partition.id, chunk.end) {
                return PartitionOutcome::Failed(PartitionFailure::Checkpoint(e.to_string()));
            }
        }

        PartitionOutcome::Completed { tickets_written }
    }

    /// Returns a timeout failure once `deadline` has passed.
    pub fn check_deadline(&self, deadline: Option<Instant>) -> Option<PartitionFailure> {
        match (deadline, self.config.partition_timeout) {
            (Some(deadline), Some(timeout)) if Instant::now() >= deadline => {
                warn!(?timeout, "Partition time budget exhausted");
                Some(PartitionFailure::Timeout(timeout))
            }
            _ => None,
        }
    }

    /// Advance past leading chunks the sink already holds in full.
    ///
    /// A crash between a chunk commit and its checkpoint write leaves the
    /// chunk in the sink with the checkpoint behind it.
    async fn reconcile(
        &self,
        partition: &Partition,
        concert_id: i64,
        chunk_size: NonZeroU64,
    ) -> Result<u64, PartitionFailure> {
        let mut offset = partition.checkpoint_offset;

        for chunk in partition.remaining().chunks(chunk_size) {
            let present = self
                .sink
                .count_in_range(concert_id, chunk)
                .await
                .map_err(sink_failure)?;
            if present != chunk.len() {
                break;
            }
            offset = chunk.end;
        }

        if offset > partition.checkpoint_offset {
            info!(
                partition_id = partition.id,
                from = partition.checkpoint_offset,
                to = offset,
                "Checkpoint reconciled with committed tickets"
            );
            self.jobs
                .advance_checkpoint(partition.id, offset)
                .map_err(|e| PartitionFailure::Checkpoint(e.to_string()))?;
        }

        Ok(offset)
    }

    /// Build and commit one chunk, retrying transient failures with backoff.
    ///
    /// Seat collisions and fatal errors fail immediately.
    pub async fn commit_chunk(
        &self,
        layout: &SeatLayout,
        range: SeatRange,
        cancel: &CancellationToken,
    ) -> Result<u64, ChunkError> {
        let tickets = layout
            .build_tickets(range)
            .map_err(|e| ChunkError::Failed(PartitionFailure::Fatal(e.to_string())))?;
        let concert_id = layout.concert_id();
        let retry = &self.config.retry;

        let mut retries = 0;
        loop {
            let started = std::time::Instant::now();
            let result = self.sink.write_chunk(concert_id, &tickets).await;
            let elapsed = started.elapsed().as_secs_f64();

            let err = match result {
                Ok(written) => {
                    metrics::CHUNK_COMMIT_DURATION
                        .with_label_values(&["committed"])
                        .observe(elapsed);
                    metrics::CHUNK_COMMITS.with_label_values(&["committed"]).inc();
                    metrics::TICKETS_WRITTEN.inc_by(written);
                    debug!(%range, written, "Chunk committed");
                    return Ok(written);
                }
                Err(err) => err,
            };

            metrics::CHUNK_COMMIT_DURATION
                .with_label_values(&["failed"])
                .observe(elapsed);

            match err {
                SinkError::Transient(message) => {
                    metrics::CHUNK_COMMITS.with_label_values(&["transient"]).inc();

                    if retries >= retry.max_retries {
                        return Err(ChunkError::Failed(PartitionFailure::RetriesExhausted {
                            range,
                            attempts: retries + 1,
                            last_error: message,
                        }));
                    }

                    retries += 1;
                    metrics::CHUNK_RETRIES.inc();
                    let delay = retry.delay_for_retry(retries);
                    warn!(
                        %range,
                        retry = retries,
                        max_retries = retry.max_retries,
                        ?delay,
                        error = %message,
                        "Transient chunk failure, retrying"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ChunkError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                SinkError::SeatCollision {
                    concert_id,
                    seat_index,
                } => {
                    metrics::CHUNK_COMMITS.with_label_values(&["collision"]).inc();
                    return Err(ChunkError::Failed(PartitionFailure::SeatCollision {
                        concert_id,
                        seat_index,
                    }));
                }
                other => {
                    metrics::CHUNK_COMMITS.with_label_values(&["fatal"]).inc();
                    return Err(ChunkError::Failed(sink_failure(other)));
                }
            }
        }
    }
}

fn sink_failure(err: SinkError) -> PartitionFailure {
    match err {
        SinkError::SeatCollision {
            concert_id,
            seat_index,
        } => PartitionFailure::SeatCollision {
            concert_id,
            seat_index,
        },
        other => PartitionFailure::Fatal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::job::{Fingerprint, JobStatus, NewJobRun, SqliteJobStore, Strategy};
    use crate::processor::RetryConfig;
    use crate::testing::{fixtures, MockTicketSink};

    struct Setup {
        processor: ChunkProcessor,
        sink: Arc<MockTicketSink>,
        jobs: Arc<SqliteJobStore>,
        partitions: Vec<Partition>,
        layout: Arc<SeatLayout>,
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::default().with_delays(1, 5)
    }

    fn setup(config: ProcessorConfig) -> Setup {
        let sink = Arc::new(MockTicketSink::new());
        let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
        let run = jobs
            .create_run(
                NewJobRun {
                    strategy: Strategy::Partitioned,
                    fingerprint: Fingerprint::new(42, "test"),
                    grid_size: 4,
                    thread_pool_size: 1,
                    chunk_size: 10,
                    ticket_amount: 100,
                },
                &[
                    SeatRange::new(0, 25),
                    SeatRange::new(25, 50),
                    SeatRange::new(50, 75),
                    SeatRange::new(75, 100),
                ],
            )
            .unwrap();
        jobs.transition_run(&run.id, &[JobStatus::Created], JobStatus::Running)
            .unwrap();
        let partitions = jobs.partitions(&run.id).unwrap();
        let layout =
            Arc::new(SeatLayout::from_snapshot(&fixtures::concert_snapshot(42, 100)).unwrap());

        Setup {
            processor: ChunkProcessor::new(config, sink.clone(), jobs.clone()),
            sink,
            jobs,
            partitions,
            layout,
        }
    }

    fn work(setup: &Setup, ordinal: usize, cancel: CancellationToken) -> PartitionWork {
        PartitionWork {
            partition: setup.partitions[ordinal].clone(),
            layout: setup.layout.clone(),
            chunk_size: NonZeroU64::new(10).unwrap(),
            reconcile: false,
            cancel,
        }
    }

    #[tokio::test]
    async fn test_partition_completes_with_checkpoint_at_end() {
        let setup = setup(ProcessorConfig::default());

        let outcome = setup
            .processor
            .process_partition(work(&setup, 1, CancellationToken::new()))
            .await;
        assert_eq!(outcome, PartitionOutcome::Completed { tickets_written: 25 });

        let partition = setup.jobs.get_partition(setup.partitions[1].id).unwrap().unwrap();
        assert_eq!(partition.status, PartitionStatus::Completed);
        assert_eq!(partition.checkpoint_offset, 50);
        assert_eq!(partition.committed_count, 25);

        assert_eq!(setup.sink.seat_indices(42).await, (25..50).collect::<Vec<u64>>());
        // Chunks of 10, 10, 5 in ascending order
        let chunks = setup.sink.committed_chunks().await;
        assert_eq!(
            chunks,
            vec![
                SeatRange::new(25, 35),
                SeatRange::new(35, 45),
                SeatRange::new(45, 50)
            ]
        );
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let setup = setup(ProcessorConfig::default().with_retry(fast_retry()));
        // Third chunk of [25, 50) starts at seat 45
        setup.sink.inject_transient_failures(45, 2).await;

        let outcome = setup
            .processor
            .process_partition(work(&setup, 1, CancellationToken::new()))
            .await;
        assert_eq!(outcome, PartitionOutcome::Completed { tickets_written: 25 });
        assert_eq!(setup.sink.count(42).await, 25);
        assert_eq!(setup.sink.write_calls().await, 5);
    }

    #[tokio::test]
    async fn test_retries_exhausted_keeps_checkpoint_at_chunk_boundary() {
        let setup = setup(
            ProcessorConfig::default().with_retry(fast_retry().with_max_retries(2)),
        );
        setup.sink.inject_transient_failures(45, 10).await;

        let outcome = setup
            .processor
            .process_partition(work(&setup, 1, CancellationToken::new()))
            .await;
        assert!(matches!(
            outcome,
            PartitionOutcome::Failed(PartitionFailure::RetriesExhausted { attempts: 3, .. })
        ));

        let partition = setup.jobs.get_partition(setup.partitions[1].id).unwrap().unwrap();
        assert_eq!(partition.status, PartitionStatus::Failed);
        assert_eq!(partition.checkpoint_offset, 45);
        assert!(partition.last_error.is_some());
        assert_eq!(setup.sink.count(42).await, 20);
    }

    #[tokio::test]
    async fn test_collision_fails_without_retry() {
        let setup = setup(ProcessorConfig::default().with_retry(fast_retry()));
        setup.sink.seed_existing(42, 60).await;

        let outcome = setup
            .processor
            .process_partition(work(&setup, 2, CancellationToken::new()))
            .await;
        assert_eq!(
            outcome,
            PartitionOutcome::Failed(PartitionFailure::SeatCollision {
                concert_id: 42,
                seat_index: 60
            })
        );
        // First chunk [50, 60) committed, second [60, 70) rejected once
        assert_eq!(setup.sink.write_calls().await, 2);
        let partition = setup.jobs.get_partition(setup.partitions[2].id).unwrap().unwrap();
        assert_eq!(partition.checkpoint_offset, 60);
    }

    #[tokio::test]
    async fn test_cancelled_partition_returns_to_not_started() {
        let setup = setup(ProcessorConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = setup.processor.process_partition(work(&setup, 0, cancel)).await;
        assert_eq!(outcome, PartitionOutcome::Stopped);

        let partition = setup.jobs.get_partition(setup.partitions[0].id).unwrap().unwrap();
        assert_eq!(partition.status, PartitionStatus::NotStarted);
        assert_eq!(partition.attempts, 1);
        assert_eq!(setup.sink.count(42).await, 0);
    }

    #[tokio::test]
    async fn test_timeout_marks_partition_timed_out() {
        let setup =
            setup(ProcessorConfig::default().with_partition_timeout(Duration::from_millis(20)));
        setup.sink.set_write_delay(Duration::from_millis(15)).await;

        let outcome = setup
            .processor
            .process_partition(work(&setup, 3, CancellationToken::new()))
            .await;
        assert!(matches!(
            outcome,
            PartitionOutcome::Failed(PartitionFailure::Timeout(_))
        ));

        let partition = setup.jobs.get_partition(setup.partitions[3].id).unwrap().unwrap();
        assert_eq!(partition.status, PartitionStatus::TimedOut);
        assert!(partition.checkpoint_offset > 75);
        assert!(partition.checkpoint_offset < 100);
    }

    #[tokio::test]
    async fn test_resume_starts_at_checkpoint() {
        let setup = setup(ProcessorConfig::default());
        let id = setup.partitions[1].id;
        setup.jobs.advance_checkpoint(id, 35).unwrap();

        let mut resumed = work(&setup, 1, CancellationToken::new());
        resumed.partition = setup.jobs.get_partition(id).unwrap().unwrap();

        let outcome = setup.processor.process_partition(resumed).await;
        assert_eq!(outcome, PartitionOutcome::Completed { tickets_written: 15 });
        assert_eq!(setup.sink.seat_indices(42).await, (35..50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_reconcile_skips_chunks_committed_before_checkpoint_write() {
        let setup = setup(ProcessorConfig::default());
        // Simulate a commit whose checkpoint write was lost
        let tickets = setup.layout.build_tickets(SeatRange::new(25, 35)).unwrap();
        setup.sink.write_chunk(42, &tickets).await.unwrap();

        let mut resumed = work(&setup, 1, CancellationToken::new());
        resumed.reconcile = true;

        let outcome = setup.processor.process_partition(resumed).await;
        assert_eq!(outcome, PartitionOutcome::Completed { tickets_written: 15 });
        assert_eq!(setup.sink.count(42).await, 25);

        let partition = setup.jobs.get_partition(setup.partitions[1].id).unwrap().unwrap();
        assert_eq!(partition.committed_count, 25);
    }
}
