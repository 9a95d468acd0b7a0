//! Thread-pool strategy: many workers share one partition.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

use super::SeatCursor;
use crate::partition::{uncovered, SeatRange};
use crate::processor::{
    ChunkError, ChunkProcessor, PartitionFailure, PartitionOutcome, PartitionWork,
};

/// How a single pool worker stopped.
#[derive(Debug)]
enum WorkerExit {
    /// The cursor ran dry.
    Drained { tickets_written: u64 },
    /// Another worker failed, or the run was cancelled.
    Halted { tickets_written: u64 },
    Failed(PartitionFailure),
}

pub(super) async fn run(
    processor: Arc<ChunkProcessor>,
    work: PartitionWork,
    threads: NonZeroUsize,
) -> PartitionOutcome {
    let span = info_span!(
        "partition",
        job_run_id = %work.partition.job_run_id,
        ordinal = work.partition.ordinal,
        range = %work.partition.range,
        threads = threads.get(),
    );

    async move {
        let partition = match processor.claim(&work.partition) {
            Ok(p) => p,
            Err(failure) => return PartitionOutcome::Failed(failure),
        };

        let pending = pending_ranges(&processor, &work);
        let outcome = drive(&processor, &work, partition.id, pending, threads).await;
        processor.finish(&partition, &outcome);
        outcome
    }
    .instrument(span)
    .await
}

/// Gaps of the partition not yet recorded as committed.
fn pending_ranges(
    processor: &ChunkProcessor,
    work: &PartitionWork,
) -> Result<Vec<SeatRange>, PartitionFailure> {
    let partition = &work.partition;
    let mut covered = processor
        .jobs()
        .committed_ranges(partition.id)
        .map_err(|e| PartitionFailure::Checkpoint(e.to_string()))?;
    // A sequential checkpoint also marks its prefix as done
    covered.push(SeatRange::new(partition.range.start, partition.checkpoint_offset));

    Ok(uncovered(partition.range, &covered))
}

async fn drive(
    processor: &Arc<ChunkProcessor>,
    work: &PartitionWork,
    partition_id: i64,
    pending: Result<Vec<SeatRange>, PartitionFailure>,
    threads: NonZeroUsize,
) -> PartitionOutcome {
    let pending = match pending {
        Ok(pending) => pending,
        Err(failure) => return PartitionOutcome::Failed(failure),
    };

    let cursor = Arc::new(SeatCursor::new(pending, work.chunk_size));
    // Workers beyond the chunk count would never claim anything
    let worker_count = usize::try_from(cursor.len())
        .map_or(threads.get(), |chunks| chunks.min(threads.get()));
    info!(
        pending_chunks = cursor.len(),
        workers = worker_count,
        "Thread pool starting"
    );

    let halt = work.cancel.child_token();
    let deadline = processor.deadline();

    let mut workers = JoinSet::new();
    for _ in 0..worker_count {
        let processor = processor.clone();
        let cursor = cursor.clone();
        let halt = halt.clone();
        let layout = work.layout.clone();
        let reconcile = work.reconcile;

        workers.spawn(async move {
            let mut tickets_written = 0;
            loop {
                if halt.is_cancelled() {
                    return WorkerExit::Halted { tickets_written };
                }
                if let Some(failure) = processor.check_deadline(deadline) {
                    halt.cancel();
                    return WorkerExit::Failed(failure);
                }
                let Some(range) = cursor.claim() else {
                    return WorkerExit::Drained { tickets_written };
                };

                if reconcile {
                    let present = processor
                        .sink()
                        .count_in_range(layout.concert_id(), range)
                        .await;
                    match present {
                        Ok(present) if present == range.len() => {
                            let recorded =
                                processor.jobs().record_committed_range(partition_id, range);
                            if let Err(e) = recorded {
                                halt.cancel();
                                return WorkerExit::Failed(PartitionFailure::Checkpoint(
                                    e.to_string(),
                                ));
                            }
                            continue;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            halt.cancel();
                            return WorkerExit::Failed(PartitionFailure::Fatal(e.to_string()));
                        }
                    }
                }

                match processor.commit_chunk(&layout, range, &halt).await {
                    Ok(written) => tickets_written += written,
                    Err(ChunkError::Cancelled) => return WorkerExit::Halted { tickets_written },
                    Err(ChunkError::Failed(failure)) => {
                        halt.cancel();
                        return WorkerExit::Failed(failure);
                    }
                }

                if let Err(e) = processor.jobs().record_committed_range(partition_id, range) {
                    halt.cancel();
                    return WorkerExit::Failed(PartitionFailure::Checkpoint(e.to_string()));
                }
            }
        });
    }

    // Completion barrier: every worker must return before the outcome is known
    let mut tickets_written = 0;
    let mut failure = None;
    let mut halted = false;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(WorkerExit::Drained { tickets_written: n }) => tickets_written += n,
            Ok(WorkerExit::Halted { tickets_written: n }) => {
                tickets_written += n;
                halted = true;
            }
            Ok(WorkerExit::Failed(f)) => {
                failure.get_or_insert(f);
            }
            Err(e) => {
                error!(error = %e, "Pool worker panicked");
                halt.cancel();
                failure.get_or_insert(PartitionFailure::Fatal(format!("worker panicked: {}", e)));
            }
        }
    }

    if let Some(failure) = failure {
        return PartitionOutcome::Failed(failure);
    }
    if halted || !cursor.is_exhausted() {
        return PartitionOutcome::Stopped;
    }

    if let Err(e) = processor
        .jobs()
        .advance_checkpoint(partition_id, work.partition.range.end)
    {
        return PartitionOutcome::Failed(PartitionFailure::Checkpoint(e.to_string()));
    }

    PartitionOutcome::Completed { tickets_written }
}
