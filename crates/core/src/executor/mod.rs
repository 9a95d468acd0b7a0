//! Concurrency executor: drives chunk processors in parallel.
//!
//! Two modes are supported:
//! - Partition-parallel: one worker per partition, bounded by a semaphore.
//! - Thread-pool: `T` workers share one partition through a [`SeatCursor`].
//!
//! Both return only after every spawned worker has finished.

mod cursor;
mod pool;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::processor::{ChunkProcessor, PartitionOutcome, PartitionWork};

pub use cursor::SeatCursor;

/// Configuration for the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum partitions processed at once (0 = unlimited).
    pub max_concurrent_partitions: usize,
}

/// What happened to the partitions handed to one executor pass.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Outcome per dispatched partition id.
    pub outcomes: Vec<(i64, PartitionOutcome)>,
    /// Partitions never dispatched because cancellation came first.
    pub undispatched: Vec<i64>,
    /// Workers that panicked; their partitions are left `Running`.
    pub panicked: usize,
}

impl ExecutionReport {
    pub fn tickets_written(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|(_, outcome)| match outcome {
                PartitionOutcome::Completed { tickets_written } => *tickets_written,
                _ => 0,
            })
            .sum()
    }
}

/// Runs chunk processors concurrently.
pub struct ConcurrencyExecutor {
    config: ExecutorConfig,
    processor: Arc<ChunkProcessor>,
}

impl ConcurrencyExecutor {
    pub fn new(config: ExecutorConfig, processor: Arc<ChunkProcessor>) -> Self {
        Self { config, processor }
    }

    pub fn processor(&self) -> &Arc<ChunkProcessor> {
        &self.processor
    }

    /// Process each partition on its own task, at most
    /// `max_concurrent_partitions` at a time.
    ///
    /// A permit is acquired before a partition is dispatched, so partitions
    /// still waiting when `cancel` fires are never touched.
    pub async fn run_partitions(
        &self,
        works: Vec<PartitionWork>,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let semaphore = (self.config.max_concurrent_partitions > 0)
            .then(|| Arc::new(Semaphore::new(self.config.max_concurrent_partitions)));

        let mut report = ExecutionReport::default();
        let mut workers = JoinSet::new();

        for work in works {
            let partition_id = work.partition.id;

            let permit = match &semaphore {
                Some(semaphore) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        permit = semaphore.clone().acquire_owned() => permit.ok(),
                    }
                }
                None => None,
            };

            if cancel.is_cancelled() || (semaphore.is_some() && permit.is_none()) {
                debug!(partition_id, "Partition left undispatched");
                report.undispatched.push(partition_id);
                continue;
            }

            let processor = self.processor.clone();
            workers.spawn(async move {
                let _permit = permit;
                let outcome = processor.process_partition(work).await;
                (partition_id, outcome)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(result) => report.outcomes.push(result),
                Err(e) => {
                    error!(error = %e, "Partition worker panicked");
                    report.panicked += 1;
                }
            }
        }

        report
    }

    /// Process one partition with `threads` workers sharing a seat cursor.
    pub async fn run_thread_pool(
        &self,
        work: PartitionWork,
        threads: std::num::NonZeroUsize,
    ) -> PartitionOutcome {
        pool::run(self.processor.clone(), work, threads).await
    }
}
