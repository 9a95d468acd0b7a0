//! Job orchestrator implementation.

use std::collections::HashMap;
use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::config::EngineConfig;
use super::types::{JobError, JobStatusReport, LaunchKind, LaunchRequest, Launched};
use crate::catalog::{ConcertCatalog, SeatLayout};
use crate::executor::ConcurrencyExecutor;
use crate::job::{
    Fingerprint, JobRun, JobRunFilter, JobStatus, JobStore, JobStoreError, NewJobRun, Partition,
    PartitionStatus, Strategy,
};
use crate::metrics;
use crate::partition::{RangePartitioner, SeatRange};
use crate::processor::{ChunkProcessor, PartitionWork};
use crate::ticket::TicketSink;

/// A run executing in this process.
struct ActiveRun {
    generation: u64,
    cancel: CancellationToken,
    done: watch::Receiver<Option<JobStatus>>,
}

/// Launch parameters after defaults and validation.
#[derive(Debug, Clone, Copy)]
struct RunParameters {
    grid_size: NonZeroU64,
    thread_pool_size: NonZeroU64,
    chunk_size: NonZeroU64,
}

/// Single entry point for launching, resuming, and observing job runs.
///
/// Single-flight per fingerprint holds across processes through the job
/// store's compare-and-swap transitions; launches within one process are
/// additionally serialized.
pub struct JobOrchestrator {
    config: EngineConfig,
    catalog: Arc<dyn ConcertCatalog>,
    sink: Arc<dyn TicketSink>,
    jobs: Arc<dyn JobStore>,
    executor: Arc<ConcurrencyExecutor>,

    // Runtime state
    active: Arc<RwLock<HashMap<String, ActiveRun>>>,
    launch_lock: Mutex<()>,
    next_generation: AtomicU64,
}

impl JobOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn ConcertCatalog>,
        sink: Arc<dyn TicketSink>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        let processor = Arc::new(ChunkProcessor::new(
            config.processor_config(),
            Arc::clone(&sink),
            Arc::clone(&jobs),
        ));
        let executor = Arc::new(ConcurrencyExecutor::new(config.executor_config(), processor));

        Self {
            config,
            catalog,
            sink,
            jobs,
            executor,
            active: Arc::new(RwLock::new(HashMap::new())),
            launch_lock: Mutex::new(()),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Launch a run for the request's fingerprint.
    ///
    /// Returns once the run is persisted as `Running`; processing continues
    /// in the background. A failed or stopped run is resumed, a completed one
    /// is rejected unless `force` is set.
    pub async fn launch(&self, request: LaunchRequest) -> Result<Launched, JobError> {
        let strategy = request.strategy;
        let result = self.try_launch(request).await;

        let outcome = match &result {
            Ok(launched) => launched.kind.as_str(),
            Err(_) => "rejected",
        };
        metrics::JOB_LAUNCHES
            .with_label_values(&[strategy.as_str(), outcome])
            .inc();

        if let Err(e) = &result {
            warn!(%strategy, error = %e, "Launch rejected");
        }
        result
    }

    async fn try_launch(&self, request: LaunchRequest) -> Result<Launched, JobError> {
        let params = self.resolve_parameters(&request)?;

        let snapshot = self.catalog.snapshot(request.concert_id).await?;
        let layout = Arc::new(
            SeatLayout::from_snapshot(&snapshot)
                .map_err(|e| JobError::InvalidParameters(e.to_string()))?,
        );
        let fingerprint = Fingerprint::new(request.concert_id, request.run_key.clone());

        let _guard = self.launch_lock.lock().await;

        let Some(existing) = self.jobs.find_by_fingerprint(&fingerprint)? else {
            return self.start_new(request.strategy, fingerprint, params, layout).await;
        };

        match existing.status {
            JobStatus::Running => Err(JobError::JobAlreadyRunning {
                job_run_id: existing.id,
            }),
            JobStatus::Completed if !request.force => Err(JobError::JobAlreadyComplete {
                job_run_id: existing.id,
            }),
            JobStatus::Completed => self.verify_completed(&existing).await,
            JobStatus::Created | JobStatus::Failed | JobStatus::Stopped => {
                self.resume(existing, &request, params, layout).await
            }
        }
    }

    fn resolve_parameters(&self, request: &LaunchRequest) -> Result<RunParameters, JobError> {
        if request.run_key.trim().is_empty() {
            return Err(JobError::InvalidParameters(
                "run_key must not be empty".to_string(),
            ));
        }

        let chunk_size = positive(
            "chunk_size",
            request.chunk_size.unwrap_or(self.config.chunk_size),
        )?;

        let (grid_size, thread_pool_size) = match request.strategy {
            Strategy::Sequential => (NonZeroU64::MIN, NonZeroU64::MIN),
            Strategy::Partitioned => (
                bounded(
                    "grid_size",
                    request.grid_size.unwrap_or(self.config.grid_size),
                    self.config.max_grid_size,
                )?,
                NonZeroU64::MIN,
            ),
            Strategy::Multithreaded => (
                NonZeroU64::MIN,
                bounded(
                    "thread_pool_size",
                    request.thread_pool_size.unwrap_or(self.config.thread_pool_size),
                    self.config.max_thread_pool_size,
                )?,
            ),
        };

        Ok(RunParameters {
            grid_size,
            thread_pool_size,
            chunk_size,
        })
    }

    async fn start_new(
        &self,
        strategy: Strategy,
        fingerprint: Fingerprint,
        params: RunParameters,
        layout: Arc<SeatLayout>,
    ) -> Result<Launched, JobError> {
        // An empty concert still gets one (empty) partition
        let seats = layout.ticket_amount().max(1);
        if params.grid_size.get() > seats {
            return Err(JobError::InvalidParameters(format!(
                "grid_size {} exceeds the {} seats of concert {}",
                params.grid_size,
                layout.ticket_amount(),
                layout.concert_id()
            )));
        }
        let plan = RangePartitioner::new(params.grid_size).plan(layout.ticket_amount());

        let created = self.jobs.create_run(
            NewJobRun {
                strategy,
                fingerprint: fingerprint.clone(),
                grid_size: params.grid_size.get(),
                thread_pool_size: params.thread_pool_size.get(),
                chunk_size: params.chunk_size.get(),
                ticket_amount: layout.ticket_amount(),
            },
            &plan,
        );

        let run = match created {
            Ok(run) => run,
            Err(JobStoreError::Conflict(_)) => {
                // Another process registered the fingerprint first
                let job_run_id = self
                    .jobs
                    .find_by_fingerprint(&fingerprint)?
                    .map(|run| run.id)
                    .unwrap_or_else(|| fingerprint.to_string());
                return Err(JobError::JobAlreadyRunning { job_run_id });
            }
            Err(e) => return Err(e.into()),
        };

        let run = self
            .jobs
            .transition_run(&run.id, &[JobStatus::Created], JobStatus::Running)?;

        info!(
            job_run_id = %run.id,
            %strategy,
            concert_id = run.concert_id,
            run_key = %run.run_key,
            ticket_amount = run.ticket_amount,
            partitions = plan.len(),
            "Job run created"
        );

        let job_run_id = run.id.clone();
        self.spawn_execution(run, layout, false, params.thread_pool_size)
            .await;

        Ok(Launched {
            job_run_id,
            kind: LaunchKind::Started,
        })
    }

    async fn resume(
        &self,
        existing: JobRun,
        request: &LaunchRequest,
        params: RunParameters,
        layout: Arc<SeatLayout>,
    ) -> Result<Launched, JobError> {
        if existing.strategy != request.strategy {
            return Err(JobError::InvalidParameters(format!(
                "job run {} was launched with strategy {}, not {}",
                existing.id, existing.strategy, request.strategy
            )));
        }
        if let Some(grid_size) = request.grid_size {
            if existing.strategy == Strategy::Partitioned && grid_size != existing.grid_size {
                return Err(JobError::InvalidParameters(format!(
                    "job run {} was planned with grid size {}, not {}",
                    existing.id, existing.grid_size, grid_size
                )));
            }
        }
        if layout.ticket_amount() != existing.ticket_amount {
            return Err(JobError::InvalidParameters(format!(
                "concert {} capacity changed from {} to {} since job run {} was planned",
                existing.concert_id,
                existing.ticket_amount,
                layout.ticket_amount(),
                existing.id
            )));
        }

        let grid_size = positive("grid_size", existing.grid_size)?;
        let expected_plan = RangePartitioner::new(grid_size).plan(existing.ticket_amount);
        let stored_plan: Vec<SeatRange> = self
            .jobs
            .partitions(&existing.id)?
            .iter()
            .map(|p| p.range)
            .collect();
        if stored_plan != expected_plan {
            return Err(JobError::InvalidParameters(format!(
                "stored partitions of job run {} do not match its plan",
                existing.id
            )));
        }

        let thread_pool_size = match request.thread_pool_size {
            Some(_) => params.thread_pool_size,
            None => positive("thread_pool_size", existing.thread_pool_size)?,
        };

        let run = match self.jobs.transition_run(
            &existing.id,
            &[JobStatus::Created, JobStatus::Failed, JobStatus::Stopped],
            JobStatus::Running,
        ) {
            Ok(run) => run,
            Err(JobStoreError::Conflict(_)) => {
                return Err(JobError::JobAlreadyRunning {
                    job_run_id: existing.id,
                })
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            job_run_id = %run.id,
            previous_status = %existing.status,
            "Resuming job run"
        );

        let job_run_id = run.id.clone();
        self.spawn_execution(run, layout, true, thread_pool_size)
            .await;

        Ok(Launched {
            job_run_id,
            kind: LaunchKind::Resumed,
        })
    }

    /// Forced rerun of a completed run: check the sink, write nothing.
    async fn verify_completed(&self, run: &JobRun) -> Result<Launched, JobError> {
        let actual = self.sink.count_for_concert(run.concert_id).await?;

        if actual != run.ticket_amount {
            return Err(JobError::VerificationFailed {
                job_run_id: run.id.clone(),
                expected: run.ticket_amount,
                actual,
            });
        }

        info!(
            job_run_id = %run.id,
            tickets = actual,
            "Completed job run verified, nothing to do"
        );
        Ok(Launched {
            job_run_id: run.id.clone(),
            kind: LaunchKind::Verified,
        })
    }

    async fn spawn_execution(
        &self,
        run: JobRun,
        layout: Arc<SeatLayout>,
        reconcile: bool,
        thread_pool_size: NonZeroU64,
    ) {
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        self.active.write().await.insert(
            run.id.clone(),
            ActiveRun {
                generation,
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        let threads = usize::try_from(thread_pool_size.get())
            .ok()
            .and_then(NonZeroUsize::new)
            .unwrap_or(NonZeroUsize::MIN);

        let context = RunContext {
            jobs: Arc::clone(&self.jobs),
            executor: Arc::clone(&self.executor),
            partition_attempts: self.config.partition_attempts,
        };
        let active = Arc::clone(&self.active);
        let span = info_span!(
            "job_run",
            job_run_id = %run.id,
            strategy = %run.strategy,
            concert_id = run.concert_id,
        );

        tokio::spawn(
            async move {
                let status = context
                    .execute(&run, layout, reconcile, threads, &cancel)
                    .await;

                {
                    let mut active = active.write().await;
                    if active.get(&run.id).map(|a| a.generation) == Some(generation) {
                        active.remove(&run.id);
                    }
                }
                let _ = done_tx.send(Some(status));
            }
            .instrument(span),
        );
    }

    /// Current state of a run.
    pub async fn status(&self, job_run_id: &str) -> Result<JobStatusReport, JobError> {
        let run = self
            .jobs
            .get_run(job_run_id)?
            .ok_or_else(|| JobError::JobNotFound(job_run_id.to_string()))?;
        let partitions = self.jobs.partitions(job_run_id)?;
        let tickets_written = partitions.iter().map(|p| p.committed_count).sum();
        let active = self.active.read().await.contains_key(job_run_id);

        Ok(JobStatusReport {
            run,
            partitions,
            tickets_written,
            active,
        })
    }

    /// Wait until the run is no longer executing in this process.
    pub async fn wait(&self, job_run_id: &str) -> Result<JobStatusReport, JobError> {
        let done = self
            .active
            .read()
            .await
            .get(job_run_id)
            .map(|a| a.done.clone());

        if let Some(mut done) = done {
            let _ = done.wait_for(Option::is_some).await;
        }

        self.status(job_run_id).await
    }

    /// Request operator cancellation, observed between chunks.
    pub async fn stop(&self, job_run_id: &str) -> Result<(), JobError> {
        if let Some(run) = self.active.read().await.get(job_run_id) {
            info!(job_run_id, "Stop requested");
            run.cancel.cancel();
            return Ok(());
        }

        match self.jobs.get_run(job_run_id)? {
            Some(run) => Err(JobError::NotRunning {
                job_run_id: run.id,
                status: run.status,
            }),
            None => Err(JobError::JobNotFound(job_run_id.to_string())),
        }
    }

    /// Reset runs left `Running` by a previous process so a relaunch resumes them.
    ///
    /// Refused while this process has runs executing.
    pub async fn recover_interrupted(&self) -> Result<Vec<String>, JobError> {
        let _guard = self.launch_lock.lock().await;

        if !self.active.read().await.is_empty() {
            return Err(JobError::InvalidParameters(
                "cannot recover while job runs are executing".to_string(),
            ));
        }

        let recovered = self.jobs.reset_interrupted()?;
        for job_run_id in &recovered {
            info!(%job_run_id, "Recovered interrupted job run");
        }
        if !recovered.is_empty() {
            info!("Recovered {} interrupted job runs", recovered.len());
        }
        Ok(recovered)
    }

    /// List persisted runs.
    pub fn list_runs(&self, filter: &JobRunFilter) -> Result<Vec<JobRun>, JobError> {
        Ok(self.jobs.list_runs(filter)?)
    }

    /// Ids of runs executing in this process.
    pub async fn active_runs(&self) -> Vec<String> {
        self.active.read().await.keys().cloned().collect()
    }

    /// Cancel every executing run and wait for all of them to settle.
    pub async fn shutdown(&self) {
        let pending: Vec<watch::Receiver<Option<JobStatus>>> = {
            let active = self.active.read().await;
            active
                .values()
                .map(|run| {
                    run.cancel.cancel();
                    run.done.clone()
                })
                .collect()
        };

        if !pending.is_empty() {
            info!("Stopping {} job runs", pending.len());
        }
        for mut done in pending {
            let _ = done.wait_for(Option::is_some).await;
        }
    }
}

fn positive(name: &str, value: u64) -> Result<NonZeroU64, JobError> {
    NonZeroU64::new(value)
        .ok_or_else(|| JobError::InvalidParameters(format!("{} must be at least 1", name)))
}

fn bounded(name: &str, value: u64, max: u64) -> Result<NonZeroU64, JobError> {
    let value = positive(name, value)?;
    if value.get() > max {
        return Err(JobError::InvalidParameters(format!(
            "{} {} exceeds the limit of {}",
            name, value, max
        )));
    }
    Ok(value)
}

/// State shared with a background run.
struct RunContext {
    jobs: Arc<dyn JobStore>,
    executor: Arc<ConcurrencyExecutor>,
    partition_attempts: u32,
}

impl RunContext {
    async fn execute(
        &self,
        run: &JobRun,
        layout: Arc<SeatLayout>,
        reconcile: bool,
        threads: NonZeroUsize,
        cancel: &CancellationToken,
    ) -> JobStatus {
        metrics::JOB_RUNS_ACTIVE.inc();
        let started = Instant::now();

        let status = match self.drive(run, layout, reconcile, threads, cancel).await {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "Job run bookkeeping failed");
                JobStatus::Failed
            }
        };

        if let Err(e) = self
            .jobs
            .transition_run(&run.id, &[JobStatus::Running], status)
        {
            error!(error = %e, "Failed to persist final job run status");
        }

        metrics::JOB_RUNS_ACTIVE.dec();
        metrics::JOB_RUN_DURATION
            .with_label_values(&[run.strategy.as_str(), status.as_str()])
            .observe(started.elapsed().as_secs_f64());

        info!(%status, elapsed_ms = started.elapsed().as_millis() as u64, "Job run finished");
        status
    }

    async fn drive(
        &self,
        run: &JobRun,
        layout: Arc<SeatLayout>,
        reconcile: bool,
        threads: NonZeroUsize,
        cancel: &CancellationToken,
    ) -> Result<JobStatus, JobStoreError> {
        let chunk_size = NonZeroU64::new(run.chunk_size)
            .ok_or_else(|| JobStoreError::Database(format!("job run {} has chunk size 0", run.id)))?;

        let mut dispatches: HashMap<i64, u32> = HashMap::new();
        let mut first_pass = true;

        loop {
            let batch: Vec<Partition> = self
                .jobs
                .partitions(&run.id)?
                .into_iter()
                .filter(|p| {
                    if first_pass {
                        p.status.is_dispatchable()
                    } else {
                        p.status == PartitionStatus::TimedOut
                            && dispatches.get(&p.id).copied().unwrap_or(0) < self.partition_attempts
                    }
                })
                .collect();

            if batch.is_empty() || cancel.is_cancelled() {
                break;
            }
            if !first_pass {
                info!(partitions = batch.len(), "Re-dispatching timed out partitions");
            }

            for partition in &batch {
                *dispatches.entry(partition.id).or_default() += 1;
            }

            let works: Vec<PartitionWork> = batch
                .into_iter()
                .map(|partition| PartitionWork {
                    partition,
                    layout: Arc::clone(&layout),
                    chunk_size,
                    reconcile,
                    cancel: cancel.clone(),
                })
                .collect();

            match run.strategy {
                Strategy::Multithreaded => {
                    for work in works {
                        self.executor.run_thread_pool(work, threads).await;
                    }
                }
                Strategy::Sequential | Strategy::Partitioned => {
                    self.executor.run_partitions(works, cancel).await;
                }
            }

            self.fail_orphaned(&run.id)?;
            first_pass = false;
        }

        Ok(final_status(&self.jobs.partitions(&run.id)?))
    }

    /// After the barrier a `Running` partition belongs to a worker that died.
    fn fail_orphaned(&self, job_run_id: &str) -> Result<(), JobStoreError> {
        for partition in self.jobs.partitions(job_run_id)? {
            if partition.status == PartitionStatus::Running {
                error!(partition_id = partition.id, "Partition worker exited without an outcome");
                self.jobs.transition_partition(
                    partition.id,
                    &[PartitionStatus::Running],
                    PartitionStatus::Failed,
                    Some("worker exited without reporting an outcome"),
                )?;
            }
        }
        Ok(())
    }
}

/// Aggregate partition states into the run's terminal status.
///
/// Failure wins over a stop: a run with a failed partition is `Failed` even
/// if it was also cancelled.
fn final_status(partitions: &[Partition]) -> JobStatus {
    if partitions
        .iter()
        .all(|p| p.status == PartitionStatus::Completed)
    {
        JobStatus::Completed
    } else if partitions
        .iter()
        .any(|p| matches!(p.status, PartitionStatus::Failed | PartitionStatus::TimedOut))
    {
        JobStatus::Failed
    } else {
        JobStatus::Stopped
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::job::SqliteJobStore;
    use crate::testing::{fixtures, MockConcertCatalog, MockTicketSink};

    fn partition(status: PartitionStatus) -> Partition {
        Partition {
            id: 1,
            job_run_id: "run".to_string(),
            ordinal: 0,
            range: SeatRange::new(0, 10),
            status,
            checkpoint_offset: 0,
            committed_count: 0,
            attempts: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_final_status_aggregation() {
        use PartitionStatus::*;

        assert_eq!(
            final_status(&[partition(Completed), partition(Completed)]),
            JobStatus::Completed
        );
        assert_eq!(
            final_status(&[partition(Completed), partition(TimedOut)]),
            JobStatus::Failed
        );
        assert_eq!(
            final_status(&[partition(Failed), partition(NotStarted)]),
            JobStatus::Failed
        );
        assert_eq!(
            final_status(&[partition(Completed), partition(NotStarted)]),
            JobStatus::Stopped
        );
    }

    async fn orchestrator() -> JobOrchestrator {
        let catalog = Arc::new(MockConcertCatalog::new());
        catalog.add_concert(fixtures::concert_snapshot(42, 100)).await;

        JobOrchestrator::new(
            EngineConfig::default(),
            catalog,
            Arc::new(MockTicketSink::new()),
            Arc::new(SqliteJobStore::in_memory().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_rejects_invalid_parameters() {
        let orchestrator = orchestrator().await;

        let cases = vec![
            LaunchRequest::new(Strategy::Sequential, 42, "r").with_chunk_size(0),
            LaunchRequest::new(Strategy::Partitioned, 42, "r").with_grid_size(0),
            LaunchRequest::new(Strategy::Multithreaded, 42, "r").with_thread_pool_size(0),
            LaunchRequest::new(Strategy::Sequential, 42, "  "),
            LaunchRequest::new(Strategy::Sequential, 7, "r"),
        ];

        for request in cases {
            let result = orchestrator.launch(request.clone()).await;
            assert!(
                matches!(result, Err(JobError::InvalidParameters(_))),
                "expected rejection for {:?}",
                request
            );
        }

        assert!(orchestrator
            .list_runs(&JobRunFilter::new())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_rejects_oversized_grid_and_pool() {
        let orchestrator = orchestrator().await;

        let cases = vec![
            LaunchRequest::new(Strategy::Partitioned, 42, "r").with_grid_size(u64::MAX),
            LaunchRequest::new(Strategy::Partitioned, 42, "r").with_grid_size(101),
            LaunchRequest::new(Strategy::Multithreaded, 42, "r").with_thread_pool_size(u64::MAX),
            LaunchRequest::new(Strategy::Multithreaded, 42, "r").with_thread_pool_size(257),
        ];

        for request in cases {
            let result = orchestrator.launch(request.clone()).await;
            assert!(
                matches!(result, Err(JobError::InvalidParameters(_))),
                "expected rejection for {:?}",
                request
            );
        }
        assert!(orchestrator
            .list_runs(&JobRunFilter::new())
            .unwrap()
            .is_empty());

        // One partition per seat is the finest plan
        let launched = orchestrator
            .launch(LaunchRequest::new(Strategy::Partitioned, 42, "r").with_grid_size(100))
            .await
            .unwrap();
        let report = orchestrator.wait(&launched.job_run_id).await.unwrap();
        assert_eq!(report.status(), JobStatus::Completed);
        assert_eq!(report.partitions.len(), 100);
    }

    #[tokio::test]
    async fn test_grid_limit_applies_below_capacity() {
        let catalog = Arc::new(MockConcertCatalog::new());
        catalog.add_concert(fixtures::concert_snapshot(42, 100)).await;
        let orchestrator = JobOrchestrator::new(
            EngineConfig::default().with_size_limits(8, 2),
            catalog,
            Arc::new(MockTicketSink::new()),
            Arc::new(SqliteJobStore::in_memory().unwrap()),
        );

        let result = orchestrator
            .launch(LaunchRequest::new(Strategy::Partitioned, 42, "r").with_grid_size(9))
            .await;
        assert!(matches!(result, Err(JobError::InvalidParameters(ref m)) if m.contains("limit")));

        let result = orchestrator
            .launch(LaunchRequest::new(Strategy::Multithreaded, 42, "r").with_thread_pool_size(3))
            .await;
        assert!(matches!(result, Err(JobError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_stop_unknown_and_finished_runs() {
        let orchestrator = orchestrator().await;

        let result = orchestrator.stop("missing").await;
        assert!(matches!(result, Err(JobError::JobNotFound(_))));

        let launched = orchestrator
            .launch(LaunchRequest::new(Strategy::Sequential, 42, "r").with_chunk_size(10))
            .await
            .unwrap();
        let report = orchestrator.wait(&launched.job_run_id).await.unwrap();
        assert_eq!(report.status(), JobStatus::Completed);
        assert!(!report.active);

        let result = orchestrator.stop(&launched.job_run_id).await;
        assert!(matches!(
            result,
            Err(JobError::NotRunning {
                status: JobStatus::Completed,
                ..
            })
        ));
    }
}
