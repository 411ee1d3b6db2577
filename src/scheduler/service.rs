use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cluster::{Allocation, ClusterRegistry, ClusterSnapshot};
use crate::config::{ClusterSpec, SchedulerConfig};
use crate::error::{Result, SchedulerError};
use crate::scheduler::events::JobEvent;
use crate::scheduler::job::{Job, JobRecord, JobStatus};
use crate::scheduler::queue::{QueuedJob, SubmissionQueue};
use crate::scheduler::table::{JobTable, StatusCounts};
use crate::worker::{Backoff, JobExecutor};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Requeues logged at warn level: the first, then every Nth.
const REQUEUE_WARN_EVERY: u32 = 50;

/// A scheduler being configured. Clusters can only be registered here;
/// [`Scheduler::start`] consumes it and returns the running handle.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    registry: ClusterRegistry,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let registry = ClusterRegistry::new(config.lock_timeout);
        Ok(Self { config, registry })
    }

    pub fn register_cluster(
        &mut self,
        id: impl Into<String>,
        total_cpu: u64,
        total_memory: u64,
    ) -> Result<()> {
        self.registry.register(id, total_cpu, total_memory)
    }

    pub fn with_cluster(mut self, spec: ClusterSpec) -> Result<Self> {
        self.registry.register(spec.id, spec.cpu, spec.memory)?;
        Ok(self)
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Spawn the worker pool and the timeout reaper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = Arc::new(SchedulerState {
            queue: SubmissionQueue::with_capacity(self.config.queue_capacity),
            registry: self.registry,
            table: RwLock::new(JobTable::new()),
            events,
            executor: JobExecutor::new(),
            config: self.config,
        });

        let cancel = CancellationToken::new();
        let mut workers = JoinSet::new();
        for worker_id in 0..state.config.worker_count {
            let state = state.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                worker_loop(worker_id, state, cancel).await;
            });
        }

        let reaper_cancel = cancel.child_token();
        let reaper = {
            let state = state.clone();
            let cancel = reaper_cancel.clone();
            tokio::spawn(async move {
                reaper_loop(state, cancel).await;
            })
        };

        tracing::info!(
            workers = state.config.worker_count,
            queue_capacity = state.config.queue_capacity,
            clusters = state.registry.len(),
            "Scheduler started"
        );

        SchedulerHandle {
            state,
            cancel,
            reaper_cancel,
            workers: Mutex::new(workers),
            reaper: Mutex::new(Some(reaper)),
        }
    }
}

/// Snapshot of scheduler load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Jobs currently sitting in the submission queue
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub jobs: StatusCounts,
}

/// State shared by the handle, the workers and the reaper.
#[derive(Debug)]
struct SchedulerState {
    config: SchedulerConfig,
    registry: ClusterRegistry,
    queue: SubmissionQueue,
    table: RwLock<JobTable>,
    events: broadcast::Sender<JobEvent>,
    executor: JobExecutor,
}

impl SchedulerState {
    fn publish(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Put an unplaced job back; `delay` is how long the worker will wait
    /// before its next attempt.
    fn requeue(&self, mut queued: QueuedJob, delay: Duration) {
        queued.attempts += 1;
        let attempt = queued.attempts;
        let job_id = queued.job.id.clone();
        let delay_ms = delay.as_millis() as u64;
        self.table.write().record_attempt(&job_id, attempt);

        if attempt == 1 || attempt % REQUEUE_WARN_EVERY == 0 {
            tracing::warn!(
                job_id = %job_id,
                attempt,
                delay_ms,
                cpu = queued.job.resource.cpu,
                memory = queued.job.resource.memory,
                "No cluster has capacity, requeueing job"
            );
        } else {
            tracing::debug!(job_id = %job_id, attempt, delay_ms, "Requeueing job");
        }

        self.publish(JobEvent::Requeued { job_id, attempt });
        self.queue.requeue(queued);
    }

    fn expire(&self, queued: QueuedJob) {
        let job_id = queued.job.id;
        let waited = queued.submitted_at.elapsed();
        tracing::warn!(
            job_id = %job_id,
            waited_ms = waited.as_millis() as u64,
            attempts = queued.attempts,
            "Job timed out waiting for placement"
        );
        let error = SchedulerError::JobTimedOut(job_id.clone()).to_string();
        self.table
            .write()
            .finish(&job_id, JobStatus::TimedOut, Some(error));
        self.publish(JobEvent::TimedOut { job_id });
    }

    fn cancel_queued(&self, queued: QueuedJob) {
        let job_id = queued.job.id;
        tracing::warn!(job_id = %job_id, "Job cancelled by shutdown before placement");
        self.table.write().finish(
            &job_id,
            JobStatus::Cancelled,
            Some(SchedulerError::ShuttingDown.to_string()),
        );
        self.publish(JobEvent::Cancelled { job_id });
    }

    async fn run(&self, queued: QueuedJob, allocation: Allocation, cancel: &CancellationToken) {
        let job_id = queued.job.id.clone();
        let cluster_id = allocation.cluster_id().to_string();

        self.table.write().mark_running(&job_id, &cluster_id);
        self.publish(JobEvent::Placed {
            job_id: job_id.clone(),
            cluster_id: cluster_id.clone(),
        });

        let result = self.executor.execute(&queued.job, allocation, cancel).await;

        match result.status {
            JobStatus::Completed => {
                self.table
                    .write()
                    .finish(&job_id, JobStatus::Completed, None);
                self.publish(JobEvent::Completed { job_id, cluster_id });
            }
            _ => {
                let error = SchedulerError::ExecutionInterrupted(job_id.clone()).to_string();
                self.table
                    .write()
                    .finish(&job_id, JobStatus::Interrupted, Some(error));
                self.publish(JobEvent::Interrupted { job_id, cluster_id });
            }
        }
    }
}

/// Worker loop: dequeue, place first-fit, execute, release.
///
/// When no cluster has room the job goes back to the tail of the queue and
/// the worker waits for a release signal or its backoff delay, whichever
/// comes first, before taking the next job.
async fn worker_loop(worker_id: usize, state: Arc<SchedulerState>, cancel: CancellationToken) {
    let mut backoff = Backoff::new(state.config.retry.clone());
    tracing::debug!(worker_id, "Worker started");

    loop {
        let queued = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = state.queue.pop() => match next {
                Some(queued) => queued,
                None => break,
            },
        };

        if queued.is_expired(Instant::now()) {
            state.expire(queued);
            continue;
        }

        // Register for the release signal before scanning so a release that
        // lands mid-scan still wakes this worker
        let released = state.registry.release_signal().notified();
        tokio::pin!(released);
        released.as_mut().enable();

        match state.registry.find_cluster(&queued.job.resource) {
            Some(allocation) => {
                backoff.reset();
                state.run(queued, allocation, &cancel).await;
            }
            None => {
                let delay = backoff.next_delay();
                state.requeue(queued, delay);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = &mut released => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    tracing::debug!(worker_id, "Worker stopped");
}

/// Periodically remove queued jobs whose timeout has elapsed.
async fn reaper_loop(state: Arc<SchedulerState>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(state.config.reap_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                for queued in state.queue.remove_expired(Instant::now()) {
                    state.expire(queued);
                }
            }
        }
    }
}

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    state: Arc<SchedulerState>,
    cancel: CancellationToken,
    reaper_cancel: CancellationToken,
    workers: Mutex<JoinSet<()>>,
    reaper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SchedulerHandle {
    /// Validate and enqueue a job described by raw values.
    pub fn submit_job(&self, id: &str, cpu: i64, memory: i64, duration_secs: i64) -> Result<()> {
        self.submit(Job::new(id, cpu, memory, duration_secs)?)
    }

    /// Validate and enqueue a job.
    ///
    /// `QueueSaturated` is backpressure: the job was not accepted and the
    /// caller may retry later. Every other error is a rejection.
    pub fn submit(&self, mut job: Job) -> Result<()> {
        if self.state.queue.is_closed() {
            return Err(SchedulerError::ShuttingDown);
        }
        if !self.state.registry.can_satisfy(&job.resource) {
            tracing::warn!(
                job_id = %job.id,
                cpu = job.resource.cpu,
                memory = job.resource.memory,
                "Rejecting job no cluster could ever hold"
            );
            return Err(SchedulerError::InvalidResourceRequest(format!(
                "job {} needs {}, more than any registered cluster provides",
                job.id, job.resource
            )));
        }
        if job.timeout.is_none() {
            job.timeout = self.state.config.default_job_timeout;
        }

        let job_id = job.id.clone();
        // Held until the record exists so workers never see an untracked job
        let mut table = self.state.table.write();
        if table.contains(&job_id) {
            return Err(SchedulerError::DuplicateJob(job_id));
        }
        let tracked = job.clone();
        if let Err(e) = self
            .state
            .queue
            .try_push(QueuedJob::new(job, Instant::now()))
        {
            if e.is_backpressure() {
                tracing::warn!(job_id = %job_id, "Submission queue saturated");
            }
            return Err(e);
        }
        table.insert(&tracked);
        self.state.publish(JobEvent::Queued {
            job_id: job_id.clone(),
        });
        drop(table);

        tracing::info!(job_id = %job_id, "Job submitted");
        Ok(())
    }

    pub fn job_status(&self, id: &str) -> Option<JobRecord> {
        self.state.table.read().get_job(id).cloned()
    }

    /// All accepted jobs in submission order
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.state
            .table
            .read()
            .all_jobs()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn cluster_status(&self) -> Vec<ClusterSnapshot> {
        self.state.registry.snapshots()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queue_depth: self.state.queue.len(),
            queue_capacity: self.state.queue.capacity(),
            jobs: self.state.table.read().counts(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.state.events.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.queue.is_closed()
    }

    /// Stop accepting jobs and let queued and running jobs finish.
    ///
    /// Waits for the drain to complete unless a `drain_timeout` is
    /// configured. Past that grace period, running jobs are interrupted and
    /// anything still queued is cancelled.
    pub async fn shutdown(&self) {
        self.stop(self.state.config.drain_timeout).await;
    }

    /// Stop accepting jobs and interrupt running ones right away.
    pub async fn shutdown_now(&self) {
        self.stop(Some(Duration::ZERO)).await;
    }

    async fn stop(&self, grace: Option<Duration>) {
        tracing::info!(
            grace_ms = grace.map(|g| g.as_millis() as u64),
            "Shutdown requested"
        );
        self.state.queue.close();

        let mut workers = std::mem::take(&mut *self.workers.lock());
        let join_all = async {
            while workers.join_next().await.is_some() {}
        };
        let drained = match grace {
            Some(grace) => tokio::time::timeout(grace, join_all).await.is_ok(),
            None => {
                join_all.await;
                true
            }
        };

        if !drained {
            tracing::warn!(
                running = workers.len(),
                "Drain did not finish in time, interrupting running jobs"
            );
            self.cancel.cancel();
            while workers.join_next().await.is_some() {}
        }

        self.reaper_cancel.cancel();
        let reaper = self.reaper.lock().take();
        if let Some(reaper) = reaper {
            let _ = reaper.await;
        }

        for queued in self.state.queue.drain_all() {
            self.state.cancel_queued(queued);
        }

        let stats = self.stats();
        tracing::info!(
            completed = stats.jobs.completed,
            timed_out = stats.jobs.timed_out,
            interrupted = stats.jobs.interrupted,
            cancelled = stats.jobs.cancelled,
            "Scheduler stopped"
        );
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.state.queue.close();
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(workers: usize, queue: usize) -> Scheduler {
        let mut scheduler = Scheduler::new(SchedulerConfig::new(workers, queue)).unwrap();
        scheduler.register_cluster("alpha", 8, 32).unwrap();
        scheduler.register_cluster("beta", 16, 64).unwrap();
        scheduler
    }

    #[test]
    fn invalid_config_is_refused() {
        let err = Scheduler::new(SchedulerConfig::new(0, 1)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    }

    #[test]
    fn duplicate_cluster_registration_fails() {
        let mut scheduler = scheduler(1, 1);
        assert_eq!(
            scheduler.register_cluster("beta", 1, 1),
            Err(SchedulerError::DuplicateCluster("beta".into()))
        );
        assert_eq!(scheduler.registry().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_job_ids_are_rejected() {
        let handle = scheduler(1, 10).start();
        handle.submit_job("j1", 1, 1, 0).unwrap();
        assert_eq!(
            handle.submit_job("j1", 1, 1, 0),
            Err(SchedulerError::DuplicateJob("j1".into()))
        );
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn submission_after_close_leaves_no_record() {
        let mut scheduler = Scheduler::new(SchedulerConfig::new(1, 1)).unwrap();
        scheduler.register_cluster("only", 1, 1).unwrap();
        let handle = scheduler.start();

        handle.state.queue.close();
        let err = handle.submit_job("late", 1, 1, 0).unwrap_err();
        assert_eq!(err, SchedulerError::ShuttingDown);
        assert!(handle.job_status("late").is_none());
        handle.shutdown_now().await;
    }

    #[tokio::test]
    async fn submit_publishes_queued_event() {
        let handle = scheduler(1, 10).start();
        let mut events = handle.subscribe();
        handle.submit_job("j1", 1, 1, 0).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            JobEvent::Queued {
                job_id: "j1".into()
            }
        );
        handle.shutdown().await;
    }
}
