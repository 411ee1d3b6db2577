use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cluster::Allocation;
use crate::scheduler::{Job, JobStatus};

/// Result of job execution
#[derive(Debug)]
pub struct ExecutionResult {
    pub job_id: String,
    pub cluster_id: String,
    /// `Completed` or `Interrupted`
    pub status: JobStatus,
    pub elapsed: Duration,
}

/// Runs a placed job by holding its allocation for the job's duration.
///
/// The allocation is moved in and dropped before `execute` returns, so the
/// cluster gets its resources back on completion and on interruption alike.
#[derive(Debug, Clone, Default)]
pub struct JobExecutor;

impl JobExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(
        &self,
        job: &Job,
        allocation: Allocation,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let cluster_id = allocation.cluster_id().to_string();
        let started = Instant::now();
        tracing::info!(
            job_id = %job.id,
            cluster_id = %cluster_id,
            cpu = job.resource.cpu,
            memory = job.resource.memory,
            duration_ms = job.duration.as_millis() as u64,
            "Job started"
        );

        let status = tokio::select! {
            _ = tokio::time::sleep(job.duration) => JobStatus::Completed,
            _ = cancel.cancelled() => JobStatus::Interrupted,
        };
        drop(allocation);

        let elapsed = started.elapsed();
        match status {
            JobStatus::Completed => tracing::info!(
                job_id = %job.id,
                cluster_id = %cluster_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job completed"
            ),
            _ => tracing::warn!(
                job_id = %job.id,
                cluster_id = %cluster_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job interrupted, resources released"
            ),
        }

        ExecutionResult {
            job_id: job.id.clone(),
            cluster_id,
            status,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterRegistry;
    use crate::scheduler::ResourceDescriptor;

    fn registry() -> ClusterRegistry {
        let mut registry = ClusterRegistry::new(Duration::from_millis(5));
        registry.register("c", 4, 4).unwrap();
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn completed_job_releases_allocation() {
        let registry = registry();
        let job = Job::new("j1", 2, 2, 5).unwrap();
        let allocation = registry.find_cluster(&job.resource).unwrap();

        let result = JobExecutor::new()
            .execute(&job, allocation, &CancellationToken::new())
            .await;

        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.cluster_id, "c");
        assert!(result.elapsed >= Duration::from_secs(5));
        let snap = registry.snapshots().remove(0);
        assert!(snap.is_idle());
        assert_eq!(snap.releases, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_and_releases() {
        let registry = registry();
        let job = Job::new("j1", 4, 4, 600).unwrap();
        let allocation = registry.find_cluster(&job.resource).unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = JobExecutor::new().execute(&job, allocation, &cancel).await;

        assert_eq!(result.status, JobStatus::Interrupted);
        assert!(result.elapsed < Duration::from_secs(600));
        let snap = registry.snapshots().remove(0);
        assert!(snap.is_idle());
        assert_eq!(snap.allocations, 1);
        assert_eq!(snap.releases, 1);
    }

    #[tokio::test]
    async fn zero_duration_job_completes_immediately() {
        let registry = registry();
        let job = Job::new("noop", 0, 0, 0).unwrap();
        let allocation = registry
            .find_cluster(&ResourceDescriptor::from_units(0, 0))
            .unwrap();
        let result = JobExecutor::new()
            .execute(&job, allocation, &CancellationToken::new())
            .await;
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.job_id, "noop");
    }
}
