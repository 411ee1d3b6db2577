use std::time::Duration;

use crate::error::{Result, SchedulerError};

/// Bounds for the wait a worker performs after failing to place a job.
///
/// The wait ends early when any cluster releases resources, so these values
/// only matter while the whole registry stays saturated.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failed placement
    pub initial_delay: Duration,
    /// Upper bound for the delay, regardless of how many attempts failed
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        }
    }
}

/// A cluster to register at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub id: String,
    pub cpu: u64,
    pub memory: u64,
}

impl ClusterSpec {
    pub fn new(id: impl Into<String>, cpu: u64, memory: u64) -> Self {
        Self {
            id: id.into(),
            cpu,
            memory,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker tasks pulling from the submission queue
    pub worker_count: usize,
    /// Maximum number of jobs accepted into the queue at once
    pub queue_capacity: usize,
    /// Longest a placement attempt waits for a cluster's guard
    pub lock_timeout: Duration,
    pub retry: RetryConfig,
    /// Timeout applied to jobs submitted without their own.
    /// `None` lets jobs wait for placement indefinitely.
    pub default_job_timeout: Option<Duration>,
    /// How often queued jobs are swept for expired timeouts
    pub reap_interval: Duration,
    /// Grace period `shutdown()` gives workers before interrupting them.
    /// `None` waits for every queued and running job to finish.
    pub drain_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            queue_capacity: 100,
            lock_timeout: Duration::from_millis(5),
            retry: RetryConfig::default(),
            default_job_timeout: None,
            reap_interval: Duration::from_millis(100),
            drain_timeout: None,
        }
    }
}

impl SchedulerConfig {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        Self {
            worker_count,
            queue_capacity,
            ..Default::default()
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_default_job_timeout(mut self, timeout: Duration) -> Self {
        self.default_job_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(SchedulerError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(SchedulerError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.reap_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "reap_interval must be non-zero".to_string(),
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(SchedulerError::InvalidConfig(
                "retry backoff_multiplier must be finite and >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}
