use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// CPU and memory demand of a job. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub cpu: u64,
    pub memory: u64,
}

impl ResourceDescriptor {
    /// Build a descriptor from caller-supplied values, rejecting negatives.
    pub fn new(cpu: i64, memory: i64) -> Result<Self> {
        if cpu < 0 {
            return Err(SchedulerError::InvalidResourceRequest(format!(
                "cpu must be non-negative, got {}",
                cpu
            )));
        }
        if memory < 0 {
            return Err(SchedulerError::InvalidResourceRequest(format!(
                "memory must be non-negative, got {}",
                memory
            )));
        }
        Ok(Self {
            cpu: cpu as u64,
            memory: memory as u64,
        })
    }

    pub const fn from_units(cpu: u64, memory: u64) -> Self {
        Self { cpu, memory }
    }

    /// True if this demand fits inside `other` on both dimensions.
    pub fn fits_within(&self, other: &ResourceDescriptor) -> bool {
        self.cpu <= other.cpu && self.memory <= other.memory
    }
}

impl std::fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} cpu / {} mem", self.cpu, self.memory)
    }
}

/// A submitted unit of work. Execution holds `resource` for `duration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub resource: ResourceDescriptor,
    pub duration: Duration,
    /// Longest the job may wait for placement, measured from submission.
    pub timeout: Option<Duration>,
}

impl Job {
    pub fn new(id: impl Into<String>, cpu: i64, memory: i64, duration_secs: i64) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SchedulerError::InvalidResourceRequest(
                "job id cannot be empty".to_string(),
            ));
        }
        let resource = ResourceDescriptor::new(cpu, memory)?;
        if duration_secs < 0 {
            return Err(SchedulerError::InvalidResourceRequest(format!(
                "duration must be non-negative, got {}s",
                duration_secs
            )));
        }
        Ok(Self {
            id,
            resource,
            duration: Duration::from_secs(duration_secs as u64),
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the execution time with sub-second precision.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the submission queue, possibly after failed placements
    Queued,
    /// Holding resources on a cluster
    Running,
    Completed,
    /// Waited longer than its timeout without being placed
    TimedOut,
    /// Stopped mid-execution by a forced shutdown
    Interrupted,
    /// Still queued when the scheduler stopped
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::TimedOut => write!(f, "timed_out"),
            JobStatus::Interrupted => write!(f, "interrupted"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Observable state of a job the scheduler accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub resource: ResourceDescriptor,
    pub duration_ms: u64,
    /// Placement attempts that found no cluster with room
    pub attempts: u32,
    pub cluster_id: Option<String>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn queued(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: JobStatus::Queued,
            resource: job.resource,
            duration_ms: job.duration.as_millis() as u64,
            attempts: 0,
            cluster_id: None,
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}
