use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;

use crate::scheduler::job::{Job, JobRecord, JobStatus};

/// Counts of tracked jobs per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub timed_out: usize,
    pub interrupted: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn terminal(&self) -> usize {
        self.completed + self.timed_out + self.interrupted + self.cancelled
    }
}

/// Tracks the record of every job accepted by the scheduler
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: HashMap<String, JobRecord>,
    order: Vec<String>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    /// Start tracking a job. A known id keeps its existing record; callers
    /// check `contains` first.
    pub fn insert(&mut self, job: &Job) {
        if self.jobs.contains_key(&job.id) {
            return;
        }
        self.order.push(job.id.clone());
        self.jobs.insert(job.id.clone(), JobRecord::queued(job));
    }

    pub fn get_job(&self, id: &str) -> Option<&JobRecord> {
        self.jobs.get(id)
    }

    /// Record another failed placement attempt
    pub fn record_attempt(&mut self, id: &str, attempts: u32) -> bool {
        if let Some(job) = self.jobs.get_mut(id) {
            job.attempts = attempts;
            true
        } else {
            false
        }
    }

    pub fn mark_running(&mut self, id: &str, cluster_id: &str) -> bool {
        if let Some(job) = self.jobs.get_mut(id) {
            job.status = JobStatus::Running;
            job.cluster_id = Some(cluster_id.to_string());
            job.started_at = Some(Utc::now());
            true
        } else {
            false
        }
    }

    /// Move a job into a terminal status.
    pub fn finish(&mut self, id: &str, status: JobStatus, error: Option<String>) -> bool {
        debug_assert!(status.is_terminal());
        if let Some(job) = self.jobs.get_mut(id) {
            job.status = status;
            job.error = error;
            job.completed_at = Some(Utc::now());
            true
        } else {
            false
        }
    }

    /// Every tracked job in submission order
    pub fn all_jobs(&self) -> Vec<&JobRecord> {
        self.order.iter().filter_map(|id| self.jobs.get(id)).collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::TimedOut => counts.timed_out += 1,
                JobStatus::Interrupted => counts.interrupted += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
