use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Result, SchedulerError};
use crate::scheduler::job::Job;

/// A job waiting for placement, with its submission-relative deadline.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: Job,
    pub submitted_at: Instant,
    pub deadline: Option<Instant>,
    /// Failed placement attempts so far
    pub attempts: u32,
}

impl QueuedJob {
    pub fn new(job: Job, submitted_at: Instant) -> Self {
        // A deadline past the clock's range means no deadline
        let deadline = job.timeout.and_then(|t| submitted_at.checked_add(t));
        Self {
            job,
            submitted_at,
            deadline,
            attempts: 0,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

/// Bounded FIFO handoff between submitters and workers.
///
/// The bound applies to `try_push` only. `requeue` always succeeds so a
/// worker can return the job it just took out, which keeps the total at or
/// below `capacity + worker_count`.
#[derive(Debug)]
pub struct SubmissionQueue {
    jobs: Mutex<VecDeque<QueuedJob>>,
    capacity: usize,
    available: Notify,
    closed: AtomicBool,
}

impl SubmissionQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Add a newly submitted job. Never blocks.
    pub fn try_push(&self, job: QueuedJob) -> Result<()> {
        if self.is_closed() {
            return Err(SchedulerError::ShuttingDown);
        }
        {
            let mut jobs = self.jobs.lock();
            if jobs.len() >= self.capacity {
                return Err(SchedulerError::QueueSaturated {
                    capacity: self.capacity,
                });
            }
            jobs.push_back(job);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Put a job back at the tail after a failed placement.
    pub fn requeue(&self, job: QueuedJob) {
        self.jobs.lock().push_back(job);
        self.available.notify_one();
    }

    /// Wait until a job is available and remove it.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<QueuedJob> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.jobs.lock().pop_front() {
                return Some(job);
            }
            if self.is_closed() {
                // Let the next waiter observe the close as well
                self.available.notify_one();
                return None;
            }

            notified.await;
        }
    }

    /// Remove every queued job whose deadline has passed.
    pub fn remove_expired(&self, now: Instant) -> Vec<QueuedJob> {
        let mut jobs = self.jobs.lock();
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(jobs.len());
        for job in jobs.drain(..) {
            if job.is_expired(now) {
                expired.push(job);
            } else {
                kept.push_back(job);
            }
        }
        *jobs = kept;
        expired
    }

    /// Stop accepting submissions and wake every waiting worker.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.available.notify_waiters();
        self.available.notify_one();
    }

    /// Take every remaining job, leaving the queue empty.
    pub fn drain_all(&self) -> Vec<QueuedJob> {
        self.jobs.lock().drain(..).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
