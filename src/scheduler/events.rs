use serde::Serialize;

/// Lifecycle notifications published to `SchedulerHandle::subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Queued { job_id: String },
    Placed { job_id: String, cluster_id: String },
    Requeued { job_id: String, attempt: u32 },
    Completed { job_id: String, cluster_id: String },
    TimedOut { job_id: String },
    Interrupted { job_id: String, cluster_id: String },
    Cancelled { job_id: String },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Queued { job_id }
            | JobEvent::Placed { job_id, .. }
            | JobEvent::Requeued { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::TimedOut { job_id }
            | JobEvent::Interrupted { job_id, .. }
            | JobEvent::Cancelled { job_id } => job_id,
        }
    }
}
