use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid resource request: {0}")]
    InvalidResourceRequest(String),

    #[error("Job already submitted: {0}")]
    DuplicateJob(String),

    #[error("Cluster already registered: {0}")]
    DuplicateCluster(String),

    #[error("Submission queue is saturated (capacity {capacity})")]
    QueueSaturated { capacity: usize },

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("Job timed out before placement: {0}")]
    JobTimedOut(String),

    #[error("Job execution interrupted: {0}")]
    ExecutionInterrupted(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// True when the caller should slow down and try again later.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, SchedulerError::QueueSaturated { .. })
    }

    /// True when the submission was refused outright and retrying the same
    /// request cannot succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidResourceRequest(_)
                | SchedulerError::DuplicateJob(_)
                | SchedulerError::ShuttingDown
        )
    }
}

/// Why a single placement attempt against one cluster did not succeed.
///
/// Both variants mean "try elsewhere"; neither is surfaced to submitters.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementError {
    #[error("insufficient capacity")]
    CapacityUnavailable,

    #[error("cluster guard busy")]
    LockContention,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_saturated_is_backpressure_not_rejection() {
        let err = SchedulerError::QueueSaturated { capacity: 1 };
        assert!(err.is_backpressure());
        assert!(!err.is_rejection());
    }

    #[test]
    fn validation_errors_are_rejections() {
        assert!(SchedulerError::InvalidResourceRequest("cpu".into()).is_rejection());
        assert!(SchedulerError::DuplicateJob("j1".into()).is_rejection());
        assert!(SchedulerError::ShuttingDown.is_rejection());
        assert!(!SchedulerError::JobTimedOut("j1".into()).is_rejection());
    }

    #[test]
    fn error_messages_name_the_subject() {
        let err = SchedulerError::DuplicateCluster("alpha".into());
        assert_eq!(err.to_string(), "Cluster already registered: alpha");
        let err = SchedulerError::QueueSaturated { capacity: 100 };
        assert_eq!(
            err.to_string(),
            "Submission queue is saturated (capacity 100)"
        );
    }
}
