pub mod events;
pub mod job;
pub mod queue;
pub mod service;
pub mod table;

pub use events::JobEvent;
pub use job::{Job, JobRecord, JobStatus, ResourceDescriptor};
pub use queue::{QueuedJob, SubmissionQueue};
pub use service::{Scheduler, SchedulerHandle, SchedulerStats};
pub use table::{JobTable, StatusCounts};
