pub mod cluster;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use cluster::{Allocation, Cluster, ClusterRegistry, ClusterSnapshot};
pub use config::{ClusterSpec, RetryConfig, SchedulerConfig};
pub use error::{PlacementError, Result, SchedulerError};
pub use scheduler::{
    Job, JobEvent, JobRecord, JobStatus, ResourceDescriptor, Scheduler, SchedulerHandle,
    SchedulerStats,
};
