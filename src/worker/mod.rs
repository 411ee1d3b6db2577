//! Job execution for placed jobs.
//!
//! - **Execution**: a placed job holds its cluster allocation for the job's
//!   duration, then hands it back
//! - **Retry pacing**: workers that find no room wait before trying again
//!
//! # Components
//!
//! - [`JobExecutor`]: runs a job against an [`Allocation`](crate::cluster::Allocation)
//! - [`Backoff`]: jittered exponential delay between failed placements
//!
//! # Execution Flow
//!
//! 1. Worker loop dequeues a job and asks the registry for a cluster
//! 2. [`JobExecutor::execute`] holds the allocation for the job's duration
//! 3. The allocation is dropped, returning CPU and memory to the cluster
//! 4. Returns [`ExecutionResult`](executor::ExecutionResult) with the outcome
//!
//! A forced shutdown cancels step 2; the allocation is still dropped.

pub mod backoff;
pub mod executor;

pub use backoff::Backoff;
pub use executor::JobExecutor;
