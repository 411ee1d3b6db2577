//! Integration tests for submission backpressure.
//!
//! These tests validate that:
//! - When the submission queue is full, submitting returns `QueueSaturated`
//!   immediately rather than blocking.
//! - A saturated submission leaves no trace: no record, no event.
//! - Once workers drain the queue, the same job can be resubmitted.


use std::time::Duration;

use cluster_scheduler::scheduler::{JobEvent, JobStatus};
use cluster_scheduler::SchedulerError;
use test_harness::{fast_config, start_scheduler, wait_for_status};

// ---------------------------------------------------------------------------
// Test 1: full queue → QueueSaturated (no blocking)
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_queue_saturated_when_full() {
    let handle = start_scheduler(fast_config(1, 1), &[("C", 4, 4)]);

    // J0 occupies the only worker
    handle.submit_job("J0", 4, 4, 60).unwrap();
    assert!(wait_for_status(&handle, "J0", JobStatus::Running, Duration::from_secs(1)).await);

    // J1 takes the only queue slot
    handle.submit_job("J1", 1, 1, 1).unwrap();
    assert_eq!(handle.stats().queue_depth, 1);

    let start = std::time::Instant::now();
    let result = handle.submit_job("J2", 1, 1, 1);
    let elapsed = start.elapsed();

    assert_eq!(result, Err(SchedulerError::QueueSaturated { capacity: 1 }));
    assert!(result.unwrap_err().is_backpressure());
    assert!(
        elapsed < Duration::from_secs(1),
        "saturated submit should return immediately, took {:?}",
        elapsed
    );
    assert!(handle.job_status("J2").is_none());
    assert_eq!(handle.jobs().len(), 2);

    handle.shutdown_now().await;
}

// ---------------------------------------------------------------------------
// Test 2: saturated submission publishes nothing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_saturated_submission_publishes_no_event() {
    let handle = start_scheduler(fast_config(1, 1), &[("C", 4, 4)]);

    handle.submit_job("J0", 4, 4, 60).unwrap();
    assert!(wait_for_status(&handle, "J0", JobStatus::Running, Duration::from_secs(1)).await);
    handle.submit_job("J1", 1, 1, 1).unwrap();

    let mut events = handle.subscribe();
    assert!(handle.submit_job("J2", 1, 1, 1).is_err());

    while let Ok(event) = events.try_recv() {
        assert_ne!(event.job_id(), "J2", "unexpected event {:?}", event);
    }

    handle.shutdown_now().await;
}

// ---------------------------------------------------------------------------
// Test 3: resubmission succeeds once the queue drains
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_resubmit_after_queue_drains() {
    let handle = start_scheduler(fast_config(1, 1), &[("C", 4, 4)]);

    handle.submit_job("J0", 4, 4, 10).unwrap();
    assert!(wait_for_status(&handle, "J0", JobStatus::Running, Duration::from_secs(1)).await);
    handle.submit_job("J1", 1, 1, 1).unwrap();
    assert!(matches!(
        handle.submit_job("J2", 1, 1, 1),
        Err(SchedulerError::QueueSaturated { .. })
    ));

    // J0 finishes, the worker picks up J1 and the slot frees
    assert!(wait_for_status(&handle, "J1", JobStatus::Running, Duration::from_secs(15)).await);
    assert_eq!(handle.stats().queue_depth, 0);

    let mut events = handle.subscribe();
    handle.submit_job("J2", 1, 1, 1).unwrap();
    assert_eq!(
        events.try_recv().unwrap(),
        JobEvent::Queued {
            job_id: "J2".into()
        }
    );

    assert!(wait_for_status(&handle, "J2", JobStatus::Completed, Duration::from_secs(5)).await);
    let counts = handle.stats().jobs;
    assert_eq!(counts.completed, 3);

    handle.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test 4: rejections are not backpressure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rejections_are_distinct_from_backpressure() {
    let handle = start_scheduler(fast_config(1, 10), &[("C", 4, 4)]);

    let too_big = handle.submit_job("big", 5, 1, 1).unwrap_err();
    assert!(too_big.is_rejection());
    assert!(!too_big.is_backpressure());

    handle.submit_job("dup", 1, 1, 0).unwrap();
    let duplicate = handle.submit_job("dup", 1, 1, 0).unwrap_err();
    assert!(duplicate.is_rejection());
    assert!(!duplicate.is_backpressure());

    handle.shutdown().await;
}
