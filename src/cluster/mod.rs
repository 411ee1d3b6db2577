//! Capacity pools that jobs are placed onto.
//!
//! A [`Cluster`] tracks total and available CPU/memory behind a guard that
//! is held only for the check-and-deduct or the add-back, never while a job
//! runs. A successful reservation is represented by an [`Allocation`]; the
//! resources go back to the cluster when the allocation is dropped, so every
//! exit path of a job releases exactly once.
//!
//! The [`ClusterRegistry`] owns the clusters and performs first-fit
//! placement in registration order.

pub mod registry;

pub use registry::ClusterRegistry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use crate::error::PlacementError;
use crate::scheduler::ResourceDescriptor;

/// Point-in-time view of a cluster's capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSnapshot {
    pub id: String,
    pub total_cpu: u64,
    pub total_memory: u64,
    pub available_cpu: u64,
    pub available_memory: u64,
    /// Successful reservations since startup
    pub allocations: u64,
    /// Releases since startup
    pub releases: u64,
}

impl ClusterSnapshot {
    /// True when nothing is reserved on the cluster.
    pub fn is_idle(&self) -> bool {
        self.available_cpu == self.total_cpu && self.available_memory == self.total_memory
    }
}

#[derive(Debug)]
pub struct Cluster {
    id: String,
    total: ResourceDescriptor,
    available: Mutex<ResourceDescriptor>,
    allocations: AtomicU64,
    releases: AtomicU64,
    /// Shared with the registry; pinged after every release
    released: Arc<Notify>,
}

impl Cluster {
    pub(crate) fn new(id: String, cpu: u64, memory: u64, released: Arc<Notify>) -> Self {
        let total = ResourceDescriptor::from_units(cpu, memory);
        Self {
            id,
            total,
            available: Mutex::new(total),
            allocations: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            released,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn total(&self) -> ResourceDescriptor {
        self.total
    }

    /// Whether `resource` could fit here with nothing else running.
    pub fn can_ever_fit(&self, resource: &ResourceDescriptor) -> bool {
        resource.fits_within(&self.total)
    }

    /// Reserve `resource`, waiting at most `lock_timeout` for the guard.
    pub fn try_reserve(
        &self,
        resource: &ResourceDescriptor,
        lock_timeout: Duration,
    ) -> Result<(), PlacementError> {
        let Some(mut available) = self.available.try_lock_for(lock_timeout) else {
            return Err(PlacementError::LockContention);
        };
        if !resource.fits_within(&available) {
            return Err(PlacementError::CapacityUnavailable);
        }
        available.cpu -= resource.cpu;
        available.memory -= resource.memory;
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Reserve `resource`; false means "try elsewhere", whatever the reason.
    pub fn allocate(&self, resource: &ResourceDescriptor, lock_timeout: Duration) -> bool {
        self.try_reserve(resource, lock_timeout).is_ok()
    }

    /// Reserve `resource` and wrap the reservation so it is released on drop.
    pub fn try_allocate(
        self: &Arc<Self>,
        resource: ResourceDescriptor,
        lock_timeout: Duration,
    ) -> Result<Allocation, PlacementError> {
        self.try_reserve(&resource, lock_timeout)?;
        Ok(Allocation {
            cluster: Arc::clone(self),
            resource,
        })
    }

    /// Return a previous reservation to the pool.
    ///
    /// Callers must release exactly what they reserved, exactly once.
    pub fn release(&self, resource: &ResourceDescriptor) {
        {
            let mut available = self.available.lock();
            let cpu = available.cpu + resource.cpu;
            let memory = available.memory + resource.memory;
            debug_assert!(
                cpu <= self.total.cpu && memory <= self.total.memory,
                "release of {} on cluster {} exceeds its total capacity",
                resource,
                self.id
            );
            if cpu > self.total.cpu || memory > self.total.memory {
                tracing::error!(
                    cluster_id = %self.id,
                    cpu = resource.cpu,
                    memory = resource.memory,
                    "Release exceeds total capacity, clamping"
                );
            }
            available.cpu = cpu.min(self.total.cpu);
            available.memory = memory.min(self.total.memory);
        }
        self.releases.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            cluster_id = %self.id,
            cpu = resource.cpu,
            memory = resource.memory,
            "Resources released"
        );
        self.released.notify_waiters();
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        let available = *self.available.lock();
        ClusterSnapshot {
            id: self.id.clone(),
            total_cpu: self.total.cpu,
            total_memory: self.total.memory,
            available_cpu: available.cpu,
            available_memory: available.memory,
            allocations: self.allocations.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
        }
    }
}

/// Resources reserved on one cluster. Dropping it releases them.
#[derive(Debug)]
pub struct Allocation {
    cluster: Arc<Cluster>,
    resource: ResourceDescriptor,
}

impl Allocation {
    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    pub fn cluster_id(&self) -> &str {
        self.cluster.id()
    }

    pub fn resource(&self) -> ResourceDescriptor {
        self.resource
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.cluster.release(&self.resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const LOCK_TIMEOUT: Duration = Duration::from_millis(5);

    fn cluster(cpu: u64, memory: u64) -> Arc<Cluster> {
        Arc::new(Cluster::new(
            "c".to_string(),
            cpu,
            memory,
            Arc::new(Notify::new()),
        ))
    }

    #[test]
    fn allocate_deducts_and_release_restores() {
        let c = cluster(8, 32);
        let r = ResourceDescriptor::from_units(4, 16);

        assert!(c.allocate(&r, LOCK_TIMEOUT));
        let snap = c.snapshot();
        assert_eq!(snap.available_cpu, 4);
        assert_eq!(snap.available_memory, 16);

        c.release(&r);
        assert!(c.snapshot().is_idle());
    }

    #[test]
    fn allocate_refuses_when_either_dimension_is_short() {
        let c = cluster(4, 4);
        assert_eq!(
            c.try_reserve(&ResourceDescriptor::from_units(5, 1), LOCK_TIMEOUT),
            Err(PlacementError::CapacityUnavailable)
        );
        assert_eq!(
            c.try_reserve(&ResourceDescriptor::from_units(1, 5), LOCK_TIMEOUT),
            Err(PlacementError::CapacityUnavailable)
        );
        assert!(c.snapshot().is_idle());
        assert_eq!(c.snapshot().allocations, 0);
    }

    #[test]
    fn allocate_exact_fit_then_nothing_more() {
        let c = cluster(4, 4);
        assert!(c.allocate(&ResourceDescriptor::from_units(4, 4), LOCK_TIMEOUT));
        assert!(!c.allocate(&ResourceDescriptor::from_units(1, 1), LOCK_TIMEOUT));
        assert!(c.allocate(&ResourceDescriptor::from_units(0, 0), LOCK_TIMEOUT));
    }

    #[test]
    fn held_guard_reports_contention() {
        let c = cluster(4, 4);
        let _guard = c.available.lock();
        let other = Arc::clone(&c);
        let result = thread::spawn(move || {
            other.try_reserve(&ResourceDescriptor::from_units(1, 1), LOCK_TIMEOUT)
        })
        .join()
        .unwrap();
        assert_eq!(result, Err(PlacementError::LockContention));
    }

    #[test]
    fn dropping_allocation_releases_once() {
        let c = cluster(8, 8);
        let allocation = c
            .try_allocate(ResourceDescriptor::from_units(3, 5), LOCK_TIMEOUT)
            .unwrap();
        assert_eq!(allocation.cluster_id(), "c");
        assert_eq!(c.snapshot().available_cpu, 5);

        drop(allocation);
        let snap = c.snapshot();
        assert!(snap.is_idle());
        assert_eq!(snap.allocations, 1);
        assert_eq!(snap.releases, 1);
    }

    #[test]
    fn allocation_released_during_unwind() {
        let c = cluster(2, 2);
        let inner = Arc::clone(&c);
        let result = thread::spawn(move || {
            let _allocation = inner
                .try_allocate(ResourceDescriptor::from_units(2, 2), LOCK_TIMEOUT)
                .unwrap();
            panic!("job blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(c.snapshot().is_idle());
        assert_eq!(c.snapshot().releases, 1);
    }

    #[test]
    fn concurrent_allocations_never_oversubscribe() {
        let c = cluster(10, 10);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&c);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let r = ResourceDescriptor::from_units(3, 2);
                        if let Ok(allocation) = c.try_allocate(r, Duration::from_millis(50)) {
                            let snap = c.snapshot();
                            assert!(snap.available_cpu <= snap.total_cpu);
                            assert!(snap.available_memory <= snap.total_memory);
                            drop(allocation);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = c.snapshot();
        assert!(snap.is_idle());
        assert_eq!(snap.allocations, snap.releases);
        assert!(snap.allocations > 0);
    }

    #[tokio::test]
    async fn release_wakes_waiters() {
        let notify = Arc::new(Notify::new());
        let c = Arc::new(Cluster::new("c".into(), 1, 1, notify.clone()));
        let allocation = c
            .try_allocate(ResourceDescriptor::from_units(1, 1), LOCK_TIMEOUT)
            .unwrap();

        let waiter = tokio::spawn(async move { notify.notified().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(allocation);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("release should wake waiters")
            .unwrap();
    }
}
