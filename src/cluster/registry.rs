use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::cluster::{Allocation, Cluster, ClusterSnapshot};
use crate::error::{Result, SchedulerError};
use crate::scheduler::ResourceDescriptor;

/// Ordered set of clusters, fixed once the scheduler starts.
#[derive(Debug)]
pub struct ClusterRegistry {
    clusters: Vec<Arc<Cluster>>,
    lock_timeout: Duration,
    released: Arc<Notify>,
}

impl ClusterRegistry {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            clusters: Vec::new(),
            lock_timeout,
            released: Arc::new(Notify::new()),
        }
    }

    /// Append a cluster. Ids must be unique.
    pub fn register(&mut self, id: impl Into<String>, cpu: u64, memory: u64) -> Result<()> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "cluster id cannot be empty".to_string(),
            ));
        }
        if self.clusters.iter().any(|c| c.id() == id) {
            return Err(SchedulerError::DuplicateCluster(id));
        }
        tracing::info!(cluster_id = %id, cpu, memory, "Cluster registered");
        self.clusters
            .push(Arc::new(Cluster::new(id, cpu, memory, self.released.clone())));
        Ok(())
    }

    /// First-fit placement: try each cluster in registration order and
    /// return the first reservation that succeeds.
    ///
    /// Earlier clusters fill up first. A cluster whose guard is busy is
    /// skipped exactly like one without room.
    pub fn find_cluster(&self, resource: &ResourceDescriptor) -> Option<Allocation> {
        for cluster in &self.clusters {
            match cluster.try_allocate(*resource, self.lock_timeout) {
                Ok(allocation) => return Some(allocation),
                Err(reason) => {
                    tracing::debug!(
                        cluster_id = %cluster.id(),
                        cpu = resource.cpu,
                        memory = resource.memory,
                        %reason,
                        "Cluster declined allocation"
                    );
                }
            }
        }
        None
    }

    /// Whether any registered cluster is large enough for `resource`.
    pub fn can_satisfy(&self, resource: &ResourceDescriptor) -> bool {
        self.clusters.iter().any(|c| c.can_ever_fit(resource))
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Cluster>> {
        self.clusters.iter().find(|c| c.id() == id)
    }

    pub fn clusters(&self) -> &[Arc<Cluster>] {
        &self.clusters
    }

    pub fn snapshots(&self) -> Vec<ClusterSnapshot> {
        self.clusters.iter().map(|c| c.snapshot()).collect()
    }

    /// Notified whenever any cluster releases resources.
    pub fn release_signal(&self) -> &Notify {
        &self.released
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
