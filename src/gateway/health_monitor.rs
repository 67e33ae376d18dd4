//! Background health monitoring over the service registry

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::registry::{HealthCheckResult, ServiceRegistry};

/// Keeps the latest aggregate health snapshot current.
///
/// A background loop re-probes every registered service on a fixed interval.
/// Probe failures are data, not errors, so the loop always completes a full
/// sweep and never takes the process down.
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    snapshot: Arc<RwLock<HashMap<String, HealthCheckResult>>>,
    check_task: tokio::sync::RwLock<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            snapshot: Arc::new(RwLock::new(HashMap::new())),
            check_task: tokio::sync::RwLock::new(None),
        }
    }

    /// Start the periodic probe loop.
    pub async fn start(&self, interval_secs: u64) {
        let registry = self.registry.clone();
        let snapshot = self.snapshot.clone();

        let handle = tokio::spawn(async move {
            let interval = Duration::from_secs(interval_secs);
            loop {
                let results = registry.health_check_all().await;
                let unhealthy: Vec<&str> = results
                    .values()
                    .filter(|r| !r.is_healthy())
                    .map(|r| r.service_name.as_str())
                    .collect();
                if !unhealthy.is_empty() {
                    warn!(services = ?unhealthy, "Services reported unhealthy");
                }
                *snapshot.write() = results;

                tokio::time::sleep(interval).await;
            }
        });

        *self.check_task.write().await = Some(handle);
        info!(interval_secs, "Started health monitor background task");
    }

    /// Stop the probe loop.
    pub async fn stop(&self) {
        if let Some(handle) = self.check_task.write().await.take() {
            handle.abort();
            info!("Stopped health monitor background task");
        }
    }

    /// Probe all services now, store and return the fresh snapshot.
    pub async fn refresh(&self) -> HashMap<String, HealthCheckResult> {
        let results = self.registry.health_check_all().await;
        *self.snapshot.write() = results.clone();
        results
    }

    /// The most recent snapshot, possibly stale by up to one interval.
    pub fn current(&self) -> HashMap<String, HealthCheckResult> {
        self.snapshot.read().clone()
    }
}
