//! In-memory catalog of downstream services and their reachability

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{HealthConfig, ServiceConfig};
use crate::error::{GatewayError, Result};

/// A registered downstream service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub health_check_path: String,
}

impl ServiceDescriptor {
    fn health_url(&self) -> String {
        format!("{}{}", self.base_url, self.health_check_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Outcome of a single health probe. Transport failures are captured in
/// `detail` rather than propagated, so a fan-out over many services always
/// yields one result per service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub service_name: String,
    pub status: HealthState,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

/// Service registry: name -> descriptor, plus bounded health probing.
///
/// State is in-memory only and rebuilt from configuration at startup.
pub struct ServiceRegistry {
    services: DashMap<String, ServiceDescriptor>,
    client: Client,
    probe_timeout: Duration,
}

impl ServiceRegistry {
    pub fn new(health: &HealthConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            services: DashMap::new(),
            client,
            probe_timeout: Duration::from_millis(health.probe_timeout_ms),
        })
    }

    /// Build a registry pre-populated from configuration.
    pub fn from_config(configs: &[ServiceConfig], health: &HealthConfig) -> Result<Self> {
        let registry = Self::new(health)?;
        for config in configs {
            registry.register(config);
        }
        Ok(registry)
    }

    /// Register or overwrite a service under its name. Idempotent.
    pub fn register(&self, config: &ServiceConfig) {
        let descriptor = ServiceDescriptor {
            name: config.name.clone(),
            host: config.host.clone(),
            port: config.port,
            base_url: format!("http://{}:{}", config.host, config.port),
            health_check_path: config.health_check_path.clone(),
        };
        debug!(service = %descriptor.name, base_url = %descriptor.base_url, "Registered service");
        self.services.insert(descriptor.name.clone(), descriptor);
    }

    /// Remove a service. Future lookups under this name fail with NOT_FOUND.
    pub fn unregister(&self, name: &str) -> bool {
        self.services.remove(name).is_some()
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Result<ServiceDescriptor> {
        self.services
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::ServiceNotFound(name.to_string()))
    }

    /// All registered descriptors, ordered by name.
    pub fn list(&self) -> Vec<ServiceDescriptor> {
        let mut services: Vec<_> = self
            .services
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Probe one service's health endpoint with a bounded timeout.
    ///
    /// Only an unknown name is an error; 2xx classifies as healthy and
    /// everything else (non-2xx, timeout, connection refused) as unhealthy
    /// with the cause recorded in `detail`.
    pub async fn health_check(&self, name: &str) -> Result<HealthCheckResult> {
        let descriptor = self.get(name)?;
        Ok(self.probe(&descriptor).await)
    }

    /// Probe every registered service concurrently.
    ///
    /// Each probe carries its own timeout and failure isolation, so one slow
    /// service never delays or suppresses another's result. The returned map
    /// has exactly one entry per registered service.
    pub async fn health_check_all(&self) -> HashMap<String, HealthCheckResult> {
        let descriptors = self.list();
        let probes = descriptors.iter().map(|d| self.probe(d));
        join_all(probes)
            .await
            .into_iter()
            .map(|result| (result.service_name.clone(), result))
            .collect()
    }

    async fn probe(&self, descriptor: &ServiceDescriptor) -> HealthCheckResult {
        let started = Instant::now();
        let timestamp = Utc::now();

        let outcome = self
            .client
            .get(descriptor.health_url())
            .timeout(self.probe_timeout)
            .send()
            .await;

        let response_time_ms = started.elapsed().as_millis() as u64;
        let (status, detail) = match outcome {
            Ok(response) if response.status().is_success() => (HealthState::Healthy, None),
            Ok(response) => (
                HealthState::Unhealthy,
                Some(format!("unexpected status {}", response.status())),
            ),
            Err(e) if e.is_timeout() => (
                HealthState::Unhealthy,
                Some(format!("probe timed out after {:?}", self.probe_timeout)),
            ),
            Err(e) => (HealthState::Unhealthy, Some(e.to_string())),
        };

        debug!(
            service = %descriptor.name,
            status = ?status,
            response_time_ms,
            "Health probe completed"
        );

        HealthCheckResult {
            service_name: descriptor.name.clone(),
            status,
            timestamp,
            response_time_ms,
            detail,
        }
    }
}
