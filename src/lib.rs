//! Resilient API Gateway
//!
//! Composes a service registry, per-service circuit breaking and auth-aware
//! reverse proxying behind a single HTTP surface with a uniform response
//! envelope.

pub mod breaker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod registry;
pub mod response;

pub use error::{GatewayError, Result};

use std::sync::Arc;

use breaker::CircuitBreaker;
use config::Settings;
use gateway::health_monitor::HealthMonitor;
use registry::ServiceRegistry;

/// Application state shared across all handlers.
///
/// Everything is constructed once at startup and passed by reference into
/// request handlers; there are no global singletons.
pub struct AppState {
    pub settings: Settings,
    pub registry: Arc<ServiceRegistry>,
    pub breaker: Arc<CircuitBreaker>,
    pub health_monitor: Arc<HealthMonitor>,
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Build the full application state from validated settings.
    pub fn from_settings(settings: Settings) -> Result<Arc<Self>> {
        settings.validate()?;

        let registry = Arc::new(ServiceRegistry::from_config(
            &settings.services,
            &settings.health,
        )?);
        let breaker = Arc::new(CircuitBreaker::new(settings.circuit_breaker));
        let health_monitor = Arc::new(HealthMonitor::new(registry.clone()));
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Arc::new(Self {
            settings,
            registry,
            breaker,
            health_monitor,
            http_client,
        }))
    }
}
