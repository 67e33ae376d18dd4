//! Application settings and configuration management

use crate::error::{GatewayError, Result};
use crate::middleware::auth::Role;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub health: HealthConfig,
    pub proxy: ProxyConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Token verification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_rps() -> u32 {
    100
}

fn default_burst() -> u32 {
    200
}

/// Circuit breaker tunables, shared by every per-service circuit
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_open_timeout")]
    pub open_timeout_ms: u64,
    #[serde(default = "default_half_open_successes")]
    pub half_open_success_threshold: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_timeout() -> u64 {
    60_000
}

fn default_half_open_successes() -> u32 {
    3
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_timeout_ms: default_open_timeout(),
            half_open_success_threshold: default_half_open_successes(),
        }
    }
}

/// Health probing configuration
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
}

fn default_probe_timeout() -> u64 {
    5_000
}

fn default_health_interval() -> u64 {
    30
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout(),
            interval_secs: default_health_interval(),
        }
    }
}

/// Proxying configuration
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_timeout")]
    pub timeout_ms: u64,
}

fn default_proxy_timeout() -> u64 {
    30_000
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_proxy_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// A downstream service reachable through the gateway
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
}

fn default_health_check_path() -> String {
    "/health".to_string()
}

/// A URL-prefix binding onto a registered service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    pub prefix: String,
    pub service: String,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub allowed_roles: Vec<Role>,
    #[serde(default)]
    pub check_ownership: bool,
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("auth.jwt_secret", "")?
            .set_default("rate_limit.enabled", true)?
            .set_default("rate_limit.requests_per_second", 100)?
            .set_default("rate_limit.burst_size", 200)?
            .set_default("circuit_breaker.failure_threshold", 5)?
            .set_default("circuit_breaker.open_timeout_ms", 60_000)?
            .set_default("circuit_breaker.half_open_success_threshold", 3)?
            .set_default("health.probe_timeout_ms", 5_000)?
            .set_default("health.interval_secs", 30)?
            .set_default("proxy.timeout_ms", 30_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Load from configuration file
            .add_source(
                File::with_name(path.as_ref().to_str().unwrap_or("config/default"))
                    .required(false),
            )
            // Override with environment variables (prefixed with GATEWAY_)
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(GatewayError::Config(config::ConfigError::Message(
                "Server port cannot be 0".to_string(),
            )));
        }

        for service in &self.services {
            if service.name.is_empty() {
                return Err(GatewayError::Config(config::ConfigError::Message(
                    "Service name cannot be empty".to_string(),
                )));
            }
            if !service.health_check_path.starts_with('/') {
                return Err(GatewayError::Config(config::ConfigError::Message(format!(
                    "Service '{}' health check path must start with '/'",
                    service.name
                ))));
            }
        }

        for route in &self.routes {
            if !route.prefix.starts_with('/') {
                return Err(GatewayError::Config(config::ConfigError::Message(format!(
                    "Route prefix '{}' must start with '/'",
                    route.prefix
                ))));
            }
            if !self.services.iter().any(|s| s.name == route.service) {
                return Err(GatewayError::Config(config::ConfigError::Message(format!(
                    "Route '{}' references unknown service '{}'",
                    route.prefix, route.service
                ))));
            }
            if route.requires_auth && self.auth.jwt_secret.is_empty() {
                return Err(GatewayError::Config(config::ConfigError::Message(format!(
                    "Route '{}' requires auth but no JWT secret is configured",
                    route.prefix
                ))));
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            auth: AuthConfig {
                jwt_secret: String::new(),
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_second: default_rps(),
                burst_size: default_burst(),
            },
            circuit_breaker: CircuitBreakerConfig::default(),
            health: HealthConfig::default(),
            proxy: ProxyConfig::default(),
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
            services: vec![],
            routes: vec![],
        }
    }
}
