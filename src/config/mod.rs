pub mod settings;

pub use settings::{
    AuthConfig, CircuitBreakerConfig, HealthConfig, LoggingConfig, ProxyConfig, RateLimitConfig,
    RouteConfig, ServerConfig, ServiceConfig, Settings,
};
