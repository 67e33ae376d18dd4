//! Shared helpers for gateway integration tests

#![allow(dead_code)]

use care_gateway::config::{
    CircuitBreakerConfig, HealthConfig, RouteConfig, ServiceConfig, Settings,
};
use care_gateway::middleware::auth::{Claims, Role};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};

pub const TEST_SECRET: &str = "test-secret";

/// Settings wired for tests: short timeouts, rate limiting off by default.
pub fn test_settings(services: Vec<ServiceConfig>, routes: Vec<RouteConfig>) -> Settings {
    let mut settings = Settings::default();
    settings.auth.jwt_secret = TEST_SECRET.to_string();
    settings.rate_limit.enabled = false;
    settings.circuit_breaker = CircuitBreakerConfig {
        failure_threshold: 5,
        open_timeout_ms: 60_000,
        half_open_success_threshold: 3,
    };
    settings.health = HealthConfig {
        probe_timeout_ms: 500,
        interval_secs: 3600,
    };
    settings.proxy.timeout_ms = 500;
    settings.services = services;
    settings.routes = routes;
    settings
}

pub fn service(name: &str, port: u16) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        host: "127.0.0.1".to_string(),
        port,
        health_check_path: "/health".to_string(),
    }
}

pub fn open_route(prefix: &str, service: &str) -> RouteConfig {
    RouteConfig {
        prefix: prefix.to_string(),
        service: service.to_string(),
        requires_auth: false,
        allowed_roles: vec![],
        check_ownership: false,
    }
}

pub fn protected_route(prefix: &str, service: &str, roles: Vec<Role>) -> RouteConfig {
    RouteConfig {
        prefix: prefix.to_string(),
        service: service.to_string(),
        requires_auth: true,
        allowed_roles: roles,
        check_ownership: false,
    }
}

pub fn token_for(sub: &str, role: Role) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: sub.to_string(),
        role,
        email: format!("{}@example.com", sub),
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Decode a response body into JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn expired_token_for(sub: &str, role: Role) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: sub.to_string(),
        role,
        email: format!("{}@example.com", sub),
        exp: now - 3600,
        iat: now - 7200,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}
