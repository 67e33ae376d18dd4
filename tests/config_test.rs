//! Configuration loading tests against real TOML files

use care_gateway::config::Settings;
use care_gateway::middleware::auth::Role;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn loads_services_and_routes_from_file() {
    let file = write_config(
        r#"
[server]
host = "127.0.0.1"
port = 9090

[auth]
jwt_secret = "file-secret"

[circuit_breaker]
failure_threshold = 7
open_timeout_ms = 10000

[[services]]
name = "photo"
host = "127.0.0.1"
port = 4002
health_check_path = "/healthz"

[[services]]
name = "auth"
host = "127.0.0.1"
port = 4001

[[routes]]
prefix = "/auth"
service = "auth"

[[routes]]
prefix = "/photo"
service = "photo"
requires_auth = true
allowed_roles = ["admin", "doctor", "patient"]
check_ownership = true
"#,
    );

    let settings = Settings::load_from_path(file.path()).unwrap();
    settings.validate().unwrap();

    assert_eq!(settings.server.port, 9090);
    assert_eq!(settings.circuit_breaker.failure_threshold, 7);
    assert_eq!(settings.circuit_breaker.open_timeout_ms, 10_000);
    // Unset fields fall back to defaults
    assert_eq!(settings.circuit_breaker.half_open_success_threshold, 3);
    assert_eq!(settings.proxy.timeout_ms, 30_000);

    assert_eq!(settings.services.len(), 2);
    assert_eq!(settings.services[0].name, "photo");
    assert_eq!(settings.services[0].health_check_path, "/healthz");
    assert_eq!(settings.services[1].health_check_path, "/health");

    assert_eq!(settings.routes.len(), 2);
    assert!(!settings.routes[0].requires_auth);
    assert!(settings.routes[1].requires_auth);
    assert!(settings.routes[1].check_ownership);
    assert_eq!(
        settings.routes[1].allowed_roles,
        vec![Role::Admin, Role::Doctor, Role::Patient]
    );
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let settings = Settings::load_from_path("/nonexistent/gateway.toml").unwrap();
    assert_eq!(settings.server.port, 8080);
    assert!(settings.services.is_empty());
    assert!(settings.routes.is_empty());
}

#[test]
fn invalid_route_prefix_fails_validation() {
    let file = write_config(
        r#"
[[services]]
name = "photo"
host = "127.0.0.1"
port = 4002

[[routes]]
prefix = "photo"
service = "photo"
"#,
    );

    let settings = Settings::load_from_path(file.path()).unwrap();
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("must start with '/'"));
}
