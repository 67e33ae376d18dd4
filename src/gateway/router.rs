//! Gateway router: introspection endpoints plus proxied route bindings

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::error::GatewayError;
use crate::gateway::proxy::{proxy_handler, ProxyContext};
use crate::middleware::auth::{AuthLayer, RoleLayer, TokenVerifier};
use crate::middleware::ownership::OwnershipLayer;
use crate::middleware::rate_limit::RateLimitLayer;
use crate::registry::{HealthCheckResult, ServiceDescriptor};
use crate::response::ApiResponse;
use crate::AppState;

/// Build the full gateway router.
///
/// Each configured route binding gets the chain rate limiter ->
/// authenticate -> authorize -> ownership -> circuit-breaker-guarded proxy;
/// steps not configured for the binding are skipped. Unmatched paths fall
/// through to a uniform 404.
pub fn create_router(state: Arc<AppState>) -> Router {
    let verifier = Arc::new(TokenVerifier::new(&state.settings.auth.jwt_secret));

    let mut app = Router::new()
        .route("/health", get(liveness))
        .route("/api/services", get(list_services))
        .route("/api/services/health", get(services_health))
        .route("/api/docs", get(route_docs))
        .route("/api/circuit-breakers", get(circuit_states))
        .with_state(state.clone());

    for binding in &state.settings.routes {
        let service = match state.registry.get(&binding.service) {
            Ok(service) => service,
            Err(e) => {
                // Settings::validate rejects this before we get here
                error!(route = %binding.prefix, error = %e, "Skipping route binding");
                continue;
            }
        };

        let ctx = Arc::new(ProxyContext {
            service,
            client: state.http_client.clone(),
            breaker: state.breaker.clone(),
            timeout: Duration::from_millis(state.settings.proxy.timeout_ms),
        });

        // Layers run in reverse order of addition, so the innermost check is
        // added first: ownership, then roles, then authentication.
        let mut proxy = Router::new()
            .route("/", any(proxy_handler))
            .route("/*path", any(proxy_handler))
            .with_state(ctx);
        if binding.check_ownership {
            proxy = proxy.layer(OwnershipLayer);
        }
        if !binding.allowed_roles.is_empty() {
            proxy = proxy.layer(RoleLayer::new(binding.allowed_roles.clone()));
        }
        if binding.requires_auth {
            proxy = proxy.layer(AuthLayer::new(verifier.clone()));
        }

        info!(
            prefix = %binding.prefix,
            service = %binding.service,
            requires_auth = binding.requires_auth,
            "Bound route"
        );
        app = app.nest(&binding.prefix, proxy);
    }

    app = app
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    if state.settings.rate_limit.enabled {
        app = app.layer(RateLimitLayer::new(
            state.settings.rate_limit.requests_per_second,
            state.settings.rate_limit.burst_size,
        ));
    }

    app
}

/// Gateway liveness, 200 while the process is up.
async fn liveness() -> impl IntoResponse {
    Json(ApiResponse::success(json!({ "status": "ok" })))
}

/// A registered service with the last health observation, if any probe ran.
#[derive(Serialize)]
struct ServiceSummary {
    #[serde(flatten)]
    service: ServiceDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_health: Option<HealthCheckResult>,
}

async fn list_services(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut health = state.health_monitor.current();
    let services: Vec<ServiceSummary> = state
        .registry
        .list()
        .into_iter()
        .map(|service| {
            let last_health = health.remove(&service.name);
            ServiceSummary {
                service,
                last_health,
            }
        })
        .collect();
    Json(ApiResponse::success(services))
}

/// Fresh aggregate probe; 200 only when every registered service is healthy.
async fn services_health(State(state): State<Arc<AppState>>) -> Response {
    let results = state.health_monitor.refresh().await;
    let all_healthy = results.values().all(|r| r.is_healthy());
    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ApiResponse {
        success: all_healthy,
        data: Some(results),
        error: None,
    };
    (status, Json(body)).into_response()
}

async fn route_docs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let docs: BTreeMap<String, String> = state
        .settings
        .routes
        .iter()
        .map(|r| (r.prefix.clone(), r.service.clone()))
        .collect();
    Json(ApiResponse::success(docs))
}

async fn circuit_states(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.breaker.all_states().await))
}

async fn not_found(uri: Uri) -> Response {
    GatewayError::NotFound(format!("no route matches {}", uri.path())).into_response()
}
