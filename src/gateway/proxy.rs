//! Circuit-breaker-guarded reverse proxy to a registered service

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::breaker::CircuitBreaker;
use crate::error::{GatewayError, Result};
use crate::middleware::auth::{
    IdentityContext, USER_EMAIL_HEADER, USER_ID_HEADER, USER_ROLE_HEADER,
};
use crate::registry::ServiceDescriptor;

/// Largest request body the gateway will buffer for forwarding.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Headers that are connection-scoped and must not be forwarded either way.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Trust-boundary headers. These never pass through from the client; they are
/// set only from the verified identity before forwarding.
const IDENTITY_HEADERS: &[&str] = &[USER_ID_HEADER, USER_ROLE_HEADER, USER_EMAIL_HEADER];

/// Everything one route binding needs to forward a request.
pub struct ProxyContext {
    pub service: ServiceDescriptor,
    pub client: reqwest::Client,
    pub breaker: Arc<CircuitBreaker>,
    pub timeout: Duration,
}

/// Forward the request to the bound service under its circuit.
///
/// Any transport failure, deadline overrun or open circuit becomes the
/// uniform 503 envelope; raw transport errors never reach the client.
pub async fn proxy_handler(
    State(ctx): State<Arc<ProxyContext>>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let identity = parts.extensions.get::<IdentityContext>().cloned();

    let declared_len = parts
        .headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > MAX_BODY_BYTES) {
        return GatewayError::Validation("request body too large".to_string()).into_response();
    }

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => {
            return GatewayError::Validation("failed to read request body".to_string())
                .into_response();
        }
    };

    let request_id = Uuid::new_v4();
    debug!(
        service = %ctx.service.name,
        method = %parts.method,
        path = %parts.uri.path(),
        %request_id,
        "Proxying request"
    );

    let result = ctx
        .breaker
        .execute(&ctx.service.name, || {
            forward(
                &ctx,
                &parts.method,
                &parts.uri,
                &parts.headers,
                body,
                identity.as_ref(),
                request_id,
            )
        })
        .await;

    match result {
        Ok(response) => response,
        Err(e) => {
            warn!(service = %ctx.service.name, %request_id, error = %e, "Proxy call failed");
            e.into_response()
        }
    }
}

/// Build and send the downstream request, relaying the response verbatim.
///
/// The inbound URI arrives with the route prefix already stripped by the
/// router nesting, so path and query forward as-is onto the service base URL.
/// Client-supplied `x-user-*` headers are dropped; downstream services trust
/// those headers, so they carry the verified identity or nothing.
async fn forward(
    ctx: &ProxyContext,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
    identity: Option<&IdentityContext>,
    request_id: Uuid,
) -> Result<Response> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!("{}{}", ctx.service.base_url, path_and_query);

    let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|_| GatewayError::Validation(format!("unsupported method {}", method)))?;

    let mut outbound = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        let name_str = name.as_str();
        if name_str == "host"
            || HOP_BY_HOP_HEADERS.contains(&name_str)
            || IDENTITY_HEADERS.contains(&name_str)
        {
            continue;
        }
        let Ok(name) = reqwest::header::HeaderName::from_bytes(name_str.as_bytes()) else {
            continue;
        };
        let Ok(value) = reqwest::header::HeaderValue::from_bytes(value.as_bytes()) else {
            continue;
        };
        outbound.append(name, value);
    }
    if let Some(identity) = identity {
        for (name, value) in [
            (USER_ID_HEADER, identity.subject_id.as_str()),
            (USER_ROLE_HEADER, identity.role.as_str()),
            (USER_EMAIL_HEADER, identity.email.as_str()),
        ] {
            let value = reqwest::header::HeaderValue::from_str(value).map_err(|_| {
                GatewayError::Internal(format!("identity yields invalid {} header", name))
            })?;
            outbound.insert(name, value);
        }
    }
    if let Ok(value) = reqwest::header::HeaderValue::from_str(&request_id.to_string()) {
        outbound.insert("x-request-id", value);
    }

    let upstream = ctx
        .client
        .request(method, &target)
        .headers(outbound)
        .body(body)
        .timeout(ctx.timeout)
        .send()
        .await
        .map_err(|e| upstream_error(&ctx.service.name, e))?;

    let status = StatusCode::from_u16(upstream.status().as_u16())
        .map_err(|_| GatewayError::Upstream(format!("{}: invalid status", ctx.service.name)))?;

    let mut builder = Response::builder().status(status);
    for (name, value) in upstream.headers() {
        let name_str = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&name_str) {
            continue;
        }
        builder = builder.header(name_str, value.as_bytes());
    }

    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| upstream_error(&ctx.service.name, e))?;

    builder
        .body(Body::from(bytes))
        .map_err(|e| GatewayError::Internal(format!("failed to assemble response: {}", e)))
}

fn upstream_error(service: &str, e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Upstream(format!("{}: deadline exceeded", service))
    } else {
        GatewayError::Upstream(format!("{}: {}", service, e))
    }
}
