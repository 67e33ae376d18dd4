//! Bearer-token authentication and role-based authorization middleware
//!
//! The gateway is a trust boundary: once a token verifies here, the caller's
//! identity is asserted to downstream services via `x-user-*` headers and is
//! not re-verified by them. Downstream services must therefore only be
//! reachable through the gateway.

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::{GatewayError, Result};

/// Identity headers asserted on proxied requests after verification.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Caller role carried in token claims and route configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Caregiver,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Caregiver => "caregiver",
            Role::Patient => "patient",
        }
    }
}

/// Claims expected in a gateway bearer token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

/// Verified caller identity, scoped to a single request.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub subject_id: String,
    pub role: Role,
    pub email: String,
    pub token_expiry: DateTime<Utc>,
}

/// HS256 token verifier against the configured secret
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify signature and expiry; invalid or expired tokens are forbidden.
    pub fn verify(&self, token: &str) -> Result<IdentityContext> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| GatewayError::Forbidden(format!("invalid token: {}", kind_label(&e))))?;

        let claims = data.claims;
        let token_expiry = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| GatewayError::Forbidden("invalid token: bad expiry".to_string()))?;

        Ok(IdentityContext {
            subject_id: claims.sub,
            role: claims.role,
            email: claims.email,
            token_expiry,
        })
    }
}

fn kind_label(e: &jsonwebtoken::errors::Error) -> &'static str {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
        ErrorKind::ExpiredSignature => "expired",
        ErrorKind::InvalidSignature => "bad signature",
        _ => "malformed",
    }
}

/// Authentication layer: verifies the bearer token and attaches the identity
#[derive(Clone)]
pub struct AuthLayer {
    verifier: Arc<TokenVerifier>,
}

impl AuthLayer {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            verifier: self.verifier.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    verifier: Arc<TokenVerifier>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let token = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_owned);

        let token = match token {
            Some(token) => token,
            None => {
                warn!(path = %request.uri().path(), "Missing bearer token");
                return reject(GatewayError::Unauthorized(
                    "Bearer token required in Authorization header".to_string(),
                ));
            }
        };

        let identity = match self.verifier.verify(&token) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(path = %request.uri().path(), error = %e, "Token verification failed");
                return reject(e);
            }
        };

        if let Err(e) = assert_identity_headers(&mut request, &identity) {
            return reject(e);
        }
        request.extensions_mut().insert(identity);

        let future = self.inner.call(request);
        Box::pin(async move { future.await })
    }
}

/// Overwrite any client-supplied identity headers with the verified claims.
fn assert_identity_headers(request: &mut Request<Body>, identity: &IdentityContext) -> Result<()> {
    let headers = request.headers_mut();
    for (name, value) in [
        (USER_ID_HEADER, identity.subject_id.as_str()),
        (USER_ROLE_HEADER, identity.role.as_str()),
        (USER_EMAIL_HEADER, identity.email.as_str()),
    ] {
        let value = HeaderValue::from_str(value)
            .map_err(|_| GatewayError::Forbidden(format!("invalid token: bad {} claim", name)))?;
        headers.insert(name, value);
    }
    Ok(())
}

fn reject<E>(err: GatewayError) -> BoxFuture<'static, std::result::Result<Response, E>> {
    Box::pin(async move { Ok(err.into_response()) })
}

/// Authorization layer: requires a prior identity with an allowed role
#[derive(Clone)]
pub struct RoleLayer {
    allowed: Arc<Vec<Role>>,
}

impl RoleLayer {
    pub fn new(allowed: Vec<Role>) -> Self {
        Self {
            allowed: Arc::new(allowed),
        }
    }
}

impl<S> Layer<S> for RoleLayer {
    type Service = RoleMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RoleMiddleware {
            inner,
            allowed: self.allowed.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RoleMiddleware<S> {
    inner: S,
    allowed: Arc<Vec<Role>>,
}

impl<S> Service<Request<Body>> for RoleMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let identity = match request.extensions().get::<IdentityContext>() {
            Some(identity) => identity,
            None => {
                return reject(GatewayError::Unauthorized(
                    "Authentication required".to_string(),
                ));
            }
        };

        if !self.allowed.is_empty() && !self.allowed.contains(&identity.role) {
            warn!(
                path = %request.uri().path(),
                subject = %identity.subject_id,
                role = identity.role.as_str(),
                "Role not permitted for route"
            );
            return reject(GatewayError::Forbidden(format!(
                "role '{}' is not permitted for this route",
                identity.role.as_str()
            )));
        }

        let future = self.inner.call(request);
        Box::pin(async move { future.await })
    }
}
