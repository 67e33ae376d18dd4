//! Resource-ownership authorization for patient-scoped routes

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::GatewayError;
use crate::middleware::auth::{IdentityContext, Role};

/// Path segment whose successor is taken as the target resource id.
const RESOURCE_SEGMENT: &str = "patients";
/// Query parameter fallback for the target resource id.
const RESOURCE_QUERY_PARAM: &str = "patientId";

/// Ownership layer for patient-scoped routes.
///
/// Admins bypass the check. Patients may only act on their own resource id.
/// Doctors and caregivers pass through here; verifying their delegated
/// relationship to the specific patient requires persisted state the gateway
/// does not hold, so the downstream service must confirm it independently
/// before acting.
#[derive(Clone)]
pub struct OwnershipLayer;

impl<S> Layer<S> for OwnershipLayer {
    type Service = OwnershipMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OwnershipMiddleware { inner }
    }
}

#[derive(Clone)]
pub struct OwnershipMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for OwnershipMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let identity = match request.extensions().get::<IdentityContext>() {
            Some(identity) => identity.clone(),
            None => {
                return reject(GatewayError::Unauthorized(
                    "Authentication required".to_string(),
                ));
            }
        };

        if identity.role == Role::Admin {
            let future = self.inner.call(request);
            return Box::pin(async move { future.await });
        }

        let resource_id = match resource_id_from_uri(request.uri()) {
            Some(id) => id,
            None => {
                return reject(GatewayError::Validation(
                    "target resource id is required".to_string(),
                ));
            }
        };

        if identity.role == Role::Patient && identity.subject_id != resource_id {
            warn!(
                path = %request.uri().path(),
                subject = %identity.subject_id,
                resource = %resource_id,
                "Ownership check failed"
            );
            return reject(GatewayError::Forbidden(
                "you may only access your own records".to_string(),
            ));
        }

        let future = self.inner.call(request);
        Box::pin(async move { future.await })
    }
}

fn reject<E>(err: GatewayError) -> BoxFuture<'static, Result<Response, E>> {
    Box::pin(async move { Ok(err.into_response()) })
}

/// The path segment following `patients`, else the `patientId` query value.
fn resource_id_from_uri(uri: &axum::http::Uri) -> Option<String> {
    let mut segments = uri.path().split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == RESOURCE_SEGMENT {
            if let Some(id) = segments.next().filter(|s| !s.is_empty()) {
                return Some(id.to_string());
            }
        }
    }

    uri.query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == RESOURCE_QUERY_PARAM && !value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;

    #[test]
    fn test_resource_id_from_path() {
        let uri: Uri = "/patients/p-42/photos".parse().unwrap();
        assert_eq!(resource_id_from_uri(&uri).as_deref(), Some("p-42"));
    }

    #[test]
    fn test_resource_id_from_query() {
        let uri: Uri = "/reports?patientId=p-7&range=30d".parse().unwrap();
        assert_eq!(resource_id_from_uri(&uri).as_deref(), Some("p-7"));
    }

    #[test]
    fn test_missing_resource_id() {
        let uri: Uri = "/reports/latest".parse().unwrap();
        assert_eq!(resource_id_from_uri(&uri), None);

        let uri: Uri = "/patients".parse().unwrap();
        assert_eq!(resource_id_from_uri(&uri), None);
    }
}
