//! Manifest reads, forwarded to the upstream metadata service
//!
//! The gateway holds no manifest state. Requests are relayed to the
//! configured API origin with credentials and content negotiation intact,
//! and the upstream response is streamed back unchanged, including
//! redirects and error envelopes.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{Method, header};
use axum::response::Response;
use tower::ServiceExt as _;

use crate::api::GatewayState;
use crate::auth::{self, AuthDecision};
use crate::error::{GatewayError, GatewayResult};
use crate::validate;

/// Reported when the gateway is pointed at itself.
const LOOP_GUARD_MESSAGE: &str =
    "REGISTRY_API_ORIGIN must target the API origin, not the gateway origin";

/// Serve a manifest route by proxying to the API origin.
pub(crate) async fn serve(
    state: &GatewayState,
    request: Request,
    repository: &str,
    reference: &str,
) -> GatewayResult<Response> {
    let namespace = match auth::authenticate(state, request.headers(), Some(repository)).await {
        AuthDecision::Authorized(namespace) => namespace,
        AuthDecision::Rejected(error) => return Err(error),
    };

    if !validate::valid_repository(repository) {
        return Err(GatewayError::NameInvalid);
    }
    if !validate::valid_reference(reference) {
        return Err(GatewayError::ManifestInvalid);
    }
    if !namespace.owns(repository) {
        tracing::debug!(%namespace, repository, "cross-namespace manifest request");
        return Err(GatewayError::WrongNamespace);
    }

    // A gateway whose API origin points back at itself would recurse
    // through the auth stack forever. Refuse before dialing out.
    if let Some(authority) = request_authority(&request) {
        if authority == state.config.api_authority() {
            return Err(GatewayError::Configuration(LOOP_GUARD_MESSAGE.to_string()));
        }
    }

    let query = request
        .uri()
        .query()
        .map(|query| format!("?{query}"))
        .unwrap_or_default();
    let target = format!(
        "{}/v2/{}/manifests/{}{}",
        state.config.api_origin(),
        repository,
        reference,
        query
    );

    let mut builder = http::Request::builder()
        .method(request.method().clone())
        .uri(target);
    // Credentials and content negotiation survive the hop; everything
    // else (cookies included) stays behind.
    for name in [header::AUTHORIZATION, header::ACCEPT] {
        if let Some(value) = request.headers().get(&name) {
            builder = builder.header(name, value.clone());
        }
    }
    let upstream_request = builder
        .body(hyperdriver::Body::empty())
        .map_err(|error| {
            tracing::warn!("manifest request not constructible: {error}");
            GatewayError::UpstreamUnreachable
        })?;

    let upstream_response = state
        .client
        .clone()
        .oneshot(upstream_request)
        .await
        .map_err(|error| {
            tracing::warn!("manifest fetch failed: {error}");
            GatewayError::UpstreamUnreachable
        })?;

    tracing::debug!(
        repository,
        reference,
        status = %upstream_response.status(),
        "relaying manifest response"
    );

    let (parts, body) = upstream_response.into_parts();
    let body = if request.method() == Method::HEAD {
        Body::empty()
    } else {
        Body::new(body)
    };

    Ok(Response::from_parts(parts, body))
}

/// Authority the inbound request was addressed to: the `Host` header, or
/// the URI authority on HTTP/2-style requests.
fn request_authority(request: &Request) -> Option<String> {
    if let Some(host) = request.headers().get(header::HOST) {
        return host.to_str().ok().map(|value| value.trim().to_string());
    }
    request
        .uri()
        .authority()
        .map(|authority| authority.to_string())
}
