//! Bearer token authentication for the pull surface

use std::fmt;

use axum::http::{HeaderMap, header};

use crate::api::GatewayState;
use crate::error::GatewayError;
use crate::{token, validate};

/// A tenant's namespace, taken from a verified token subject.
///
/// A repository belongs to the namespace named by its leading path
/// segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegistryNamespace(String);

impl RegistryNamespace {
    fn parse(subject: &str) -> Option<Self> {
        let subject = subject.trim();
        validate::valid_namespace(subject).then(|| Self(subject.to_string()))
    }

    /// Whether the repository's leading segment is this namespace.
    pub(crate) fn owns(&self, repository: &str) -> bool {
        validate::namespace_of(repository) == self.0
    }
}

impl fmt::Display for RegistryNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of authenticating a request.
#[derive(Debug)]
#[must_use]
pub(crate) enum AuthDecision {
    /// Caller holds a verified token for this namespace.
    Authorized(RegistryNamespace),

    /// Terminal error the handler must return unchanged.
    Rejected(GatewayError),
}

/// Pull scope string for a repository, as used in token requests.
pub(crate) fn pull_scope(repository: &str) -> String {
    format!("repository:{repository}:pull")
}

/// Authenticate a request against the configured issuer.
///
/// `repository` is the raw repository from the request path, present on
/// repository-scoped routes. It feeds the challenge scope and the grant
/// check; name validation stays with the caller.
pub(crate) async fn authenticate(
    state: &GatewayState,
    headers: &HeaderMap,
    repository: Option<&str>,
) -> AuthDecision {
    let challenge = state.challenge(repository);

    let Some(token) = bearer_token(headers) else {
        return AuthDecision::Rejected(GatewayError::Unauthorized { challenge });
    };

    let resolver = match state.keys.resolver(state.config.jwks_url()) {
        Ok(resolver) => resolver,
        Err(error) => {
            tracing::error!("key set resolver unavailable: {error}");
            return AuthDecision::Rejected(GatewayError::Configuration(
                "invalid REGISTRY_JWKS_URL".to_string(),
            ));
        }
    };

    let header = match jsonwebtoken::decode_header(token) {
        Ok(header) => header,
        Err(error) => {
            tracing::debug!("rejecting token with unreadable header: {error}");
            return AuthDecision::Rejected(GatewayError::Unauthorized { challenge });
        }
    };

    let key = match resolver.verification_key(header.kid.as_deref()).await {
        Ok(key) => key,
        Err(error) => {
            tracing::debug!("no verification key for token: {error}");
            return AuthDecision::Rejected(GatewayError::Unauthorized { challenge });
        }
    };

    let claims = match token::verify(token, &key, state.config.service()) {
        Ok(claims) => claims,
        Err(error) => {
            tracing::debug!("token verification failed: {error}");
            return AuthDecision::Rejected(GatewayError::Unauthorized { challenge });
        }
    };

    let Some(namespace) = RegistryNamespace::parse(&claims.sub) else {
        tracing::debug!(subject = %claims.sub, "token subject is not a namespace");
        return AuthDecision::Rejected(GatewayError::Unauthorized { challenge });
    };

    if let Some(repository) = repository {
        if !token::allows_pull(&claims.access, repository) {
            return AuthDecision::Rejected(GatewayError::PullNotGranted { challenge });
        }
    }

    AuthDecision::Authorized(namespace)
}

/// Extract a bearer token from the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
