//! Error types and the OCI error envelope

use std::fmt::Write as _;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

const ERROR_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// A `WWW-Authenticate` bearer challenge pointing clients at the token
/// endpoint.
#[derive(Debug, Clone)]
pub struct BearerChallenge {
    realm: String,
    service: String,
    scope: Option<String>,
}

impl BearerChallenge {
    /// Challenge for the given realm and service, optionally scoped to a
    /// repository pull.
    pub fn new(realm: impl Into<String>, service: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            realm: realm.into(),
            service: service.into(),
            scope,
        }
    }

    /// Render as a `WWW-Authenticate` header value.
    fn header_value(&self) -> HeaderValue {
        let mut value = format!("Bearer realm={:?},service={:?}", self.realm, self.service);
        if let Some(scope) = &self.scope {
            // String write is infallible
            let _ = write!(value, ",scope={scope:?}");
        }

        HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("Bearer"))
    }
}

/// Error types for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Route or method outside the pull surface
    #[error("endpoint not implemented")]
    Unsupported,

    /// Non-read method on the API root
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Repository name failed validation
    #[error("invalid repository name")]
    NameInvalid,

    /// Manifest reference failed validation
    #[error("invalid manifest reference")]
    ManifestInvalid,

    /// Digest failed validation
    #[error("invalid digest")]
    DigestInvalid,

    /// Missing or unverifiable credentials
    #[error("authentication required")]
    Unauthorized {
        /// Where to obtain a token
        challenge: BearerChallenge,
    },

    /// Verified token without a pull grant for the repository
    #[error("requested access to the resource is denied")]
    PullNotGranted {
        /// Where to obtain a token with the right scope
        challenge: BearerChallenge,
    },

    /// Repository belongs to another namespace
    #[error("access denied to this repository")]
    WrongNamespace,

    /// No blob stored under the requested digest
    #[error("blob unknown")]
    BlobUnknown,

    /// Gateway misconfiguration surfaced at request time
    #[error("{0}")]
    Configuration(String),

    /// Upstream manifest service unreachable
    #[error("failed to load manifest")]
    UpstreamUnreachable,

    /// Storage error
    #[error("storage failure")]
    Storage(#[from] storage::StorageError),
}

impl GatewayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unsupported => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::NameInvalid
            | GatewayError::ManifestInvalid
            | GatewayError::DigestInvalid => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized { .. } | GatewayError::PullNotGranted { .. } => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::WrongNamespace => StatusCode::FORBIDDEN,
            GatewayError::BlobUnknown => StatusCode::NOT_FOUND,
            GatewayError::Configuration(_) | GatewayError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::UpstreamUnreachable => StatusCode::BAD_GATEWAY,
        }
    }

    /// Get the error code for OCI error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Unsupported | GatewayError::MethodNotAllowed => "UNSUPPORTED",
            GatewayError::NameInvalid => "NAME_INVALID",
            GatewayError::ManifestInvalid => "MANIFEST_INVALID",
            GatewayError::DigestInvalid => "DIGEST_INVALID",
            GatewayError::Unauthorized { .. } => "UNAUTHORIZED",
            GatewayError::PullNotGranted { .. } | GatewayError::WrongNamespace => "DENIED",
            GatewayError::BlobUnknown => "BLOB_UNKNOWN",
            GatewayError::Configuration(_)
            | GatewayError::UpstreamUnreachable
            | GatewayError::Storage(_) => "UNKNOWN",
        }
    }

    fn challenge(&self) -> Option<&BearerChallenge> {
        match self {
            GatewayError::Unauthorized { challenge }
            | GatewayError::PullNotGranted { challenge } => Some(challenge),
            _ => None,
        }
    }
}

/// OCI error response format
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed: {message}");
        }

        let challenge = self.challenge().map(BearerChallenge::header_value);

        let body = ErrorResponse {
            errors: vec![ErrorDetail { code, message }],
        };

        let mut response = (status, axum::Json(body)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(ERROR_CONTENT_TYPE),
        );
        if let Some(challenge) = challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, challenge);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_quotes_fields() {
        let challenge = BearerChallenge::new(
            "https://auth.example/token",
            "registry.example",
            Some("repository:alice/app:pull".to_string()),
        );

        assert_eq!(
            challenge.header_value().to_str().unwrap(),
            r#"Bearer realm="https://auth.example/token",service="registry.example",scope="repository:alice/app:pull""#
        );
    }

    #[test]
    fn challenge_omits_missing_scope() {
        let challenge = BearerChallenge::new("https://auth.example/token", "svc", None);
        let value = challenge.header_value();
        assert!(!value.to_str().unwrap().contains("scope"));
    }

    #[test]
    fn status_and_code_pairs() {
        let cases: Vec<(GatewayError, StatusCode, &str)> = vec![
            (GatewayError::Unsupported, StatusCode::NOT_FOUND, "UNSUPPORTED"),
            (
                GatewayError::MethodNotAllowed,
                StatusCode::METHOD_NOT_ALLOWED,
                "UNSUPPORTED",
            ),
            (GatewayError::NameInvalid, StatusCode::BAD_REQUEST, "NAME_INVALID"),
            (
                GatewayError::ManifestInvalid,
                StatusCode::BAD_REQUEST,
                "MANIFEST_INVALID",
            ),
            (GatewayError::DigestInvalid, StatusCode::BAD_REQUEST, "DIGEST_INVALID"),
            (GatewayError::WrongNamespace, StatusCode::FORBIDDEN, "DENIED"),
            (GatewayError::BlobUnknown, StatusCode::NOT_FOUND, "BLOB_UNKNOWN"),
            (
                GatewayError::UpstreamUnreachable,
                StatusCode::BAD_GATEWAY,
                "UNKNOWN",
            ),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status_code(), status, "{error}");
            assert_eq!(error.error_code(), code, "{error}");
        }
    }

    #[test]
    fn unauthorized_response_carries_challenge() {
        let error = GatewayError::Unauthorized {
            challenge: BearerChallenge::new("realm", "svc", None),
        };

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
    }
}
