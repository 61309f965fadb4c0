//! Gateway builder, router, and request dispatch

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AuthDecision};
use crate::config::GatewayConfig;
use crate::error::{BearerChallenge, GatewayError};
use crate::keys::KeySets;
use crate::{blob, manifest};

/// Version header stamped on every response.
const API_VERSION_HEADER: &str = "docker-distribution-api-version";
const API_VERSION: &str = "registry/2.0";

/// HTTP client used for upstream calls: JWKS fetches and manifest
/// proxying.
pub(crate) type UpstreamService = tower::util::BoxCloneSyncService<
    http::Request<hyperdriver::Body>,
    http::Response<hyperdriver::Body>,
    tower::BoxError,
>;

/// Gateway builder for configuring and creating the pull service
#[derive(Debug)]
pub struct GatewayBuilder {
    storage: Option<storage::Storage>,
    bucket: Option<String>,
    config: Option<GatewayConfig>,
    upstream: Option<UpstreamService>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    /// Create a new gateway builder
    pub fn new() -> Self {
        Self {
            storage: None,
            bucket: None,
            config: None,
            upstream: None,
        }
    }

    /// Set the storage backend holding blob objects
    pub fn storage(mut self, storage: storage::Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the bucket name for blob storage
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Set the gateway configuration
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the upstream HTTP client.
    ///
    /// Defaults to a TLS-capable TCP client; tests inject a canned
    /// service here.
    pub fn upstream<S>(mut self, service: S) -> Self
    where
        S: tower::Service<
                http::Request<hyperdriver::Body>,
                Response = http::Response<hyperdriver::Body>,
            >
            + Clone
            + Send
            + Sync
            + 'static,
        S::Error: Into<tower::BoxError>,
        S::Future: Send + 'static,
    {
        let service = tower::ServiceBuilder::new()
            .map_err(Into::<tower::BoxError>::into)
            .service(service);
        self.upstream = Some(UpstreamService::new(service));
        self
    }

    /// Build the gateway service
    ///
    /// Returns a Router that can be served with any tower-compatible
    /// server
    pub fn build(self) -> Router {
        let storage = self.storage.expect("storage backend must be configured");
        let bucket = self.bucket.unwrap_or_else(|| "registry".to_string());
        let config = Arc::new(self.config.unwrap_or_default());
        let client = self.upstream.unwrap_or_else(default_client);

        let state = GatewayState {
            blobs: storage.bucket(bucket),
            keys: Arc::new(KeySets::new(client.clone())),
            client,
            config,
        };

        // Build the router. Manifest and blob routes allow `/` in the
        // repository, so they dispatch on the raw path from a fallback
        // instead of a path pattern.
        Router::new()
            .route("/v2", any(root_probe))
            .route("/v2/", any(root_probe))
            .fallback(dispatch)
            .layer(middleware::from_fn(strip_body_for_head))
            .layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static(API_VERSION_HEADER),
                HeaderValue::from_static(API_VERSION),
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

fn default_client() -> UpstreamService {
    let client = hyperdriver::Client::build_tcp_http()
        .with_default_tls()
        .build_service();
    UpstreamService::new(
        tower::ServiceBuilder::new()
            .map_err(Into::<tower::BoxError>::into)
            .service(client),
    )
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub(crate) struct GatewayState {
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) blobs: storage::StorageBucket,
    pub(crate) client: UpstreamService,
    pub(crate) keys: Arc<KeySets>,
}

impl GatewayState {
    /// Bearer challenge for this gateway, scoped to a repository when one
    /// is in play.
    pub(crate) fn challenge(&self, repository: Option<&str>) -> BearerChallenge {
        BearerChallenge::new(
            self.config.realm(),
            self.config.service(),
            repository.map(auth::pull_scope),
        )
    }
}

/// API root probe
///
/// Returns an empty 200 for authenticated callers so clients can
/// discover the registry API.
async fn root_probe(State(state): State<GatewayState>, request: Request) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return GatewayError::MethodNotAllowed.into_response();
    }

    match auth::authenticate(&state, request.headers(), None).await {
        AuthDecision::Authorized(_) => StatusCode::OK.into_response(),
        AuthDecision::Rejected(error) => error.into_response(),
    }
}

/// Dispatch repository routes from the raw request path.
async fn dispatch(
    State(state): State<GatewayState>,
    request: Request,
) -> Result<Response, GatewayError> {
    let path = request.uri().path().to_owned();

    let Some(rest) = path.strip_prefix("/v2/") else {
        return Err(GatewayError::Unsupported);
    };

    if let Some((repository, reference)) = route_split(rest, "/manifests/") {
        require_read_method(&request)?;
        return manifest::serve(&state, request, repository, reference).await;
    }

    if let Some((repository, digest)) = route_split(rest, "/blobs/") {
        require_read_method(&request)?;
        return blob::serve(&state, request, repository, digest).await;
    }

    Err(GatewayError::Unsupported)
}

/// Split `<repository><anchor><tail>` greedily: the repository runs to the
/// last anchor, and the tail must be a single non-empty segment.
fn route_split<'p>(path: &'p str, anchor: &str) -> Option<(&'p str, &'p str)> {
    let (repository, tail) = path.rsplit_once(anchor)?;
    if repository.is_empty() || tail.is_empty() || tail.contains('/') {
        return None;
    }
    Some((repository, tail))
}

fn require_read_method(request: &Request) -> Result<(), GatewayError> {
    if request.method() == Method::GET || request.method() == Method::HEAD {
        Ok(())
    } else {
        Err(GatewayError::Unsupported)
    }
}

/// `HEAD` responses keep the status and headers of their `GET`
/// counterpart but never a body.
async fn strip_body_for_head(request: Request, next: Next) -> Response {
    let is_head = request.method() == Method::HEAD;
    let mut response = next.run(request).await;
    if is_head {
        *response.body_mut() = Body::empty();
    }
    response
}

fn _assert_send<F: Send>(_: F) {}
#[allow(dead_code)]
fn _probe(state: GatewayState, request: Request) {
    _assert_send(dispatch(State(state), request));
}
