//! Blob reads, streamed from the object store

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, Method, header};
use axum::response::Response;
use storage::StorageErrorKind;
use tokio_util::io::ReaderStream;

use crate::api::GatewayState;
use crate::auth::{self, AuthDecision};
use crate::error::{GatewayError, GatewayResult};
use crate::validate;

/// Served when a stored blob carries no content type.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Serve a blob route from storage.
///
/// `HEAD` answers from object metadata alone; `GET` opens a reader and
/// streams without buffering the blob.
pub(crate) async fn serve(
    state: &GatewayState,
    request: Request,
    repository: &str,
    digest: &str,
) -> GatewayResult<Response> {
    let namespace = match auth::authenticate(state, request.headers(), Some(repository)).await {
        AuthDecision::Authorized(namespace) => namespace,
        AuthDecision::Rejected(error) => return Err(error),
    };

    if !validate::valid_repository(repository) {
        return Err(GatewayError::NameInvalid);
    }
    let Some(hex) = validate::digest_hex(digest) else {
        return Err(GatewayError::DigestInvalid);
    };
    let digest_header = HeaderValue::from_str(&format!("sha256:{hex}"))
        .map_err(|_| GatewayError::DigestInvalid)?;
    if !namespace.owns(repository) {
        tracing::debug!(%namespace, repository, "cross-namespace blob request");
        return Err(GatewayError::WrongNamespace);
    }

    let key = validate::blob_object_key(&hex);

    let metadata = state.blobs.metadata(&key).await.map_err(not_found_is_unknown)?;

    let content_type = metadata
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let body = if request.method() == Method::HEAD {
        Body::empty()
    } else {
        let reader = state.blobs.reader(&key).await.map_err(not_found_is_unknown)?;
        Body::from_stream(ReaderStream::new(reader))
    };

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.size));
    headers.insert(
        header::HeaderName::from_static("docker-content-digest"),
        digest_header,
    );

    Ok(response)
}

/// Missing objects become `BLOB_UNKNOWN`; other storage failures stay
/// internal.
fn not_found_is_unknown(error: storage::StorageError) -> GatewayError {
    if error.kind() == StorageErrorKind::NotFound {
        GatewayError::BlobUnknown
    } else {
        GatewayError::Storage(error)
    }
}
