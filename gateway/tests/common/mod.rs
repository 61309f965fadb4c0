//! Shared test fixtures: a canned upstream service and token minting

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use camino::Utf8PathBuf;
use ed25519_dalek::{Signer as _, SigningKey};
use gateway::{GatewayBuilder, GatewayConfig};
use serde_json::{Value, json};
use sha2::{Digest as _, Sha256};
use storage::Storage;

/// Service name tokens are scoped to.
pub const TEST_SERVICE: &str = "registry.test";
/// Token endpoint advertised in challenges.
pub const TEST_REALM: &str = "https://auth.test/v2/token";
/// Where the canned upstream serves signing keys.
pub const TEST_JWKS_URL: &str = "https://upstream.test/.well-known/jwks.json";
/// API origin manifest requests are forwarded to.
pub const TEST_API_ORIGIN: &str = "https://upstream.test";
/// Bucket blobs are served from.
pub const TEST_BUCKET: &str = "test-registry";

/// Key id published in the test JWKS document.
pub const TEST_KEY_ID: &str = "test-key-1";

/// A request observed by the canned upstream.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: http::Method,
    pub uri: http::Uri,
    pub headers: http::HeaderMap,
}

#[derive(Debug, Clone)]
enum MockReply {
    Respond {
        status: http::StatusCode,
        headers: http::HeaderMap,
        body: Vec<u8>,
    },
    Fail,
}

/// Canned upstream service, keyed by request path.
///
/// Serves the test JWKS document by default and records every request it
/// sees. Unconfigured paths panic so tests notice stray traffic.
#[derive(Debug, Clone)]
pub struct MockUpstream {
    replies: HashMap<String, MockReply>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        let mut mock = Self {
            replies: HashMap::new(),
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        mock.add(
            "/.well-known/jwks.json",
            http::StatusCode::OK,
            http::HeaderMap::new(),
            jwks_document(),
        );
        mock
    }

    pub fn add(
        &mut self,
        path: &str,
        status: http::StatusCode,
        headers: http::HeaderMap,
        body: Vec<u8>,
    ) {
        self.replies
            .insert(path.to_owned(), MockReply::Respond { status, headers, body });
    }

    /// Simulate a transport failure for a path.
    pub fn fail(&mut self, path: &str) {
        self.replies.insert(path.to_owned(), MockReply::Fail);
    }

    /// Every request the upstream has seen, in order.
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Paths of requests seen, for quick assertions.
    pub fn seen_paths(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| request.uri.path().to_owned())
            .collect()
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl tower::Service<hyperdriver::body::Request> for MockUpstream {
    type Response = hyperdriver::body::Response;
    type Error = tower::BoxError;
    type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: hyperdriver::body::Request) -> Self::Future {
        let path = req.uri().path().to_owned();
        self.seen.lock().unwrap().push(SeenRequest {
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
        });

        let reply = self
            .replies
            .get(&path)
            .unwrap_or_else(|| panic!("no response configured for path: {path}"));

        let result = match reply {
            MockReply::Respond {
                status,
                headers,
                body,
            } => {
                let mut builder = http::response::Builder::new()
                    .status(*status)
                    .version(http::Version::HTTP_11);
                for (key, value) in headers.iter() {
                    builder = builder.header(key, value);
                }
                Ok(builder
                    .body(hyperdriver::Body::from(Bytes::from(body.clone())))
                    .unwrap())
            }
            MockReply::Fail => Err(tower::BoxError::from(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        };

        std::future::ready(result)
    }
}

/// Deterministic issuer signing key.
pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

/// A key the JWKS document does not know about.
pub fn rogue_signing_key() -> SigningKey {
    SigningKey::from_bytes(&[9u8; 32])
}

/// JWKS document holding the test verification key.
pub fn jwks_document() -> Vec<u8> {
    let verifying = signing_key().verifying_key();
    let x = URL_SAFE_NO_PAD.encode(verifying.as_bytes());
    serde_json::to_vec(&json!({
        "keys": [{
            "kty": "OKP",
            "crv": "Ed25519",
            "alg": "EdDSA",
            "use": "sig",
            "kid": TEST_KEY_ID,
            "x": x,
        }]
    }))
    .unwrap()
}

/// Access list granting pull on one repository.
pub fn pull_grant(repository: &str) -> Value {
    json!([{"type": "repository", "name": repository, "actions": ["pull"]}])
}

/// Builder for test access tokens. Defaults mint a valid token for the
/// `alice` namespace with no grants.
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    subject: String,
    audience: String,
    issuer: String,
    key_id: Option<String>,
    lifetime: i64,
    access: Value,
    key: SigningKey,
    algorithm: &'static str,
}

impl TokenBuilder {
    pub fn new() -> Self {
        Self {
            subject: "alice".to_owned(),
            audience: TEST_SERVICE.to_owned(),
            issuer: TEST_SERVICE.to_owned(),
            key_id: Some(TEST_KEY_ID.to_owned()),
            lifetime: 300,
            access: json!([]),
            key: signing_key(),
            algorithm: "EdDSA",
        }
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_owned();
        self
    }

    pub fn audience(mut self, audience: &str) -> Self {
        self.audience = audience.to_owned();
        self
    }

    pub fn issuer(mut self, issuer: &str) -> Self {
        self.issuer = issuer.to_owned();
        self
    }

    pub fn key_id(mut self, key_id: Option<&str>) -> Self {
        self.key_id = key_id.map(str::to_owned);
        self
    }

    /// Seconds until expiry; negative values mint already-expired tokens.
    pub fn lifetime(mut self, seconds: i64) -> Self {
        self.lifetime = seconds;
        self
    }

    pub fn access(mut self, access: Value) -> Self {
        self.access = access;
        self
    }

    pub fn signing_key(mut self, key: SigningKey) -> Self {
        self.key = key;
        self
    }

    pub fn algorithm(mut self, algorithm: &'static str) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sign and serialize the token in compact form.
    pub fn mint(&self) -> String {
        let mut header = serde_json::Map::new();
        header.insert("alg".to_owned(), json!(self.algorithm));
        header.insert("typ".to_owned(), json!("JWT"));
        if let Some(key_id) = &self.key_id {
            header.insert("kid".to_owned(), json!(key_id));
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let claims = json!({
            "sub": self.subject,
            "aud": self.audience,
            "iss": self.issuer,
            "iat": now,
            "nbf": now,
            "exp": now + self.lifetime,
            "access": self.access,
        });

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap()),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap())
        );
        let signature = self.key.sign(signing_input.as_bytes());
        format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }
}

impl Default for TokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Token granting pull on one repository, for the repository's namespace.
pub fn pull_token(repository: &str) -> String {
    let namespace = repository.split('/').next().unwrap();
    TokenBuilder::new()
        .subject(namespace)
        .access(pull_grant(repository))
        .mint()
}

/// Gateway configuration pointing at the canned upstream.
pub fn test_config() -> GatewayConfig {
    GatewayConfig::resolve(
        Some(TEST_SERVICE.to_owned()),
        Some(TEST_REALM.to_owned()),
        Some(TEST_JWKS_URL.to_owned()),
        Some(TEST_API_ORIGIN.to_owned()),
    )
    .unwrap()
}

/// Empty in-memory storage with the test bucket.
pub fn test_storage() -> Storage {
    storage::MemoryStorage::with_buckets(&[TEST_BUCKET]).into()
}

/// Build a gateway around the given upstream and storage.
pub fn gateway(upstream: MockUpstream, storage: Storage) -> axum::Router {
    GatewayBuilder::new()
        .storage(storage)
        .bucket(TEST_BUCKET)
        .config(test_config())
        .upstream(upstream)
        .build()
}

/// Store a blob under its digest key and return the `sha256:` digest.
pub async fn seed_blob(storage: &Storage, data: &[u8], content_type: Option<&str>) -> String {
    let hex = hex::encode(Sha256::digest(data));
    let key = Utf8PathBuf::from(format!("blobs/sha256/{}/{}", &hex[..2], hex));

    let mut reader = data;
    storage
        .upload(TEST_BUCKET, &key, content_type, &mut reader)
        .await
        .unwrap();

    format!("sha256:{hex}")
}

/// Collect a response body.
pub async fn read_body(response: axum::response::Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

/// Parse a response body as an OCI error envelope and return
/// `(code, message)` of the first error.
pub async fn read_error(response: axum::response::Response) -> (String, String) {
    let body = read_body(response).await;
    let envelope: Value = serde_json::from_slice(&body).unwrap();
    let first = &envelope["errors"][0];
    (
        first["code"].as_str().unwrap().to_owned(),
        first["message"].as_str().unwrap().to_owned(),
    )
}
