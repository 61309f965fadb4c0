//! Signing key discovery and the process-wide key set cache
//!
//! Key sets are fetched from the issuer's JWKS document and cached per URL.
//! A cached set is trusted for [`KEY_SET_TTL`]; a token naming an unknown
//! key id forces an early refetch so that key rotation does not lock
//! clients out for the full TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use http::Uri;
use http_body_util::BodyExt as _;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use tower::ServiceExt as _;

use crate::api::UpstreamService;

/// How long a fetched key set is trusted before it is refetched.
const KEY_SET_TTL: Duration = Duration::from_secs(300);

/// Minimum key set age before an unknown key id triggers a refetch.
const REFETCH_COOLDOWN: Duration = Duration::from_secs(30);

/// Failures resolving a verification key. Everything except
/// [`KeyError::InvalidUrl`] collapses into an authentication failure.
#[derive(Debug, thiserror::Error)]
pub(crate) enum KeyError {
    /// Key set URL is not an absolute URL
    #[error("invalid key set url: {0}")]
    InvalidUrl(String),

    /// Key set endpoint unreachable
    #[error("key set fetch failed: {0}")]
    Fetch(String),

    /// Key set endpoint returned a non-success status
    #[error("key set fetch returned {0}")]
    Status(http::StatusCode),

    /// Key set document did not parse
    #[error("key set parse failed")]
    Parse(#[source] serde_json::Error),

    /// No key in the set matches the token
    #[error("no usable verification key")]
    NoUsableKey,

    /// Matched key could not be turned into a verification key
    #[error("unusable verification key")]
    BadKey(#[source] jsonwebtoken::errors::Error),
}

/// Cache of JWKS resolvers, one per key set URL.
#[derive(Debug)]
pub(crate) struct KeySets {
    client: UpstreamService,
    resolvers: DashMap<String, Arc<KeySetResolver>>,
}

impl KeySets {
    pub(crate) fn new(client: UpstreamService) -> Self {
        Self {
            client,
            resolvers: DashMap::new(),
        }
    }

    /// Resolver for a key set URL, created on first use.
    ///
    /// Concurrent first lookups may race; each racer builds an equivalent
    /// resolver and one wins the slot.
    pub(crate) fn resolver(&self, url: &str) -> Result<Arc<KeySetResolver>, KeyError> {
        if let Some(existing) = self.resolvers.get(url) {
            return Ok(existing.clone());
        }

        let resolver = Arc::new(KeySetResolver::new(url, self.client.clone())?);
        Ok(self
            .resolvers
            .entry(url.to_string())
            .or_insert(resolver)
            .clone())
    }
}

/// Fetches and caches one JWKS document.
#[derive(Debug)]
pub(crate) struct KeySetResolver {
    url: Uri,
    client: UpstreamService,
    fetched: ArcSwapOption<FetchedKeys>,
}

#[derive(Debug)]
struct FetchedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

impl KeySetResolver {
    fn new(url: &str, client: UpstreamService) -> Result<Self, KeyError> {
        let uri: Uri = url
            .parse()
            .map_err(|_| KeyError::InvalidUrl(url.to_string()))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(KeyError::InvalidUrl(url.to_string()));
        }

        Ok(Self {
            url: uri,
            client,
            fetched: ArcSwapOption::empty(),
        })
    }

    /// Verification key for a token, by key id.
    ///
    /// Without a key id the set must contain exactly one usable key.
    pub(crate) async fn verification_key(
        &self,
        key_id: Option<&str>,
    ) -> Result<DecodingKey, KeyError> {
        if let Some(cached) = self.fetched.load_full() {
            let age = cached.fetched_at.elapsed();
            if age < KEY_SET_TTL {
                match select_key(&cached.keys, key_id) {
                    Some(jwk) => return decoding_key(jwk),
                    // The set may have rotated under us. Refetch, but not
                    // so often that unknown kids can hammer the issuer.
                    None if age >= REFETCH_COOLDOWN => {}
                    None => return Err(KeyError::NoUsableKey),
                }
            }
        }

        let fetched = self.refresh().await?;
        match select_key(&fetched.keys, key_id) {
            Some(jwk) => decoding_key(jwk),
            None => Err(KeyError::NoUsableKey),
        }
    }

    async fn refresh(&self) -> Result<Arc<FetchedKeys>, KeyError> {
        tracing::debug!(url = %self.url, "fetching key set");

        let request = http::Request::get(self.url.clone())
            .body(hyperdriver::Body::empty())
            .map_err(|error| KeyError::Fetch(error.to_string()))?;

        let response = self
            .client
            .clone()
            .oneshot(request)
            .await
            .map_err(|error| KeyError::Fetch(error.to_string()))?;

        if !response.status().is_success() {
            return Err(KeyError::Status(response.status()));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|error| KeyError::Fetch(error.to_string()))?
            .to_bytes();
        let keys: JwkSet = serde_json::from_slice(&body).map_err(KeyError::Parse)?;

        let fetched = Arc::new(FetchedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        self.fetched.store(Some(fetched.clone()));
        Ok(fetched)
    }
}

/// Pick the key a token should verify against. Only Ed25519 keys are
/// usable.
fn select_key<'s>(keys: &'s JwkSet, key_id: Option<&str>) -> Option<&'s Jwk> {
    let mut usable = keys
        .keys
        .iter()
        .filter(|jwk| matches!(jwk.algorithm, AlgorithmParameters::OctetKeyPair(_)));

    match key_id {
        Some(key_id) => usable.find(|jwk| jwk.common.key_id.as_deref() == Some(key_id)),
        None => {
            let first = usable.next()?;
            usable.next().is_none().then_some(first)
        }
    }
}

fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, KeyError> {
    match &jwk.algorithm {
        AlgorithmParameters::OctetKeyPair(params) => {
            DecodingKey::from_ed_components(&params.x).map_err(KeyError::BadKey)
        }
        _ => Err(KeyError::NoUsableKey),
    }
}
