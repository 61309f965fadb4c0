//! Access token claims and grant checks

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

/// Clock skew tolerated when checking `exp` and `nbf`, in seconds.
const LEEWAY_SECONDS: u64 = 30;

/// Claims carried by a registry access token.
///
/// Registered claims (`exp`, `nbf`, `aud`, `iss`) are checked during
/// signature verification and not materialized here.
#[derive(Debug, Deserialize)]
pub(crate) struct AccessClaims {
    /// Token subject, expected to name a registry namespace.
    #[serde(default)]
    pub(crate) sub: String,

    /// Raw `access` claim. Kept untyped so that a missing or oddly shaped
    /// claim reads as "no grants" instead of failing verification.
    #[serde(default)]
    pub(crate) access: Value,
}

/// One entry of a token's `access` list.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub(crate) struct AccessEntry {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    actions: Vec<String>,
}

impl AccessEntry {
    /// Parse a raw access entry. Malformed entries yield `None`.
    fn parse(raw: &Value) -> Option<Self> {
        serde_json::from_value(raw.clone()).ok()
    }

    fn allows_pull(&self, repository: &str) -> bool {
        self.kind == "repository"
            && self.name == repository
            && self
                .actions
                .iter()
                .any(|action| action == "pull" || action == "*")
    }
}

/// Whether the `access` claim grants pull on the repository.
///
/// Entries that fail to parse are skipped rather than failing the whole
/// token.
pub(crate) fn allows_pull(access: &Value, repository: &str) -> bool {
    access
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(AccessEntry::parse)
                .any(|entry| entry.allows_pull(repository))
        })
        .unwrap_or(false)
}

/// Verification rules for access tokens: EdDSA signatures, audience and
/// issuer pinned to the service name, expiry required.
pub(crate) fn verification_rules(service: &str) -> Validation {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_audience(&[service]);
    validation.set_issuer(&[service]);
    validation.leeway = LEEWAY_SECONDS;
    validation.validate_nbf = true;
    validation
}

/// Verify a compact token against a resolved key and extract its claims.
pub(crate) fn verify(
    token: &str,
    key: &DecodingKey,
    service: &str,
) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
    let data = jsonwebtoken::decode::<AccessClaims>(token, key, &verification_rules(service))?;
    Ok(data.claims)
}
