//! Environment configuration for the gateway

use std::env;

use http::Uri;

const DEFAULT_SERVICE: &str = "localhost:5000";
const DEFAULT_TOKEN_REALM: &str = "http://localhost:5000/v2/token";
const JWKS_WELL_KNOWN_PATH: &str = "/.well-known/jwks.json";

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Token realm is not an absolute URL
    #[error("invalid REGISTRY_TOKEN_REALM: {0}")]
    InvalidRealm(String),

    /// API origin is not an absolute URL
    #[error("invalid REGISTRY_API_ORIGIN: {0}")]
    InvalidApiOrigin(String),
}

/// Settings resolved from `REGISTRY_*` environment variables.
///
/// Only the service name and token realm are usually set; the JWKS URL and
/// API origin default to paths on the realm's origin.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    service: String,
    realm: String,
    jwks_url: String,
    api_origin: String,
    api_authority: String,
}

impl GatewayConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(
            env::var("REGISTRY_SERVICE").ok(),
            env::var("REGISTRY_TOKEN_REALM").ok(),
            env::var("REGISTRY_JWKS_URL").ok(),
            env::var("REGISTRY_API_ORIGIN").ok(),
        )
    }

    /// Resolve configuration from explicit values, applying defaults for
    /// anything unset or blank.
    pub fn resolve(
        service: Option<String>,
        realm: Option<String>,
        jwks_url: Option<String>,
        api_origin: Option<String>,
    ) -> Result<Self, ConfigError> {
        let service = service
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVICE.to_string());
        let realm = realm
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_REALM.to_string());

        let (realm_origin, _) =
            origin_of(&realm).ok_or_else(|| ConfigError::InvalidRealm(realm.clone()))?;

        let jwks_url = jwks_url
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| format!("{realm_origin}{JWKS_WELL_KNOWN_PATH}"));

        let api_origin = api_origin
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(realm_origin);
        let (api_origin, api_authority) =
            origin_of(&api_origin).ok_or_else(|| ConfigError::InvalidApiOrigin(api_origin.clone()))?;

        Ok(Self {
            service,
            realm,
            jwks_url,
            api_origin,
            api_authority,
        })
    }

    /// Service name tokens must be scoped to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Token endpoint advertised in bearer challenges.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Where signing keys are published.
    ///
    /// Deliberately unparsed: a malformed value is reported per request as
    /// an `UNKNOWN` error rather than refusing to start.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Origin manifest requests are forwarded to, as `scheme://authority`.
    pub fn api_origin(&self) -> &str {
        &self.api_origin
    }

    /// Authority component of the API origin, for loop detection.
    pub fn api_authority(&self) -> &str {
        &self.api_authority
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::resolve(None, None, None, None).expect("default configuration is valid")
    }
}

/// Normalize a URL to its origin and authority. `None` if the value does
/// not parse as an absolute URL.
fn origin_of(url: &str) -> Option<(String, String)> {
    let uri: Uri = url.parse().ok()?;
    let scheme = uri.scheme_str()?;
    let authority = uri.authority()?;
    Some((format!("{scheme}://{authority}"), authority.to_string()))
}
