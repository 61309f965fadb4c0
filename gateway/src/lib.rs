//! # OCI Registry Pull Gateway
//!
//! This crate implements the read side of the
//! [OCI Distribution Specification](https://github.com/opencontainers/distribution-spec)
//! as a thin gateway for a tenant-per-namespace registry:
//!
//! - `GET`/`HEAD /v2/` answers the API version probe
//! - `GET`/`HEAD /v2/<repository>/manifests/<reference>` proxies to the
//!   upstream metadata service
//! - `GET`/`HEAD /v2/<repository>/blobs/<digest>` streams from blob
//!   storage
//!
//! Every request carries a bearer token minted by the registry's token
//! endpoint. The gateway verifies tokens against the issuer's published
//! JWKS keys and confines callers to the namespace named by the token
//! subject. Failures use the OCI error envelope, so standard `docker` and
//! OCI clients understand them.
//!
//! ## Example
//!
//! ```no_run
//! use gateway::GatewayBuilder;
//! use storage::MemoryStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = MemoryStorage::with_buckets(&["registry"]);
//! let gateway = GatewayBuilder::new()
//!     .storage(storage.into())
//!     .bucket("registry")
//!     .build();
//!
//! // Serve the gateway with axum or any tower-compatible server
//! # Ok(())
//! # }
//! ```

mod api;
mod auth;
mod blob;
mod config;
mod error;
mod keys;
mod manifest;
mod token;
mod validate;

pub use api::GatewayBuilder;
pub use config::{ConfigError, GatewayConfig};
pub use error::{BearerChallenge, GatewayError, GatewayResult};
