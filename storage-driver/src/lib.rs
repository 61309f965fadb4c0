//! # Storage driver boundary
//!
//! The object-store contract used by the gateway: an object-safe async
//! [`Driver`] trait for metadata lookups, streaming reads, and uploads,
//! along with a kind-categorized [`StorageError`].

mod driver;
mod error;

pub use driver::Driver;
pub use driver::Metadata;
pub use driver::ObjectReader;
pub use driver::Reader;
pub use error::StorageError;
pub use error::StorageErrorBuilder;
pub use error::StorageErrorKind;
