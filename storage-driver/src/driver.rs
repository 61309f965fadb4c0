#![allow(clippy::needless_pass_by_ref_mut)]

use std::{fmt, ops::Deref, sync::Arc};

use camino::Utf8Path;
use tokio::io;

use crate::error::StorageError;

/// A reader stream for object contents.
pub type Reader<'r> = dyn io::AsyncBufRead + Unpin + Send + Sync + 'r;

/// An owned reader over an object's bytes, handed out by [`Driver::reader`].
///
/// Buffered so callers can bridge it into a byte stream without an extra
/// copy layer.
pub type ObjectReader = Box<dyn io::AsyncBufRead + Unpin + Send + Sync + 'static>;

/// Object metadata, generically provided by every driver.
///
/// This struct only provides common metadata fields, and drivers may provide
/// more specific metadata fields directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metadata {
    /// The size of the object in bytes.
    pub size: u64,

    /// The content type recorded when the object was stored, if any.
    pub content_type: Option<String>,
}

/// A storage driver, which provides the ability to interact with a storage backend.
///
/// The surface is read-heavy: serving reads requires `metadata` and `reader`,
/// while `upload` exists so stores can be populated (fixtures, companion
/// write paths). Objects are immutable once written.
#[async_trait::async_trait]
pub trait Driver: fmt::Debug {
    /// The name of the driver.
    fn name(&self) -> &'static str;

    /// Get the metadata for an object, by path.
    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError>;

    /// Open an object for streaming reads.
    async fn reader(&self, bucket: &str, remote: &Utf8Path) -> Result<ObjectReader, StorageError>;

    /// Store an object, using a reader stream to provide the contents.
    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        content_type: Option<&str>,
        reader: &mut Reader<'_>,
    ) -> Result<(), StorageError>;
}

#[async_trait::async_trait]
impl<D> Driver for Arc<D>
where
    D: ?Sized + Driver + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.deref().name()
    }

    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        self.deref().metadata(bucket, remote).await
    }

    async fn reader(&self, bucket: &str, remote: &Utf8Path) -> Result<ObjectReader, StorageError> {
        self.deref().reader(bucket, remote).await
    }

    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        content_type: Option<&str>,
        reader: &mut Reader<'_>,
    ) -> Result<(), StorageError> {
        self.deref()
            .upload(bucket, remote, content_type, reader)
            .await
    }
}
