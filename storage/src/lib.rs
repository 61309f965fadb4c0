//! # Storage backends
//!
//! Configuration and unification for the storage backends.

use std::sync::Arc;

use camino::Utf8Path;
#[cfg(feature = "local")]
use camino::Utf8PathBuf;
use serde::Deserialize;

#[cfg(feature = "local")]
pub(crate) mod local;

pub(crate) mod memory;

#[cfg(feature = "local")]
#[doc(inline)]
pub use local::LocalDriver;

#[doc(inline)]
pub use memory::MemoryStorage;

#[doc(inline)]
pub use storage_driver::{Driver, Metadata, ObjectReader, StorageError, StorageErrorKind};

/// Storage backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageConfig {
    /// Objects held in process memory. For tests and demos.
    Memory {
        /// Bucket created at startup.
        bucket: String,
    },

    /// Objects in a local filesystem tree.
    #[cfg(feature = "local")]
    Local {
        /// Root directory, holding one subdirectory per bucket.
        path: Utf8PathBuf,
    },
}

impl StorageConfig {
    /// Construct the configured storage backend.
    #[tracing::instrument]
    pub async fn build(self) -> Result<Storage, StorageError> {
        let client: Storage = match self {
            StorageConfig::Memory { bucket } => MemoryStorage::with_buckets(&[&bucket]).into(),
            #[cfg(feature = "local")]
            StorageConfig::Local { path } => LocalDriver::new(path).into(),
        };
        Ok(client)
    }
}

use tokio::io;

pub(crate) type ArcDriver = Arc<dyn Driver + Send + Sync>;

/// A cloneable handle over a shared storage driver.
#[derive(Debug, Clone)]
pub struct Storage {
    driver: ArcDriver,
}

impl<D> From<D> for Storage
where
    D: Driver + Send + Sync + 'static,
{
    fn from(value: D) -> Self {
        Storage::new(value)
    }
}

impl Storage {
    /// Wrap a driver in a shared storage handle.
    pub fn new<D: Driver + Send + Sync + 'static>(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// The name of the underlying driver.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// Bind this storage to a single bucket.
    pub fn bucket<S: Into<String>>(&self, bucket: S) -> StorageBucket {
        StorageBucket {
            driver: self.driver.clone(),
            bucket: bucket.into(),
        }
    }

    /// Get the metadata for an object, by path.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn metadata(
        &self,
        bucket: &str,
        remote: &Utf8Path,
    ) -> Result<Metadata, StorageError> {
        self.driver.metadata(bucket, remote).await
    }

    /// Open an object for streaming reads.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn reader(
        &self,
        bucket: &str,
        remote: &Utf8Path,
    ) -> Result<ObjectReader, StorageError> {
        tracing::trace!(%remote, "Reading from: {bucket}/{remote}");
        self.driver.reader(bucket, remote).await
    }

    /// Store an object, using a reader stream to provide the contents.
    #[tracing::instrument(skip(self, reader), fields(driver=self.driver.name(), bucket))]
    pub async fn upload<'d, R>(
        &'d self,
        bucket: &str,
        remote: &Utf8Path,
        content_type: Option<&str>,
        reader: &mut R,
    ) -> Result<(), StorageError>
    where
        R: io::AsyncBufRead + Unpin + Send + Sync + 'd,
    {
        tracing::trace!(%remote, "Uploading to: {bucket}/{remote}");
        self.driver
            .upload(bucket, remote, content_type, reader)
            .await?;
        Ok(())
    }
}

/// A [`Storage`] handle bound to a single bucket.
#[derive(Debug, Clone)]
pub struct StorageBucket {
    /// The bucket all operations address.
    pub bucket: String,
    driver: Arc<dyn Driver + Send + Sync + 'static>,
}

impl StorageBucket {
    /// Get the metadata for an object, by path.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        self.driver.metadata(&self.bucket, remote).await
    }

    /// Open an object for streaming reads.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn reader(&self, remote: &Utf8Path) -> Result<ObjectReader, StorageError> {
        tracing::trace!(%remote, "Reading from: {}/{remote}", self.bucket);
        self.driver.reader(&self.bucket, remote).await
    }

    /// Store an object, using a reader stream to provide the contents.
    #[tracing::instrument(skip(self, reader), fields(driver=self.driver.name(), bucket=self.bucket))]
    pub async fn upload<'d, R>(
        &'d self,
        remote: &Utf8Path,
        content_type: Option<&str>,
        reader: &mut R,
    ) -> Result<(), StorageError>
    where
        R: io::AsyncBufRead + Unpin + Send + Sync + 'd,
    {
        tracing::trace!(%remote, "Uploading to: {}/{remote}", self.bucket);
        self.driver
            .upload(&self.bucket, remote, content_type, reader)
            .await?;
        Ok(())
    }
}
