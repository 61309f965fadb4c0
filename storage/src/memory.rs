use std::collections::HashMap;
use std::io::Cursor;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::{io::AsyncWriteExt, sync::RwLock};

use storage_driver::{Driver, Metadata, ObjectReader, Reader, StorageError, StorageErrorKind};

/// Helper to convert io::Error to StorageError with appropriate kind detection
fn io_error_to_storage(engine: &'static str, err: std::io::Error) -> StorageError {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
        _ => StorageErrorKind::Io,
    };
    StorageError::new(engine, kind, err)
}

fn bucket_not_found(engine: &'static str, bucket: &str) -> StorageError {
    StorageError::builder(
        engine,
        StorageErrorKind::NotFound,
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Bucket not found: {bucket}"),
        ),
    )
    .bucket(bucket)
    .build()
}

fn path_not_found(engine: &'static str, bucket: &str, remote: &Utf8Path) -> StorageError {
    StorageError::builder(
        engine,
        StorageErrorKind::NotFound,
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Path not found: {remote}"),
        ),
    )
    .bucket(bucket)
    .path(remote.as_str())
    .build()
}

#[derive(Debug)]
struct MemoryItem {
    content_type: Option<String>,
    data: Vec<u8>,
}

impl From<&MemoryItem> for Metadata {
    fn from(value: &MemoryItem) -> Self {
        Self {
            size: value.data.len() as u64,
            content_type: value.content_type.clone(),
        }
    }
}

/// Storage driver that holds objects in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: RwLock<HashMap<String, HashMap<Utf8PathBuf, MemoryItem>>>,
}

impl MemoryStorage {
    /// Create a new `MemoryStorage` instance, with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new `MemoryStorage` instance, with the given buckets.
    pub fn with_buckets(buckets: &[&str]) -> Self {
        let mut map = HashMap::new();
        for bucket in buckets {
            map.insert(bucket.to_string(), HashMap::new());
        }

        Self {
            buckets: RwLock::new(map),
        }
    }

    /// Create a new bucket in the storage.
    pub async fn create_bucket(&self, bucket: String) {
        let mut buckets = self.buckets.write().await;
        buckets.insert(bucket, HashMap::new());
    }
}

#[async_trait::async_trait]
impl Driver for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let buckets = self.buckets.read().await;
        let bucket_map = buckets
            .get(bucket)
            .ok_or_else(|| bucket_not_found(self.name(), bucket))?;
        Ok(bucket_map
            .get(remote)
            .ok_or_else(|| path_not_found(self.name(), bucket, remote))?
            .into())
    }

    async fn reader(&self, bucket: &str, remote: &Utf8Path) -> Result<ObjectReader, StorageError> {
        let buckets = self.buckets.read().await;
        let bucket_map = buckets
            .get(bucket)
            .ok_or_else(|| bucket_not_found(self.name(), bucket))?;
        let item = bucket_map
            .get(remote)
            .ok_or_else(|| path_not_found(self.name(), bucket, remote))?;

        Ok(Box::new(Cursor::new(item.data.clone())))
    }

    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        content_type: Option<&str>,
        reader: &mut Reader<'_>,
    ) -> Result<(), StorageError> {
        let mut buf = Vec::new();

        tokio::io::copy(reader, &mut buf)
            .await
            .map_err(|err| io_error_to_storage(self.name(), err))?;

        buf.shutdown()
            .await
            .map_err(|err| io_error_to_storage(self.name(), err))?;

        let mut buckets = self.buckets.write().await;
        let bucket_map = buckets.entry(bucket.to_string()).or_default();
        bucket_map.insert(
            remote.to_owned(),
            MemoryItem {
                content_type: content_type.map(String::from),
                data: buf,
            },
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn upload_and_read_back() {
        let store = MemoryStorage::with_buckets(&["blobs"]);
        let data = b"layer bytes";

        store
            .upload(
                "blobs",
                "blobs/sha256/ab/abcd".into(),
                Some("application/gzip"),
                &mut &data[..],
            )
            .await
            .unwrap();

        let meta = store
            .metadata("blobs", "blobs/sha256/ab/abcd".into())
            .await
            .unwrap();
        assert_eq!(meta.size, data.len() as u64);
        assert_eq!(meta.content_type.as_deref(), Some("application/gzip"));

        let mut reader = store
            .reader("blobs", "blobs/sha256/ab/abcd".into())
            .await
            .unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = MemoryStorage::with_buckets(&["blobs"]);

        let err = store
            .metadata("blobs", "blobs/sha256/00/nothing".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);

        let err = store
            .reader("missing-bucket", "anything".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
    }

    #[tokio::test]
    async fn content_type_is_optional() {
        let store = MemoryStorage::new();
        store.create_bucket("blobs".to_string()).await;

        store
            .upload("blobs", "key".into(), None, &mut &b"data"[..])
            .await
            .unwrap();

        let meta = store.metadata("blobs", "key".into()).await.unwrap();
        assert_eq!(meta.content_type, None);
    }
}
