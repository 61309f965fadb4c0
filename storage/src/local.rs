use camino::{Utf8Path, Utf8PathBuf};
use tokio::io::AsyncWriteExt;

use storage_driver::{Driver, Metadata, ObjectReader, Reader, StorageError, StorageErrorKind};

fn fs_error(
    err: std::io::Error,
    engine: &'static str,
    bucket: &str,
    remote: &Utf8Path,
) -> StorageError {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
        _ => StorageErrorKind::Io,
    };
    StorageError::builder(engine, kind, err)
        .bucket(bucket)
        .path(remote.as_str())
        .build()
}

/// Storage driver over a local filesystem tree.
///
/// Objects for bucket `b` at key `k` live at `<root>/b/k`, so a tree
/// populated by another process with the same layout is served as-is.
/// Filesystem objects carry no content type.
#[derive(Debug)]
pub struct LocalDriver {
    root: Utf8PathBuf,
}

impl LocalDriver {
    /// Create a driver rooted at the given directory.
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn path(&self, bucket: &str, remote: &Utf8Path) -> Utf8PathBuf {
        let mut path = self.root.join(bucket);
        path.push(remote);
        path
    }
}

#[async_trait::async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let local = self.path(bucket, remote);
        let metadata = tokio::fs::metadata(local)
            .await
            .map_err(|err| fs_error(err, self.name(), bucket, remote))?;
        Ok(Metadata {
            size: metadata.len(),
            content_type: None,
        })
    }

    async fn reader(&self, bucket: &str, remote: &Utf8Path) -> Result<ObjectReader, StorageError> {
        let local = self.path(bucket, remote);
        let file = tokio::fs::File::open(local)
            .await
            .map_err(|err| fs_error(err, self.name(), bucket, remote))?;
        Ok(Box::new(tokio::io::BufReader::new(file)))
    }

    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        _content_type: Option<&str>,
        reader: &mut Reader<'_>,
    ) -> Result<(), StorageError> {
        let local = self.path(bucket, remote);

        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| fs_error(err, self.name(), bucket, remote))?;
        }

        let mut writer = tokio::io::BufWriter::new(
            tokio::fs::File::create(&local)
                .await
                .map_err(|err| fs_error(err, self.name(), bucket, remote))?,
        );

        tokio::io::copy(reader, &mut writer)
            .await
            .map_err(|err| fs_error(err, self.name(), bucket, remote))?;

        writer
            .shutdown()
            .await
            .map_err(|err| fs_error(err, self.name(), bucket, remote))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn test_root(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn upload_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new(test_root(&dir));
        let data = b"blob on disk";

        driver
            .upload("blobs", "blobs/sha256/ab/abcd".into(), None, &mut &data[..])
            .await
            .unwrap();

        let meta = driver
            .metadata("blobs", "blobs/sha256/ab/abcd".into())
            .await
            .unwrap();
        assert_eq!(meta.size, data.len() as u64);
        assert_eq!(meta.content_type, None);

        let mut reader = driver
            .reader("blobs", "blobs/sha256/ab/abcd".into())
            .await
            .unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new(test_root(&dir));

        let err = driver
            .metadata("blobs", "blobs/sha256/00/nothing".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
    }
}
