use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::{validate_key, ObjectStore, StorageError};

/// Object store on a local directory: objects live at `root/bucket/key`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_key(bucket)?;
        if bucket.contains('/') {
            return Err(StorageError::InvalidKey(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.bucket_path(bucket)?.join(key))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let path = self.bucket_path(bucket)?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(io_error(&path))
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }

        // temp file + rename: readers never see a partial object
        let tmp = tmp_path(&path);
        tokio::fs::write(&tmp, &data).await.map_err(io_error(&tmp))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(&path)(e));
        }

        tracing::debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.ensure_bucket("bronze").await.unwrap();

        store
            .put("bronze", "blocks/batch=1-2/data.json", Bytes::from_static(b"[]"))
            .await
            .unwrap();

        let data = store.get("bronze", "blocks/batch=1-2/data.json").await.unwrap();
        assert_eq!(&data[..], b"[]");
        assert!(dir.path().join("bronze/blocks/batch=1-2/data.json").exists());
        assert!(!dir.path().join("bronze/blocks/batch=1-2/data.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());

        store.put("b", "k", Bytes::from_static(b"first")).await.unwrap();
        store.put("b", "k", Bytes::from_static(b"second")).await.unwrap();

        assert_eq!(&store.get("b", "k").await.unwrap()[..], b"second");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.ensure_bucket("bronze").await.unwrap();

        let err = store.get("bronze", "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { ref key, .. } if key == "nope"));
    }

    #[tokio::test]
    async fn test_ensure_bucket_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.ensure_bucket("bronze").await.unwrap();
        store.ensure_bucket("bronze").await.unwrap();
        assert!(dir.path().join("bronze").is_dir());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(matches!(
            store.put("bronze", "../x", Bytes::new()).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.ensure_bucket("a/b").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
