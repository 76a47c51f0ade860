//! Storage adapter: object-key generation and blob locators on top of a
//! [`BlobStore`].
//!
//! A locator is the string persisted in records to reference a blob, of the
//! form `blob://<bucket>/<key>`.

use std::{sync::Arc, time::Duration};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    blob::{BlobStore, DEFAULT_CONTENT_TYPE},
    error::StorageError,
};

pub const LOCATOR_PREFIX: &str = "blob://";
pub const DEFAULT_BUCKET: &str = "devhub-storage";

/// Bucket and key addressed by a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobLocation<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
}

impl<'a> BlobLocation<'a> {
    /// Strips the scheme prefix and splits the rest on the first `/` into a
    /// non-empty bucket and key. Anything else is malformed.
    pub fn parse(locator: &'a str) -> Option<Self> {
        let rest = locator.strip_prefix(LOCATOR_PREFIX)?;
        let (bucket, key) = rest.split_once('/')?;
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self { bucket, key })
    }

    pub fn to_locator(&self) -> String {
        format!("{LOCATOR_PREFIX}{}/{}", self.bucket, self.key)
    }
}

/// File payload handed to [`StorageAdapter::upload`].
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    pub bytes: &'a [u8],
    pub content_type: Option<&'a str>,
    pub original_filename: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct StorageAdapter {
    blobs: Arc<dyn BlobStore>,
    bucket: String,
}

impl StorageAdapter {
    pub fn new(blobs: Arc<dyn BlobStore>, bucket: impl Into<String>) -> Self {
        Self {
            blobs,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Writes the payload under `folder/<uuid>-<filename>` and returns its locator.
    pub async fn upload(&self, upload: Upload<'_>, folder: &str) -> Result<String, StorageError> {
        let filename = sanitize_filename(upload.original_filename.unwrap_or_default());
        let key = format!(
            "{}/{}-{}",
            folder.trim_matches('/'),
            Uuid::new_v4(),
            filename
        );
        let content_type = upload.content_type.unwrap_or(DEFAULT_CONTENT_TYPE);

        info!(bucket = %self.bucket, key = %key, size = upload.bytes.len(), "uploading blob");
        self.blobs
            .put_object(&self.bucket, &key, upload.bytes, content_type)
            .await?;

        let locator = BlobLocation {
            bucket: &self.bucket,
            key: &key,
        }
        .to_locator();
        info!(%locator, "blob uploaded");
        Ok(locator)
    }

    /// Deletes the blob behind `locator`. A malformed locator returns
    /// `Ok(false)` without touching the blob store.
    pub async fn delete(&self, locator: &str) -> Result<bool, StorageError> {
        let Some(location) = BlobLocation::parse(locator) else {
            error!(locator, "refusing to delete malformed blob locator");
            return Ok(false);
        };

        let deleted = self
            .blobs
            .delete_object(location.bucket, location.key)
            .await?;
        if deleted {
            info!(locator, "blob deleted");
        } else {
            warn!(locator, "blob not found or already deleted");
        }
        Ok(deleted)
    }

    /// Whether the blob exists. Malformed locators report `false`.
    pub async fn exists(&self, locator: &str) -> Result<bool, StorageError> {
        let Some(location) = BlobLocation::parse(locator) else {
            return Ok(false);
        };
        Ok(self
            .blobs
            .object_exists(location.bucket, location.key)
            .await?)
    }

    /// Issues a time-limited download URL for the blob.
    pub fn signed_url(&self, locator: &str, duration_minutes: u64) -> Result<String, StorageError> {
        let location = BlobLocation::parse(locator)
            .ok_or_else(|| StorageError::MalformedLocator(locator.to_string()))?;
        let ttl = Duration::from_secs(duration_minutes.saturating_mul(60));
        let url = self.blobs.presign_url(location.bucket, location.key, ttl)?;
        info!(locator, duration_minutes, "signed URL issued");
        Ok(url)
    }
}

/// Keeps the final path component and replaces characters that are not safe
/// in an object key or URL path.
fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blob::{BlobObject, LocalBlobStore, UrlSigner},
        error::BlobError,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn local_adapter(temp: &TempDir) -> StorageAdapter {
        let signer = UrlSigner::new(b"secret".to_vec()).unwrap();
        let blobs = LocalBlobStore::new(temp.path(), "http://127.0.0.1:8080", signer);
        StorageAdapter::new(Arc::new(blobs), DEFAULT_BUCKET)
    }

    /// Blob store that only counts calls.
    #[derive(Debug, Default)]
    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BlobStore for CountingStore {
        async fn put_object(&self, _: &str, _: &str, _: &[u8], _: &str) -> Result<(), BlobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn get_object(&self, _: &str, _: &str) -> Result<Option<BlobObject>, BlobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn delete_object(&self, _: &str, _: &str) -> Result<bool, BlobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn object_exists(&self, _: &str, _: &str) -> Result<bool, BlobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn presign_url(&self, _: &str, _: &str, _: Duration) -> Result<String, BlobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("https://signed".into())
        }
    }

    #[test]
    fn parse_locator() {
        let location = BlobLocation::parse("blob://bucket/snippets/a-b.rs").unwrap();
        assert_eq!(location.bucket, "bucket");
        assert_eq!(location.key, "snippets/a-b.rs");
        assert_eq!(location.to_locator(), "blob://bucket/snippets/a-b.rs");

        for malformed in [
            "bucket/key",
            "gs://bucket/key",
            "blob://bucket",
            "blob://bucket/",
            "blob:///key",
            "",
        ] {
            assert!(BlobLocation::parse(malformed).is_none(), "{malformed}");
        }
    }

    #[test]
    fn filenames_are_reduced_to_safe_basenames() {
        assert_eq!(sanitize_filename("fib.py"), "fib.py");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\code\\my file.rs"), "my_file.rs");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[tokio::test]
    async fn upload_exists_delete_roundtrip() {
        let temp = TempDir::new().unwrap();
        let storage = local_adapter(&temp);

        let locator = storage
            .upload(
                Upload {
                    bytes: b"fn main() {}",
                    content_type: Some("text/x-rust"),
                    original_filename: Some("main.rs"),
                },
                "snippets",
            )
            .await
            .unwrap();

        let location = BlobLocation::parse(&locator).unwrap();
        assert_eq!(location.bucket, storage.bucket());
        assert!(location.key.starts_with("snippets/"));
        assert!(location.key.ends_with("-main.rs"));

        assert!(storage.exists(&locator).await.unwrap());
        assert!(storage.delete(&locator).await.unwrap());
        assert!(!storage.exists(&locator).await.unwrap());
        assert!(!storage.delete(&locator).await.unwrap());
    }

    #[tokio::test]
    async fn uploads_of_same_file_get_distinct_keys() {
        let temp = TempDir::new().unwrap();
        let storage = local_adapter(&temp);
        let upload = Upload {
            bytes: b"x",
            content_type: None,
            original_filename: Some("same.txt"),
        };

        let first = storage.upload(upload, "snippets").await.unwrap();
        let second = storage.upload(upload, "snippets").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn malformed_locators_never_reach_the_store() {
        let counting = Arc::new(CountingStore::default());
        let storage = StorageAdapter::new(counting.clone(), DEFAULT_BUCKET);

        assert!(!storage.delete("devhub-storage/snippets/x").await.unwrap());
        assert!(!storage.delete("blob://no-key").await.unwrap());
        assert!(!storage.exists("gs://bucket/key").await.unwrap());
        assert!(matches!(
            storage.signed_url("not-a-locator", 15),
            Err(StorageError::MalformedLocator(_))
        ));
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);

        assert!(storage.delete("blob://bucket/key").await.unwrap());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn signed_url_points_at_download_route() {
        let temp = TempDir::new().unwrap();
        let storage = local_adapter(&temp);
        let locator = storage
            .upload(
                Upload {
                    bytes: b"print(1)",
                    content_type: Some("text/x-python"),
                    original_filename: Some("one.py"),
                },
                "snippets",
            )
            .await
            .unwrap();

        let url = storage.signed_url(&locator, 15).unwrap();
        let key = BlobLocation::parse(&locator).unwrap().key;
        assert!(url.starts_with(&format!(
            "http://127.0.0.1:8080/api/files/{DEFAULT_BUCKET}/{key}?expires="
        )));
        assert!(url.contains("&signature="));
    }

    #[test]
    fn signed_url_rejects_lifetimes_past_the_clock_range() {
        let temp = TempDir::new().unwrap();
        let storage = local_adapter(&temp);
        let locator = "blob://devhub-storage/snippets/x.rs";

        for minutes in [u64::MAX, (i64::MAX as u64) / 60] {
            assert!(
                matches!(
                    storage.signed_url(locator, minutes),
                    Err(StorageError::Blob(BlobError::TtlOutOfRange(_)))
                ),
                "{minutes}"
            );
        }
        assert!(storage.signed_url(locator, 7 * 24 * 60).is_ok());
    }
}
