//! Object storage for uploaded snippet files.
//!
//! [`BlobStore`] is the contract the storage adapter talks to. The bundled
//! [`LocalBlobStore`] keeps objects on the local filesystem and issues
//! HMAC-signed, time-limited download URLs that the API verifies before
//! serving an object.

use std::{io::ErrorKind, path::PathBuf, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use crate::error::BlobError;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata persisted next to every object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobObject {
    pub bytes: Vec<u8>,
    pub metadata: BlobMetadata,
}

#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BlobError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<BlobObject>, BlobError>;

    /// Removes the object. Returns `false` when nothing was stored at the key.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, BlobError>;

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, BlobError>;

    /// Issues a URL granting read access to the object until `ttl` elapses.
    fn presign_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String, BlobError>;
}

/// HMAC-SHA256 signer for download URLs.
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(key: Vec<u8>) -> Result<Self, BlobError> {
        if key.is_empty() {
            return Err(BlobError::EmptySigningKey);
        }
        let mac = HmacSha256::new_from_slice(&key).map_err(|_| BlobError::EmptySigningKey)?;
        Ok(Self { mac })
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{bucket}/{key}:{expires}").as_bytes());
        mac
    }

    pub fn sign(&self, bucket: &str, key: &str, expires: i64) -> String {
        let digest = self.mac(bucket, key, expires).finalize().into_bytes();
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Checks the signature and that `expires` lies after `now`.
    pub fn verify(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if expires <= now.timestamp() {
            return false;
        }
        let Ok(decoded) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        self.mac(bucket, key, expires).verify_slice(&decoded).is_ok()
    }
}

/// Filesystem-backed [`BlobStore`].
///
/// Layout under `root`: `objects/<bucket>/<key>` for the payload and
/// `metadata/<bucket>/<key>.json` for [`BlobMetadata`].
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_url: String,
    signer: UrlSigner,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>, signer: UrlSigner) -> Self {
        let public_url = public_url.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            public_url,
            signer,
        }
    }

    /// Validates a signed download request produced by [`BlobStore::presign_url`].
    pub fn verify_signed(&self, bucket: &str, key: &str, expires: i64, signature: &str) -> bool {
        self.signer
            .verify(bucket, key, expires, signature, Utc::now())
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, BlobError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        Ok(self.root.join("objects").join(bucket).join(key))
    }

    fn metadata_path(&self, bucket: &str, key: &str) -> Result<PathBuf, BlobError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        Ok(self
            .root
            .join("metadata")
            .join(bucket)
            .join(format!("{key}.json")))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BlobError> {
        let object_path = self.object_path(bucket, key)?;
        let metadata_path = self.metadata_path(bucket, key)?;
        let io_err = |source| BlobError::Io {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        };

        let metadata = BlobMetadata {
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            sha256: hex_digest(bytes),
            created_at: Utc::now(),
        };
        let encoded = serde_json::to_vec(&metadata).map_err(|source| BlobError::Metadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })?;

        for path in [&object_path, &metadata_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        fs::write(&object_path, bytes).await.map_err(io_err)?;
        fs::write(&metadata_path, encoded).await.map_err(io_err)?;

        debug!(bucket, key, size = metadata.size, "blob stored");
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<BlobObject>, BlobError> {
        let object_path = self.object_path(bucket, key)?;
        let metadata_path = self.metadata_path(bucket, key)?;
        let io_err = |source| BlobError::Io {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        };

        let bytes = match fs::read(&object_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(err)),
        };

        let metadata = match fs::read(&metadata_path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| BlobError::Metadata {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => BlobMetadata {
                content_type: DEFAULT_CONTENT_TYPE.to_string(),
                size: bytes.len() as u64,
                sha256: hex_digest(&bytes),
                created_at: Utc::now(),
            },
            Err(err) => return Err(io_err(err)),
        };

        Ok(Some(BlobObject { bytes, metadata }))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, BlobError> {
        let object_path = self.object_path(bucket, key)?;
        let metadata_path = self.metadata_path(bucket, key)?;
        let io_err = |source| BlobError::Io {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        };

        let existed = match fs::remove_file(&object_path).await {
            Ok(()) => true,
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => return Err(io_err(err)),
        };
        match fs::remove_file(&metadata_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(err)),
        }

        Ok(existed)
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, BlobError> {
        let object_path = self.object_path(bucket, key)?;
        fs::try_exists(&object_path)
            .await
            .map_err(|source| BlobError::Io {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })
    }

    fn presign_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String, BlobError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let expires = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| Utc::now().timestamp().checked_add(secs))
            .ok_or(BlobError::TtlOutOfRange(ttl))?;
        let signature = self.signer.sign(bucket, key, expires);
        Ok(format!(
            "{}/api/files/{bucket}/{key}?expires={expires}&signature={signature}",
            self.public_url
        ))
    }
}

fn validate_bucket(bucket: &str) -> Result<(), BlobError> {
    let valid = !bucket.is_empty()
        && bucket != "."
        && bucket != ".."
        && bucket
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(BlobError::InvalidBucket(bucket.to_string()))
    }
}

/// Keys are relative slash-separated paths without empty, `.` or `..` segments.
fn validate_key(key: &str) -> Result<(), BlobError> {
    let bad_segment = key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if key.is_empty() || key.contains('\\') || bad_segment {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
