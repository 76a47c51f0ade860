use thiserror::Error;

/// Failures raised by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("failed to apply document store migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("document {collection}/{id} could not be decoded: {source}")]
    Decode {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record could not be encoded for {collection}: {source}")]
    Encode {
        collection: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record for {0} did not serialize to a JSON object")]
    NotAnObject(String),
    #[error("invalid field name '{0}'")]
    InvalidField(String),
}

/// Failures raised by a blob store backend.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob store i/o failed for {bucket}/{key}: {source}")]
    Io {
        bucket: String,
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid object key '{0}'")]
    InvalidKey(String),
    #[error("invalid bucket name '{0}'")]
    InvalidBucket(String),
    #[error("blob metadata for {bucket}/{key} is corrupt: {source}")]
    Metadata {
        bucket: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("signing key must not be empty")]
    EmptySigningKey,
    #[error("signed URL lifetime of {0:?} is out of range")]
    TtlOutOfRange(std::time::Duration),
}

/// Failures raised by the storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("malformed blob locator '{0}'")]
    MalformedLocator(String),
    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// Boundary validation failures. Raised before any store interaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },
}
