//! DevHub persistence layer: record schemas, the document store holding the
//! portfolio, snippet and learning-note collections, and blob storage for
//! uploaded snippet files.
//!
//! Store handles are constructed once and passed explicitly into each
//! repository and the storage adapter; nothing in this crate is global.

pub mod blob;
pub mod document;
pub mod error;
pub mod records;
pub mod repository;
pub mod storage;

pub use blob::{BlobMetadata, BlobObject, BlobStore, LocalBlobStore, UrlSigner};
pub use document::{Database, Direction, Document, DocumentStore, Filter, Query};
pub use error::{BlobError, StorageError, StoreError, ValidationError};
pub use records::{CodeSnippet, LearningNote, PortfolioLink, Record};
pub use repository::{NoteRepository, PortfolioRepository, Repository, SnippetRepository};
pub use storage::{BlobLocation, StorageAdapter, Upload, DEFAULT_BUCKET, LOCATOR_PREFIX};
