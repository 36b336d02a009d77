//! Storage client trait abstractions.
//!
//! The object-storage network is an external collaborator. These traits are the
//! seam the note service is written against.
//!
//! Implementations:
//! - `MemoryNetwork` - In-process network for testing
//! - `GatewayNetwork` (in notes-gateway) - S3-compatible gateway over HTTPS

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors reported by the storage client.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    #[error("invalid access: {0}")]
    InvalidAccess(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("transfer already finalized")]
    AlreadyFinalized,

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// User-attached key/value annotations stored alongside an object.
pub type CustomMetadata = BTreeMap<String, String>;

/// What the storage client reports about a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key within the bucket
    pub key: String,
    /// Custom metadata (empty unless requested when listing)
    pub custom: CustomMetadata,
    /// Body size in bytes, when the backend reports it
    pub content_length: Option<u64>,
}

impl ObjectInfo {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_custom(mut self, custom: CustomMetadata) -> Self {
        self.custom = custom;
        self
    }
}

/// Options for enumerating objects.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only keys starting with this prefix are returned
    pub prefix: String,
    /// Descend below `/` separators instead of collapsing them into prefixes
    pub recursive: bool,
    /// Fetch custom metadata for every object
    pub custom: bool,
}

/// Lazy, finite sequence of listed objects.
pub type ObjectStream<'a> = BoxStream<'a, Result<ObjectInfo>>;

/// Entry point of the storage client: resolves access and opens projects.
#[async_trait]
pub trait Network: Send + Sync {
    /// Opaque credential usable to open a project.
    type Access: Send + Sync;
    /// Project handle opened from an access credential.
    type Project: Project;

    /// Mint an access credential from a satellite address, API key and passphrase.
    ///
    /// May contact the network.
    async fn request_access_with_passphrase(
        &self,
        satellite: &str,
        api_key: &str,
        passphrase: &str,
    ) -> Result<Self::Access>;

    /// Parse a serialized access grant. Local only.
    fn parse_access(&self, serialized: &str) -> Result<Self::Access>;

    /// Open a project for the given access credential.
    async fn open_project(&self, access: &Self::Access) -> Result<Self::Project>;
}

/// An open storage project. Released by `close`.
#[async_trait]
pub trait Project: Send + Sync {
    type Download: Download;
    type Upload: Upload;

    /// Create the bucket if it does not exist yet. Idempotent.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    /// Start downloading an object. Fails with `NotFound` for missing keys.
    async fn download_object(&self, bucket: &str, key: &str) -> Result<Self::Download>;

    /// Start uploading an object. Nothing is visible until `Upload::commit`.
    async fn upload_object(&self, bucket: &str, key: &str) -> Result<Self::Upload>;

    /// Enumerate objects in a bucket.
    fn list_objects<'a>(&'a self, bucket: &'a str, options: ListOptions) -> ObjectStream<'a>;

    /// Delete an object, returning what was deleted when the backend reports it.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>>;

    /// Release the project.
    async fn close(self) -> Result<()>;
}

/// An in-flight download. Dropping it releases the transfer.
#[async_trait]
pub trait Download: Send {
    /// Object information, including custom metadata.
    fn info(&self) -> &ObjectInfo;

    /// Read the whole remaining body into memory.
    async fn read_to_end(&mut self) -> Result<Vec<u8>>;
}

/// An in-flight upload, finalized exactly once by `commit` or `abort`.
#[async_trait]
pub trait Upload: Send {
    /// Append data to the object body.
    async fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Replace the custom metadata that will be stored with the object.
    async fn set_custom_metadata(&mut self, custom: CustomMetadata) -> Result<()>;

    /// Make the object visible.
    async fn commit(self) -> Result<()>;

    /// Discard the upload so the backend keeps nothing of it.
    async fn abort(self) -> Result<()>;
}
