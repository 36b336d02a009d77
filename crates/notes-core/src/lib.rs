//! notes-core: short text notes kept as objects in an object-storage network.
//!
//! This crate provides:
//! - The note model (`Note`, `NoteMeta`) parsed from object metadata
//! - The `Service` wrapping get/set/list/delete over a storage project
//! - Access resolution from a passphrase triple or a serialized grant
//! - Storage client trait abstractions (`Network`, `Project`, `Download`, `Upload`)
//! - `MemoryNetwork`, an in-process storage network for tests

pub mod access;
pub mod cancel;
pub mod note;
pub mod service;
pub mod storage;

pub use access::AccessRequest;
pub use cancel::cancellable;
pub use note::{Note, NoteMeta, UPLOAD_TIME_KEY, parse_note, parse_note_meta};
pub use service::{AbortOutcome, Service, ServiceError};
pub use storage::memory::{Fault, MemoryAccess, MemoryNetwork};
pub use storage::{
    CustomMetadata, Download, ListOptions, Network, ObjectInfo, ObjectStream, Project,
    StorageError, Upload,
};
pub use tokio_util::sync::CancellationToken;
