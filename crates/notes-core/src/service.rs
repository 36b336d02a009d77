//! Note service: get/set/list/delete over one storage project and bucket.

use std::fmt;

use chrono::Utc;
use futures::TryStreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cancel::cancellable;
use crate::note::{Note, NoteMeta, UPLOAD_TIME_KEY, parse_note, parse_note_meta, upload_timestamp};
use crate::storage::{
    CustomMetadata, Download, ListOptions, Network, Project, StorageError, Upload,
};

/// What happened to an upload that was aborted after a failure.
#[derive(Debug)]
pub enum AbortOutcome {
    /// The backend discarded the upload
    Aborted,
    /// The abort itself failed as well
    Failed(StorageError),
}

impl AbortOutcome {
    fn from_result(result: Result<(), StorageError>) -> Self {
        match result {
            Ok(()) => AbortOutcome::Aborted,
            Err(e) => AbortOutcome::Failed(e),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, AbortOutcome::Aborted)
    }
}

impl fmt::Display for AbortOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortOutcome::Aborted => Ok(()),
            AbortOutcome::Failed(e) => write!(f, " (abort also failed: {})", e),
        }
    }
}

/// Errors of the note service, each carrying the failing operation's context.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to open project: {0}")]
    OpenProject(#[source] StorageError),

    #[error("failed to ensure bucket {bucket:?}: {source}")]
    EnsureBucket {
        bucket: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to start download {identifier:?}: {source}")]
    StartDownload {
        identifier: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to download {identifier:?}: {source}")]
    Download {
        identifier: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to start upload {identifier:?}: {source}")]
    StartUpload {
        identifier: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to upload {identifier:?}: {source}{abort}")]
    Upload {
        identifier: String,
        #[source]
        source: StorageError,
        abort: AbortOutcome,
    },

    #[error("failed to set metadata {identifier:?}: {source}{abort}")]
    SetMetadata {
        identifier: String,
        #[source]
        source: StorageError,
        abort: AbortOutcome,
    },

    #[error("failed to commit {identifier:?}: {source}")]
    Commit {
        identifier: String,
        #[source]
        source: StorageError,
    },

    #[error("iteration failed (prefix={prefix:?}): {source}")]
    List {
        prefix: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to delete {identifier:?}: {source}")]
    Delete {
        identifier: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to close project: {0}")]
    Close(#[source] StorageError),
}

impl ServiceError {
    /// The storage client error underneath.
    pub fn storage_error(&self) -> &StorageError {
        match self {
            ServiceError::OpenProject(source) | ServiceError::Close(source) => source,
            ServiceError::EnsureBucket { source, .. }
            | ServiceError::StartDownload { source, .. }
            | ServiceError::Download { source, .. }
            | ServiceError::StartUpload { source, .. }
            | ServiceError::Upload { source, .. }
            | ServiceError::SetMetadata { source, .. }
            | ServiceError::Commit { source, .. }
            | ServiceError::List { source, .. }
            | ServiceError::Delete { source, .. } => source,
        }
    }

    /// How the upload was cleaned up, for failures that trigger an abort.
    pub fn abort_outcome(&self) -> Option<&AbortOutcome> {
        match self {
            ServiceError::Upload { abort, .. } | ServiceError::SetMetadata { abort, .. } => {
                Some(abort)
            }
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.storage_error().is_not_found()
    }

    pub fn is_cancelled(&self) -> bool {
        self.storage_error().is_cancelled()
    }
}

/// Accesses notes kept in one bucket of a storage project.
///
/// Owns the project handle exclusively. `close` consumes the service, so no
/// operation can run after the project is released.
pub struct Service<P: Project> {
    project: P,
    bucket: String,
}

impl<P: Project> Service<P> {
    /// Open the project and make sure the notes bucket exists.
    ///
    /// Either both steps succeed or nothing stays open.
    pub async fn open<N>(
        cancel: &CancellationToken,
        network: &N,
        access: &N::Access,
        bucket: impl Into<String>,
    ) -> Result<Self, ServiceError>
    where
        N: Network<Project = P>,
    {
        let bucket = bucket.into();

        let project = cancellable(cancel, network.open_project(access))
            .await
            .map_err(ServiceError::OpenProject)?;

        if let Err(source) = cancellable(cancel, project.ensure_bucket(&bucket)).await {
            if let Err(e) = project.close().await {
                warn!("failed to close project after bucket error: {}", e);
            }
            return Err(ServiceError::EnsureBucket { bucket, source });
        }

        debug!(bucket = %bucket, "notes service opened");
        Ok(Self { project, bucket })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Load a note.
    ///
    /// Notes are small, so the whole body is read into memory.
    pub async fn get(&self, cancel: &CancellationToken, identifier: &str) -> Result<Note, ServiceError> {
        let mut download = cancellable(cancel, self.project.download_object(&self.bucket, identifier))
            .await
            .map_err(|source| ServiceError::StartDownload {
                identifier: identifier.to_string(),
                source,
            })?;

        let data = cancellable(cancel, download.read_to_end())
            .await
            .map_err(|source| ServiceError::Download {
                identifier: identifier.to_string(),
                source,
            })?;

        debug!(identifier, bytes = data.len(), "downloaded note");
        Ok(parse_note(download.info(), &data))
    }

    /// Store a note, stamping it with the current upload time.
    ///
    /// A failed write or metadata update aborts the upload; the abort outcome
    /// is reported alongside the original error.
    pub async fn set(
        &self,
        cancel: &CancellationToken,
        identifier: &str,
        value: &str,
    ) -> Result<(), ServiceError> {
        let mut upload = cancellable(cancel, self.project.upload_object(&self.bucket, identifier))
            .await
            .map_err(|source| ServiceError::StartUpload {
                identifier: identifier.to_string(),
                source,
            })?;

        if let Err(source) = cancellable(cancel, upload.write(value.as_bytes())).await {
            let abort = AbortOutcome::from_result(upload.abort().await);
            return Err(ServiceError::Upload {
                identifier: identifier.to_string(),
                source,
                abort,
            });
        }

        let mut custom = CustomMetadata::new();
        custom.insert(UPLOAD_TIME_KEY.to_string(), upload_timestamp(Utc::now()));
        if let Err(source) = cancellable(cancel, upload.set_custom_metadata(custom)).await {
            let abort = AbortOutcome::from_result(upload.abort().await);
            return Err(ServiceError::SetMetadata {
                identifier: identifier.to_string(),
                source,
                abort,
            });
        }

        cancellable(cancel, upload.commit())
            .await
            .map_err(|source| ServiceError::Commit {
                identifier: identifier.to_string(),
                source,
            })?;

        debug!(identifier, bytes = value.len(), "uploaded note");
        Ok(())
    }

    /// List all notes whose identifier starts with `prefix`.
    ///
    /// Order is whatever the backend returns. A failure part way through
    /// discards everything gathered so far.
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        prefix: &str,
    ) -> Result<Vec<NoteMeta>, ServiceError> {
        let options = ListOptions {
            prefix: prefix.to_string(),
            recursive: true,
            custom: true,
        };
        let mut objects = self.project.list_objects(&self.bucket, options);

        let mut notes = Vec::new();
        loop {
            let next = cancellable(cancel, objects.try_next())
                .await
                .map_err(|source| ServiceError::List {
                    prefix: prefix.to_string(),
                    source,
                })?;
            match next {
                Some(info) => notes.push(parse_note_meta(&info)),
                None => break,
            }
        }

        debug!(prefix, count = notes.len(), "listed notes");
        Ok(notes)
    }

    /// Delete a note.
    pub async fn delete(&self, cancel: &CancellationToken, identifier: &str) -> Result<(), ServiceError> {
        let deleted = cancellable(cancel, self.project.delete_object(&self.bucket, identifier))
            .await
            .map_err(|source| ServiceError::Delete {
                identifier: identifier.to_string(),
                source,
            })?;

        debug!(identifier, reported = deleted.is_some(), "deleted note");
        Ok(())
    }

    /// Release the project handle.
    pub async fn close(self) -> Result<(), ServiceError> {
        self.project.close().await.map_err(ServiceError::Close)
    }
}
