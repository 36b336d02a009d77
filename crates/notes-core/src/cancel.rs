//! Cooperative cancellation for network-facing calls.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::storage::StorageError;

/// Run a storage call until it finishes or `cancel` fires.
///
/// On cancellation the call's future is dropped, releasing whatever handles it
/// held, and `StorageError::Cancelled` is returned.
pub async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = call => result,
    }
}
