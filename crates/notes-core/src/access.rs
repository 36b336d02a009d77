//! Access resolution: passphrase triple or serialized grant into a credential.

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancel::cancellable;
use crate::storage::{Network, StorageError};

/// The two ways of describing access to a project.
#[derive(Clone, PartialEq, Eq)]
pub enum AccessRequest {
    /// Mint a credential from a satellite, API key and encryption passphrase
    Passphrase {
        satellite: String,
        api_key: String,
        passphrase: String,
    },
    /// An already serialized access grant
    Serialized(String),
}

impl AccessRequest {
    /// Pick the fully populated form, preferring the passphrase triple.
    ///
    /// Empty strings count as missing. Returns `None` when neither form is complete.
    pub fn from_parts(
        satellite: Option<&str>,
        api_key: Option<&str>,
        passphrase: Option<&str>,
        access: Option<&str>,
    ) -> Option<Self> {
        let present = |value: Option<&str>| value.filter(|v| !v.is_empty()).map(str::to_string);

        if let (Some(satellite), Some(api_key), Some(passphrase)) =
            (present(satellite), present(api_key), present(passphrase))
        {
            return Some(AccessRequest::Passphrase {
                satellite,
                api_key,
                passphrase,
            });
        }

        present(access).map(AccessRequest::Serialized)
    }

    /// Turn the request into a credential of `network`.
    ///
    /// The passphrase form may contact the network; the serialized form is
    /// parsed locally. Both give up as soon as `cancel` fires.
    pub async fn resolve<N: Network>(
        &self,
        network: &N,
        cancel: &CancellationToken,
    ) -> Result<N::Access, StorageError> {
        match self {
            AccessRequest::Passphrase {
                satellite,
                api_key,
                passphrase,
            } => {
                debug!(satellite = %satellite, "requesting access with passphrase");
                cancellable(
                    cancel,
                    network.request_access_with_passphrase(satellite, api_key, passphrase),
                )
                .await
            }
            AccessRequest::Serialized(grant) => {
                if cancel.is_cancelled() {
                    return Err(StorageError::Cancelled);
                }
                debug!("parsing serialized access grant");
                network.parse_access(grant)
            }
        }
    }
}

impl fmt::Debug for AccessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessRequest::Passphrase { satellite, .. } => f
                .debug_struct("Passphrase")
                .field("satellite", satellite)
                .finish_non_exhaustive(),
            AccessRequest::Serialized(_) => f.write_str("Serialized(..)"),
        }
    }
}
