//! Access grant registration with the gateway's auth service.

use std::fmt;

use notes_core::StorageError;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct RegisterRequest<'a> {
    access_grant: &'a str,
    public: bool,
}

/// S3 credentials for the gateway.
#[derive(Clone, Deserialize)]
pub struct GatewayCredentials {
    pub access_key_id: String,
    pub secret_key: String,
    pub endpoint: String,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Exchange a serialized access grant for gateway credentials.
pub(crate) async fn register(
    http: &reqwest::Client,
    auth_service: &str,
    grant: &str,
) -> Result<GatewayCredentials, StorageError> {
    let url = format!("{}/v1/access", auth_service.trim_end_matches('/'));
    debug!(url = %url, "registering access grant");

    let response = http
        .post(&url)
        .json(&RegisterRequest {
            access_grant: grant,
            public: false,
        })
        .send()
        .await
        .map_err(|e| StorageError::backend(format!("auth service unreachable: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = format!("auth service returned {}: {}", status, body.trim());
        return Err(if status.is_client_error() {
            StorageError::InvalidAccess(message)
        } else {
            StorageError::backend(message)
        });
    }

    response
        .json::<GatewayCredentials>()
        .await
        .map_err(|e| StorageError::backend(format!("invalid auth service response: {}", e)))
}
