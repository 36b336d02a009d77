//! notes-gateway: reaches the storage network through its S3-compatible gateway.
//!
//! Serialized access grants are exchanged for S3 credentials at the gateway's
//! auth service when a project is opened. The passphrase triple is taken as
//! gateway credentials directly: the satellite address is the gateway
//! endpoint, the API key the access key id and the passphrase the secret key.

mod auth;
pub mod metadata;
mod project;

use std::fmt;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use notes_core::{Network, StorageError};
use tracing::debug;

pub use auth::GatewayCredentials;
pub use project::{GatewayDownload, GatewayProject, GatewayUpload};

/// Auth service of the hosted gateway.
pub const DEFAULT_AUTH_SERVICE: &str = "https://auth.storjshare.io";

/// The gateway ignores the region, but request signing needs one.
const REGION: &str = "us-1";

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Credential of the gateway network.
#[derive(Clone)]
pub enum GatewayAccess {
    /// Serialized access grant, registered with the auth service on open
    Grant(String),
    /// Credentials usable against the gateway as they are
    Credentials(GatewayCredentials),
}

impl fmt::Debug for GatewayAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayAccess::Grant(_) => f.write_str("Grant(..)"),
            GatewayAccess::Credentials(credentials) => {
                f.debug_tuple("Credentials").field(credentials).finish()
            }
        }
    }
}

/// Storage network reached through an S3-compatible gateway.
pub struct GatewayNetwork {
    auth_service: String,
    http: reqwest::Client,
}

impl GatewayNetwork {
    pub fn new(auth_service: impl Into<String>) -> Self {
        Self {
            auth_service: auth_service.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn auth_service(&self) -> &str {
        &self.auth_service
    }

    /// Exchange a serialized access grant for gateway credentials.
    pub async fn register(&self, grant: &str) -> Result<GatewayCredentials, StorageError> {
        auth::register(&self.http, &self.auth_service, grant).await
    }
}

impl Default for GatewayNetwork {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_SERVICE)
    }
}

/// Prefix bare host names with `https://`.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

fn s3_client(credentials: &GatewayCredentials) -> Client {
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(REGION))
        .endpoint_url(normalize_endpoint(&credentials.endpoint))
        .credentials_provider(Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_key,
            None,
            None,
            "notes-gateway",
        ))
        .force_path_style(true)
        .build();
    Client::from_conf(config)
}

#[async_trait]
impl Network for GatewayNetwork {
    type Access = GatewayAccess;
    type Project = GatewayProject;

    async fn request_access_with_passphrase(
        &self,
        satellite: &str,
        api_key: &str,
        passphrase: &str,
    ) -> Result<GatewayAccess, StorageError> {
        let credentials = GatewayCredentials {
            access_key_id: api_key.to_string(),
            secret_key: passphrase.to_string(),
            endpoint: normalize_endpoint(satellite),
        };

        debug!(endpoint = %credentials.endpoint, "verifying gateway credentials");
        s3_client(&credentials)
            .list_buckets()
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some() {
                    StorageError::PermissionDenied(
                        aws_sdk_s3::error::DisplayErrorContext(&err).to_string(),
                    )
                } else {
                    project::sdk_error(err)
                }
            })?;

        Ok(GatewayAccess::Credentials(credentials))
    }

    fn parse_access(&self, serialized: &str) -> Result<GatewayAccess, StorageError> {
        let grant = serialized.trim();
        if grant.is_empty() {
            return Err(StorageError::InvalidAccess("access grant is empty".to_string()));
        }
        if let Some(c) = grant.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
            return Err(StorageError::InvalidAccess(format!(
                "access grant contains {:?}, which is not base58",
                c
            )));
        }
        Ok(GatewayAccess::Grant(grant.to_string()))
    }

    async fn open_project(&self, access: &GatewayAccess) -> Result<GatewayProject, StorageError> {
        let credentials = match access {
            GatewayAccess::Grant(grant) => self.register(grant).await?,
            GatewayAccess::Credentials(credentials) => credentials.clone(),
        };

        debug!(endpoint = %credentials.endpoint, "opening gateway project");
        Ok(GatewayProject::new(s3_client(&credentials)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("gateway.storjshare.io"),
            "https://gateway.storjshare.io"
        );
        assert_eq!(
            normalize_endpoint("http://127.0.0.1:7777/"),
            "http://127.0.0.1:7777"
        );
    }

    #[test]
    fn test_parse_access_accepts_base58() {
        let network = GatewayNetwork::default();
        let access = network.parse_access(" 1DumbGrant9xyz \n").unwrap();
        assert!(matches!(access, GatewayAccess::Grant(ref g) if g == "1DumbGrant9xyz"));
    }

    #[test]
    fn test_parse_access_rejects_non_base58() {
        let network = GatewayNetwork::default();
        for grant in ["", "   ", "has space", "0OIl", "grant/with+base64="] {
            assert!(
                matches!(network.parse_access(grant), Err(StorageError::InvalidAccess(_))),
                "grant {:?} should be rejected",
                grant
            );
        }
    }

    #[test]
    fn test_debug_hides_secrets() {
        let access = GatewayAccess::Credentials(GatewayCredentials {
            access_key_id: "AKID".to_string(),
            secret_key: "very-secret".to_string(),
            endpoint: "https://gateway.example".to_string(),
        });
        let debug = format!("{:?}", access);
        assert!(debug.contains("AKID"));
        assert!(!debug.contains("very-secret"));
        assert!(!format!("{:?}", GatewayAccess::Grant("1Grant".to_string())).contains("1Grant"));
    }
}
