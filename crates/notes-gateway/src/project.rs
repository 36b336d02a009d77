//! Project, download and upload handles backed by an S3 client.

use std::collections::VecDeque;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use futures::StreamExt;
use futures::stream;
use notes_core::{
    CustomMetadata, Download, ListOptions, ObjectInfo, ObjectStream, Project, StorageError, Upload,
};
use tracing::debug;

use crate::metadata;

type Result<T> = std::result::Result<T, StorageError>;

pub(crate) fn sdk_error<E, R>(err: SdkError<E, R>) -> StorageError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StorageError::Backend(DisplayErrorContext(&err).to_string())
}

fn content_length(length: Option<i64>) -> Option<u64> {
    length.and_then(|l| u64::try_from(l).ok())
}

/// A storage project reached through the S3-compatible gateway.
pub struct GatewayProject {
    client: Client,
}

enum Listed {
    Object { key: String, size: Option<u64> },
    Prefix(String),
}

/// Paging state of one listing.
struct ListState {
    options: ListOptions,
    token: Option<String>,
    pending: VecDeque<Listed>,
    exhausted: bool,
}

impl GatewayProject {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    async fn head(&self, bucket: &str, key: String) -> Result<ObjectInfo> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    StorageError::NotFound { key: key.clone() }
                } else {
                    sdk_error(err)
                }
            })?;

        Ok(ObjectInfo {
            custom: metadata::decode(output.metadata()),
            content_length: content_length(output.content_length()),
            key,
        })
    }

    /// Yield the next listed object, fetching another page when the current one is used up.
    async fn next_listed(
        &self,
        bucket: &str,
        mut state: ListState,
    ) -> Result<Option<(ObjectInfo, ListState)>> {
        loop {
            if let Some(entry) = state.pending.pop_front() {
                let info = match entry {
                    Listed::Prefix(prefix) => ObjectInfo::new(prefix),
                    Listed::Object { key, .. } if state.options.custom => {
                        self.head(bucket, key).await?
                    }
                    Listed::Object { key, size } => ObjectInfo {
                        key,
                        content_length: size,
                        custom: CustomMetadata::new(),
                    },
                };
                return Ok(Some((info, state)));
            }

            if state.exhausted {
                return Ok(None);
            }

            let delimiter = (!state.options.recursive).then(|| "/".to_string());
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(&state.options.prefix)
                .set_delimiter(delimiter)
                .set_continuation_token(state.token.take())
                .send()
                .await
                .map_err(sdk_error)?;

            for object in page.contents() {
                if let Some(key) = object.key() {
                    state.pending.push_back(Listed::Object {
                        key: key.to_string(),
                        size: content_length(object.size()),
                    });
                }
            }
            for prefix in page.common_prefixes() {
                if let Some(prefix) = prefix.prefix() {
                    state.pending.push_back(Listed::Prefix(prefix.to_string()));
                }
            }

            state.token = page.next_continuation_token().map(str::to_string);
            state.exhausted = !page.is_truncated().unwrap_or(false) || state.token.is_none();
            debug!(
                bucket,
                entries = state.pending.len(),
                more = !state.exhausted,
                "fetched listing page"
            );
        }
    }
}

#[async_trait]
impl Project for GatewayProject {
    type Download = GatewayDownload;
    type Upload = GatewayUpload;

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                debug!(bucket, "created bucket");
                Ok(())
            }
            Err(err)
                if err.as_service_error().is_some_and(|e| {
                    e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
                }) =>
            {
                Ok(())
            }
            Err(err) => Err(sdk_error(err)),
        }
    }

    async fn download_object(&self, bucket: &str, key: &str) -> Result<GatewayDownload> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StorageError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    sdk_error(err)
                }
            })?;

        let info = ObjectInfo {
            key: key.to_string(),
            custom: metadata::decode(output.metadata()),
            content_length: content_length(output.content_length()),
        };
        Ok(GatewayDownload {
            info,
            body: Some(output.body),
        })
    }

    async fn upload_object(&self, bucket: &str, key: &str) -> Result<GatewayUpload> {
        Ok(GatewayUpload {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            body: Vec::new(),
            custom: CustomMetadata::new(),
        })
    }

    fn list_objects<'a>(&'a self, bucket: &'a str, options: ListOptions) -> ObjectStream<'a> {
        let state = ListState {
            options,
            token: None,
            pending: VecDeque::new(),
            exhausted: false,
        };
        stream::try_unfold(state, move |state| self.next_listed(bucket, state)).boxed()
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(None)
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

/// Download handle holding the response body until it is read.
pub struct GatewayDownload {
    info: ObjectInfo,
    body: Option<ByteStream>,
}

#[async_trait]
impl Download for GatewayDownload {
    fn info(&self) -> &ObjectInfo {
        &self.info
    }

    async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let Some(body) = self.body.take() else {
            return Ok(Vec::new());
        };
        let data = body
            .collect()
            .await
            .map_err(|e| StorageError::backend(format!("failed to read body: {}", e)))?;
        Ok(data.into_bytes().to_vec())
    }
}

/// Upload handle buffering the body; nothing reaches the gateway before `commit`.
pub struct GatewayUpload {
    client: Client,
    bucket: String,
    key: String,
    body: Vec<u8>,
    custom: CustomMetadata,
}

#[async_trait]
impl Upload for GatewayUpload {
    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    async fn set_custom_metadata(&mut self, custom: CustomMetadata) -> Result<()> {
        self.custom = custom;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let metadata = metadata::encode(&self.custom);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .set_metadata(Some(metadata))
            .body(ByteStream::from(self.body))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn abort(self) -> Result<()> {
        debug!(key = %self.key, bytes = self.body.len(), "discarding buffered upload");
        Ok(())
    }
}
