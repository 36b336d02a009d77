//! In-process storage network for testing.
//!
//! Holds satellites, API keys, projects, buckets and objects behind a mutex.
//! Faults can be injected to exercise failure paths, and counters expose how
//! often the "network" was contacted and how many handles are still held.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use super::{
    CustomMetadata, Download, ListOptions, Network, ObjectInfo, ObjectStream, Project, Result,
    StorageError, Upload,
};

/// One-shot failures consumed by the next matching operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `Project::ensure_bucket` fails
    EnsureBucket,
    /// `Upload::write` fails
    Write,
    /// `Upload::set_custom_metadata` fails
    SetMetadata,
    /// `Upload::commit` fails
    Commit,
    /// `Upload::abort` fails
    Abort,
    /// Listing fails after yielding this many objects
    List { after: usize },
    /// The download body never arrives
    StallDownload,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    custom: CustomMetadata,
}

#[derive(Debug, Default)]
struct ProjectState {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
}

#[derive(Debug, Default)]
struct NetworkState {
    /// Satellite address -> accepted API keys
    satellites: HashMap<String, HashSet<String>>,
    /// Projects by API key
    projects: HashMap<String, ProjectState>,
    faults: Vec<Fault>,
    requests: usize,
    open_projects: usize,
    active_transfers: usize,
}

impl NetworkState {
    fn take_fault(&mut self, matches: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let index = self.faults.iter().position(matches)?;
        Some(self.faults.remove(index))
    }

    fn authorize(&self, satellite: &str, api_key: &str) -> Result<()> {
        let keys = self
            .satellites
            .get(satellite)
            .ok_or_else(|| StorageError::backend(format!("unknown satellite {}", satellite)))?;
        if keys.contains(api_key) {
            Ok(())
        } else {
            Err(StorageError::PermissionDenied("API key not accepted".to_string()))
        }
    }

    fn bucket_mut(
        &mut self,
        api_key: &str,
        bucket: &str,
    ) -> Result<&mut BTreeMap<String, StoredObject>> {
        self.projects
            .get_mut(api_key)
            .and_then(|project| project.buckets.get_mut(bucket))
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })
    }
}

type SharedState = Arc<Mutex<NetworkState>>;

fn lock(state: &Mutex<NetworkState>) -> MutexGuard<'_, NetworkState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn injected(what: &str) -> StorageError {
    StorageError::backend(format!("injected fault: {}", what))
}

/// In-memory storage network
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: SharedState,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `api_key` on `satellite`.
    pub fn register(&self, satellite: &str, api_key: &str) {
        let mut state = lock(&self.state);
        state
            .satellites
            .entry(satellite.to_string())
            .or_default()
            .insert(api_key.to_string());
        state.projects.entry(api_key.to_string()).or_default();
    }

    /// Queue a one-shot failure.
    pub fn inject(&self, fault: Fault) {
        lock(&self.state).faults.push(fault);
    }

    /// Store an object directly, bypassing the upload path.
    pub fn insert_object(
        &self,
        api_key: &str,
        bucket: &str,
        key: &str,
        data: &[u8],
        custom: CustomMetadata,
    ) {
        let mut state = lock(&self.state);
        state
            .projects
            .entry(api_key.to_string())
            .or_default()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data: data.to_vec(),
                    custom,
                },
            );
    }

    /// Keys currently stored in a bucket, in key order.
    pub fn keys(&self, api_key: &str, bucket: &str) -> Vec<String> {
        let state = lock(&self.state);
        state
            .projects
            .get(api_key)
            .and_then(|project| project.buckets.get(bucket))
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a bucket exists in the project of `api_key`.
    pub fn has_bucket(&self, api_key: &str, bucket: &str) -> bool {
        let state = lock(&self.state);
        state
            .projects
            .get(api_key)
            .is_some_and(|project| project.buckets.contains_key(bucket))
    }

    /// Number of calls that would have gone over the wire.
    pub fn requests(&self) -> usize {
        lock(&self.state).requests
    }

    /// Projects opened and not yet closed.
    pub fn open_projects(&self) -> usize {
        lock(&self.state).open_projects
    }

    /// Download and upload handles not yet released.
    pub fn active_transfers(&self) -> usize {
        lock(&self.state).active_transfers
    }

    fn contact(&self) -> MutexGuard<'_, NetworkState> {
        let mut state = lock(&self.state);
        state.requests += 1;
        state
    }
}

/// Access credential of the memory network.
#[derive(Clone, PartialEq, Eq)]
pub struct MemoryAccess {
    satellite: String,
    api_key: String,
    passphrase: String,
}

impl MemoryAccess {
    pub fn satellite(&self) -> &str {
        &self.satellite
    }

    /// Serialized grant accepted by `Network::parse_access`.
    pub fn serialize(&self) -> String {
        [&self.satellite, &self.api_key, &self.passphrase]
            .iter()
            .map(hex::encode)
            .collect::<Vec<_>>()
            .join(".")
    }

    fn parse(serialized: &str) -> Result<Self> {
        let parts = serialized
            .split('.')
            .map(|part| {
                hex::decode(part)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| StorageError::InvalidAccess("malformed access grant".to_string()))?;

        match <[String; 3]>::try_from(parts) {
            Ok([satellite, api_key, passphrase]) if !satellite.is_empty() => Ok(Self {
                satellite,
                api_key,
                passphrase,
            }),
            _ => Err(StorageError::InvalidAccess(
                "access grant has the wrong number of fields".to_string(),
            )),
        }
    }
}

impl fmt::Debug for MemoryAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAccess")
            .field("satellite", &self.satellite)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    type Access = MemoryAccess;
    type Project = MemoryProject;

    async fn request_access_with_passphrase(
        &self,
        satellite: &str,
        api_key: &str,
        passphrase: &str,
    ) -> Result<MemoryAccess> {
        let state = self.contact();
        state.authorize(satellite, api_key)?;
        if passphrase.is_empty() {
            return Err(StorageError::InvalidAccess(
                "passphrase must not be empty".to_string(),
            ));
        }

        Ok(MemoryAccess {
            satellite: satellite.to_string(),
            api_key: api_key.to_string(),
            passphrase: passphrase.to_string(),
        })
    }

    fn parse_access(&self, serialized: &str) -> Result<MemoryAccess> {
        MemoryAccess::parse(serialized)
    }

    async fn open_project(&self, access: &MemoryAccess) -> Result<MemoryProject> {
        let mut state = self.contact();
        state.authorize(&access.satellite, &access.api_key)?;
        state.open_projects += 1;

        Ok(MemoryProject {
            state: Arc::clone(&self.state),
            api_key: access.api_key.clone(),
        })
    }
}

/// Project handle of the memory network.
pub struct MemoryProject {
    state: SharedState,
    api_key: String,
}

impl MemoryProject {
    fn contact(&self) -> MutexGuard<'_, NetworkState> {
        let mut state = lock(&self.state);
        state.requests += 1;
        state
    }

    fn begin_transfer(&self, state: &mut NetworkState) -> TransferGuard {
        state.active_transfers += 1;
        TransferGuard {
            state: Arc::clone(&self.state),
        }
    }
}

/// Decrements the active transfer count when the handle is dropped.
struct TransferGuard {
    state: SharedState,
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        lock(&self.state).active_transfers -= 1;
    }
}

#[async_trait]
impl Project for MemoryProject {
    type Download = MemoryDownload;
    type Upload = MemoryUpload;

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.contact();
        if state.take_fault(|f| *f == Fault::EnsureBucket).is_some() {
            return Err(injected("ensure bucket"));
        }

        state
            .projects
            .entry(self.api_key.clone())
            .or_default()
            .buckets
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn download_object(&self, bucket: &str, key: &str) -> Result<MemoryDownload> {
        let mut state = self.contact();
        let object = state
            .bucket_mut(&self.api_key, bucket)?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })?;
        let stall = state.take_fault(|f| *f == Fault::StallDownload).is_some();
        let transfer = self.begin_transfer(&mut state);

        Ok(MemoryDownload {
            info: ObjectInfo {
                key: key.to_string(),
                custom: object.custom,
                content_length: Some(object.data.len() as u64),
            },
            data: object.data,
            stall,
            _transfer: transfer,
        })
    }

    async fn upload_object(&self, bucket: &str, key: &str) -> Result<MemoryUpload> {
        let mut state = self.contact();
        state.bucket_mut(&self.api_key, bucket)?;
        let transfer = self.begin_transfer(&mut state);

        Ok(MemoryUpload {
            state: Arc::clone(&self.state),
            api_key: self.api_key.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            body: Vec::new(),
            custom: CustomMetadata::new(),
            _transfer: transfer,
        })
    }

    fn list_objects<'a>(&'a self, bucket: &'a str, options: ListOptions) -> ObjectStream<'a> {
        let mut state = self.contact();
        let fail_after = match state.take_fault(|f| matches!(f, Fault::List { .. })) {
            Some(Fault::List { after }) => Some(after),
            _ => None,
        };

        let objects = match state.bucket_mut(&self.api_key, bucket) {
            Ok(objects) => objects,
            Err(e) => return stream::iter(vec![Err(e)]).boxed(),
        };

        let mut items: Vec<Result<ObjectInfo>> = Vec::new();
        let mut prefixes = BTreeSet::new();
        for (key, object) in objects.range(options.prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&options.prefix) else {
                break;
            };

            if !options.recursive {
                if let Some(pos) = rest.find('/') {
                    let collapsed = format!("{}{}", options.prefix, &rest[..=pos]);
                    if prefixes.insert(collapsed.clone()) {
                        items.push(Ok(ObjectInfo::new(collapsed)));
                    }
                    continue;
                }
            }

            let custom = if options.custom {
                object.custom.clone()
            } else {
                CustomMetadata::new()
            };
            items.push(Ok(ObjectInfo {
                key: key.clone(),
                custom,
                content_length: Some(object.data.len() as u64),
            }));
        }

        if let Some(after) = fail_after {
            items.truncate(after);
            items.push(Err(injected("list")));
        }

        stream::iter(items).boxed()
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>> {
        let mut state = self.contact();
        let removed = state.bucket_mut(&self.api_key, bucket)?.remove(key);

        Ok(removed.map(|object| ObjectInfo {
            key: key.to_string(),
            content_length: Some(object.data.len() as u64),
            custom: object.custom,
        }))
    }

    async fn close(self) -> Result<()> {
        lock(&self.state).open_projects -= 1;
        Ok(())
    }
}

/// Download handle of the memory network.
pub struct MemoryDownload {
    info: ObjectInfo,
    data: Vec<u8>,
    stall: bool,
    _transfer: TransferGuard,
}

#[async_trait]
impl Download for MemoryDownload {
    fn info(&self) -> &ObjectInfo {
        &self.info
    }

    async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        Ok(std::mem::take(&mut self.data))
    }
}

/// Upload handle of the memory network.
pub struct MemoryUpload {
    state: SharedState,
    api_key: String,
    bucket: String,
    key: String,
    body: Vec<u8>,
    custom: CustomMetadata,
    _transfer: TransferGuard,
}

#[async_trait]
impl Upload for MemoryUpload {
    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        if lock(&self.state).take_fault(|f| *f == Fault::Write).is_some() {
            return Err(injected("write"));
        }
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    async fn set_custom_metadata(&mut self, custom: CustomMetadata) -> Result<()> {
        if lock(&self.state).take_fault(|f| *f == Fault::SetMetadata).is_some() {
            return Err(injected("set metadata"));
        }
        self.custom = custom;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let mut state = lock(&self.state);
        state.requests += 1;
        if state.take_fault(|f| *f == Fault::Commit).is_some() {
            return Err(injected("commit"));
        }

        state.bucket_mut(&self.api_key, &self.bucket)?.insert(
            self.key.clone(),
            StoredObject {
                data: self.body.clone(),
                custom: self.custom.clone(),
            },
        );
        Ok(())
    }

    async fn abort(self) -> Result<()> {
        let mut state = lock(&self.state);
        state.requests += 1;
        if state.take_fault(|f| *f == Fault::Abort).is_some() {
            return Err(injected("abort"));
        }
        Ok(())
    }
}
