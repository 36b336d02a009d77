//! Service tests against the in-memory storage network.
//!
//! Covers the note round trip, listing, deletion, the upload abort paths and
//! cancellation of stalled transfers.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use notes_core::{
    AbortOutcome, AccessRequest, CancellationToken, CustomMetadata, Fault, MemoryNetwork,
    MemoryAccess, Network, Service, ServiceError, StorageError, UPLOAD_TIME_KEY,
    storage::memory::MemoryProject,
};

const SATELLITE: &str = "sat.example:7777";
const API_KEY: &str = "key-1";
const BUCKET: &str = "notes";

struct Fixture {
    network: MemoryNetwork,
    access: MemoryAccess,
    cancel: CancellationToken,
}

impl Fixture {
    async fn new() -> Self {
        let network = MemoryNetwork::new();
        network.register(SATELLITE, API_KEY);
        let cancel = CancellationToken::new();
        let access = AccessRequest::Passphrase {
            satellite: SATELLITE.to_string(),
            api_key: API_KEY.to_string(),
            passphrase: "correct horse".to_string(),
        }
        .resolve(&network, &cancel)
        .await
        .expect("access should resolve");

        Self {
            network,
            access,
            cancel,
        }
    }

    async fn open(&self) -> Service<MemoryProject> {
        Service::open(&self.cancel, &self.network, &self.access, BUCKET)
            .await
            .expect("service should open")
    }
}

#[tokio::test]
async fn test_open_creates_bucket_idempotently() {
    let fx = Fixture::new().await;
    assert!(!fx.network.has_bucket(API_KEY, BUCKET));

    let first = fx.open().await;
    assert!(fx.network.has_bucket(API_KEY, BUCKET));
    first.set(&fx.cancel, "todo", "buy milk").await.unwrap();

    let second = fx.open().await;
    assert_eq!(second.bucket(), BUCKET);
    assert_eq!(second.get(&fx.cancel, "todo").await.unwrap().message, "buy milk");

    first.close().await.unwrap();
    second.close().await.unwrap();
    assert_eq!(fx.network.open_projects(), 0);
}

#[tokio::test]
async fn test_failed_bucket_ensure_closes_project() {
    let fx = Fixture::new().await;
    fx.network.inject(Fault::EnsureBucket);

    let result = Service::open(&fx.cancel, &fx.network, &fx.access, BUCKET).await;
    assert!(matches!(result, Err(ServiceError::EnsureBucket { .. })));
    assert_eq!(fx.network.open_projects(), 0);
}

#[tokio::test]
async fn test_open_with_rejected_access_fails() {
    let fx = Fixture::new().await;
    let other = MemoryNetwork::new();
    other.register(SATELLITE, "another-key");

    let result = Service::open(&fx.cancel, &other, &fx.access, BUCKET).await;
    assert!(matches!(
        result,
        Err(ServiceError::OpenProject(StorageError::PermissionDenied(_)))
    ));
}

#[tokio::test]
async fn test_set_then_get_round_trips() {
    let fx = Fixture::new().await;
    let service = fx.open().await;

    let before = Utc::now().timestamp();
    service.set(&fx.cancel, "todo", "buy milk").await.unwrap();
    let note = service.get(&fx.cancel, "todo").await.unwrap();
    let after = Utc::now().timestamp();

    assert_eq!(note.identifier(), "todo");
    assert_eq!(note.message, "buy milk");
    let uploaded = note.uploaded().expect("upload time should be stamped").timestamp();
    assert!(before <= uploaded && uploaded <= after);
    assert_eq!(fx.network.active_transfers(), 0);
}

#[tokio::test]
async fn test_round_trip_various_values() {
    let fx = Fixture::new().await;
    let service = fx.open().await;

    for (identifier, value) in [
        ("empty", ""),
        ("nested/path/note", "line one\nline two"),
        ("unicode", "café ☕ 日本語"),
        ("spaces in name", "  padded  "),
    ] {
        service.set(&fx.cancel, identifier, value).await.unwrap();
        let note = service.get(&fx.cancel, identifier).await.unwrap();
        assert_eq!(note.identifier(), identifier);
        assert_eq!(note.message, value);
    }
}

#[tokio::test]
async fn test_set_overwrites() {
    let fx = Fixture::new().await;
    let service = fx.open().await;

    service.set(&fx.cancel, "todo", "buy milk").await.unwrap();
    service.set(&fx.cancel, "todo", "buy bread").await.unwrap();
    assert_eq!(service.get(&fx.cancel, "todo").await.unwrap().message, "buy bread");
}

#[tokio::test]
async fn test_get_missing_is_not_found() {
    let fx = Fixture::new().await;
    let service = fx.open().await;

    let err = service.get(&fx.cancel, "missing").await.unwrap_err();
    assert!(matches!(err, ServiceError::StartDownload { .. }));
    assert!(err.is_not_found());
    assert!(err.to_string().contains("\"missing\""));
}

#[tokio::test]
async fn test_delete_then_get_fails() {
    let fx = Fixture::new().await;
    let service = fx.open().await;

    service.set(&fx.cancel, "todo", "buy milk").await.unwrap();
    service.delete(&fx.cancel, "todo").await.unwrap();

    let err = service.get(&fx.cancel, "todo").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_list_prefix_scenario() {
    let fx = Fixture::new().await;
    let service = fx.open().await;

    service.set(&fx.cancel, "a/b", "x").await.unwrap();
    service.set(&fx.cancel, "a/c", "y").await.unwrap();
    service.set(&fx.cancel, "b/a", "z").await.unwrap();
    service.set(&fx.cancel, "ab", "w").await.unwrap();

    let listed: BTreeSet<String> = service
        .list(&fx.cancel, "a/")
        .await
        .unwrap()
        .into_iter()
        .map(|meta| meta.identifier)
        .collect();
    assert_eq!(listed, BTreeSet::from(["a/b".to_string(), "a/c".to_string()]));
}

#[tokio::test]
async fn test_list_matches_stored_set_after_mixed_operations() {
    let fx = Fixture::new().await;
    let service = fx.open().await;

    for identifier in ["n/1", "n/2", "n/3", "n/deep/4", "other"] {
        service.set(&fx.cancel, identifier, "v").await.unwrap();
    }
    service.delete(&fx.cancel, "n/2").await.unwrap();
    service.set(&fx.cancel, "n/5", "v").await.unwrap();

    let listed: Vec<String> = service
        .list(&fx.cancel, "n/")
        .await
        .unwrap()
        .into_iter()
        .map(|meta| meta.identifier)
        .collect();
    let unique: BTreeSet<&String> = listed.iter().collect();
    assert_eq!(unique.len(), listed.len(), "no duplicates");
    assert_eq!(
        unique.into_iter().cloned().collect::<Vec<_>>(),
        vec!["n/1", "n/3", "n/5", "n/deep/4"]
    );

    let everything = service.list(&fx.cancel, "").await.unwrap();
    assert_eq!(everything.len(), 5);
    assert!(everything.iter().all(|meta| meta.uploaded.is_some()));
}

#[tokio::test]
async fn test_list_degrades_malformed_upload_time() {
    let fx = Fixture::new().await;
    let service = fx.open().await;

    let mut custom = CustomMetadata::new();
    custom.insert(UPLOAD_TIME_KEY.to_string(), "not a time".to_string());
    fx.network
        .insert_object(API_KEY, BUCKET, "legacy", b"old", custom);

    let listed = service.list(&fx.cancel, "legacy").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].identifier, "legacy");
    assert_eq!(listed[0].uploaded, None);

    let note = service.get(&fx.cancel, "legacy").await.unwrap();
    assert_eq!(note.message, "old");
    assert_eq!(note.uploaded(), None);
}

#[tokio::test]
async fn test_list_failure_discards_partial_results() {
    let fx = Fixture::new().await;
    let service = fx.open().await;
    for identifier in ["a", "b", "c"] {
        service.set(&fx.cancel, identifier, "v").await.unwrap();
    }
    fx.network.inject(Fault::List { after: 2 });

    let err = service.list(&fx.cancel, "").await.unwrap_err();
    assert!(matches!(err, ServiceError::List { ref prefix, .. } if prefix.is_empty()));
}

#[tokio::test]
async fn test_write_failure_aborts_upload() {
    let fx = Fixture::new().await;
    let service = fx.open().await;
    fx.network.inject(Fault::Write);

    let err = service.set(&fx.cancel, "todo", "buy milk").await.unwrap_err();
    assert!(matches!(err, ServiceError::Upload { .. }));
    assert!(err.abort_outcome().is_some_and(AbortOutcome::is_aborted));
    assert!(fx.network.keys(API_KEY, BUCKET).is_empty());
    assert_eq!(fx.network.active_transfers(), 0);
}

#[tokio::test]
async fn test_failed_abort_is_reported_alongside_write_error() {
    let fx = Fixture::new().await;
    let service = fx.open().await;
    fx.network.inject(Fault::Write);
    fx.network.inject(Fault::Abort);

    let err = service.set(&fx.cancel, "todo", "buy milk").await.unwrap_err();
    match &err {
        ServiceError::Upload { source, abort, .. } => {
            assert!(source.to_string().contains("write"));
            assert!(matches!(abort, AbortOutcome::Failed(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("write"));
    assert!(message.contains("abort also failed"));
}

#[tokio::test]
async fn test_metadata_failure_aborts_upload() {
    let fx = Fixture::new().await;
    let service = fx.open().await;
    fx.network.inject(Fault::SetMetadata);

    let err = service.set(&fx.cancel, "todo", "buy milk").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::SetMetadata {
            abort: AbortOutcome::Aborted,
            ..
        }
    ));
    assert!(fx.network.keys(API_KEY, BUCKET).is_empty());
}

#[tokio::test]
async fn test_commit_failure_is_reported_without_abort() {
    let fx = Fixture::new().await;
    let service = fx.open().await;
    fx.network.inject(Fault::Commit);
    // Would surface if the service aborted after a failed commit.
    fx.network.inject(Fault::Abort);

    let err = service.set(&fx.cancel, "todo", "buy milk").await.unwrap_err();
    assert!(matches!(err, ServiceError::Commit { .. }));
    assert!(err.abort_outcome().is_none());
    assert!(fx.network.keys(API_KEY, BUCKET).is_empty());
    assert_eq!(fx.network.active_transfers(), 0);
}

#[tokio::test]
async fn test_cancel_interrupts_stalled_get() {
    let fx = Fixture::new().await;
    let service = fx.open().await;
    service.set(&fx.cancel, "todo", "buy milk").await.unwrap();
    fx.network.inject(Fault::StallDownload);

    let trigger = fx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), service.get(&fx.cancel, "todo"))
        .await
        .expect("get should return promptly after cancellation")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Download { .. }));
    assert!(err.is_cancelled());
    assert_eq!(fx.network.active_transfers(), 0);
}

#[tokio::test]
async fn test_cancelled_token_stops_every_operation() -> anyhow::Result<()> {
    let fx = Fixture::new().await;
    let service = fx.open().await;
    service.set(&fx.cancel, "todo", "buy milk").await?;
    let requests = fx.network.requests();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(service.get(&cancel, "todo").await.unwrap_err().is_cancelled());
    assert!(service.set(&cancel, "todo", "x").await.unwrap_err().is_cancelled());
    assert!(service.list(&cancel, "").await.unwrap_err().is_cancelled());
    assert!(service.delete(&cancel, "todo").await.unwrap_err().is_cancelled());

    // list_objects is contacted eagerly, everything else never starts
    assert_eq!(fx.network.requests(), requests + 1);
    assert_eq!(service.get(&fx.cancel, "todo").await?.message, "buy milk");

    service.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_open_uses_parsed_grant() {
    let fx = Fixture::new().await;
    let grant = fx.access.serialize();

    let access = fx.network.parse_access(&grant).unwrap();
    let service = Service::open(&fx.cancel, &fx.network, &access, "other-bucket")
        .await
        .unwrap();
    service.set(&fx.cancel, "x", "y").await.unwrap();
    assert_eq!(fx.network.keys(API_KEY, "other-bucket"), vec!["x"]);
}
