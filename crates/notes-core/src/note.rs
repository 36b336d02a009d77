//! Note model parsed from stored objects.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::storage::ObjectInfo;

/// Custom metadata key holding the upload time of a note.
pub const UPLOAD_TIME_KEY: &str = "notes:upload-time";

/// Information about a note without its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteMeta {
    /// Object key the note is stored under
    pub identifier: String,
    /// Upload time, `None` when never set or unparsable
    pub uploaded: Option<DateTime<FixedOffset>>,
}

/// A note as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    #[serde(flatten)]
    pub meta: NoteMeta,
    pub message: String,
}

impl Note {
    pub fn identifier(&self) -> &str {
        &self.meta.identifier
    }

    pub fn uploaded(&self) -> Option<&DateTime<FixedOffset>> {
        self.meta.uploaded.as_ref()
    }
}

/// Build a note from downloaded bytes and the object's information.
///
/// The body is decoded as text without validation; invalid UTF-8 sequences are
/// replaced rather than rejected.
pub fn parse_note(info: &ObjectInfo, data: &[u8]) -> Note {
    Note {
        meta: parse_note_meta(info),
        message: String::from_utf8_lossy(data).into_owned(),
    }
}

/// Build note metadata from an object's information.
///
/// A malformed upload time is logged and treated as unset.
pub fn parse_note_meta(info: &ObjectInfo) -> NoteMeta {
    let uploaded = info
        .custom
        .get(UPLOAD_TIME_KEY)
        .and_then(|value| match parse_timestamp(value) {
            Ok(time) => Some(time),
            Err(e) => {
                warn!(key = %info.key, "failed to parse upload time {:?}: {}", value, e);
                None
            }
        });

    NoteMeta {
        identifier: info.key.clone(),
        uploaded,
    }
}

/// Timestamp written into `UPLOAD_TIME_KEY` for an upload happening at `now`.
pub fn upload_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 timestamp, keeping its offset.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value)
}

/// Encode a timestamp back into RFC 3339.
pub fn format_timestamp(time: &DateTime<FixedOffset>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
