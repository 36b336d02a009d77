//! Custom metadata <-> S3 user metadata.
//!
//! S3 carries user metadata in `x-amz-meta-*` headers, where `:` is not a
//! valid name character. Keys are escaped (`:` as `%3a`, `%` as `%25`) on the
//! way out and unescaped on the way back. S3 lowercases metadata names, so
//! keys should be lowercase to survive a round trip.

use std::collections::HashMap;

use notes_core::CustomMetadata;

/// Escape a custom metadata key into a header-safe S3 metadata name.
pub fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3a"),
            c => out.push(c),
        }
    }
    out
}

/// Reverse `encode_key`. Unknown escapes are kept as written.
pub fn decode_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let escape = &rest[pos..];
        if let Some(tail) = escape
            .strip_prefix("%3a")
            .or_else(|| escape.strip_prefix("%3A"))
        {
            out.push(':');
            rest = tail;
        } else if let Some(tail) = escape.strip_prefix("%25") {
            out.push('%');
            rest = tail;
        } else {
            out.push('%');
            rest = &escape[1..];
        }
    }
    out.push_str(rest);
    out
}

pub fn encode(custom: &CustomMetadata) -> HashMap<String, String> {
    custom
        .iter()
        .map(|(key, value)| (encode_key(key), value.clone()))
        .collect()
}

pub fn decode(metadata: Option<&HashMap<String, String>>) -> CustomMetadata {
    metadata
        .into_iter()
        .flatten()
        .map(|(name, value)| (decode_key(name), value.clone()))
        .collect()
}
