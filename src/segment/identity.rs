//! Content-addressed segment ids.
//!
//! `id = path:startLine:KIND:name:<first 8 hex chars of SHA-256(content)>`

use sha2::{Digest, Sha256};

use super::model::SegmentKind;

/// Length of the checksum suffix.
const CHECKSUM_LEN: usize = 8;

/// Replace anything outside `[A-Za-z0-9._-]` with `_`; empty names become `anonymous`.
#[must_use]
pub fn sanitize_name(name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
        _ => "anonymous".to_string(),
    }
}

/// Position-derived prefix shared by a segment and all of its chunks.
#[must_use]
pub fn base_id(relative_path: &str, start_line: usize, kind: SegmentKind, name: Option<&str>) -> String {
    format!(
        "{relative_path}:{start_line}:{}:{}",
        kind.as_str(),
        sanitize_name(name)
    )
}

/// First eight hex characters of the SHA-256 of `content`.
#[must_use]
pub fn content_checksum(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(CHECKSUM_LEN);
    hex
}

/// Append the content checksum to a base id.
#[must_use]
pub fn finalize_id(base_id: &str, content: &str) -> String {
    format!("{base_id}:{}", content_checksum(content))
}
