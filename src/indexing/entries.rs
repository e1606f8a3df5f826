//! Projection of [`CodeSegment`]s into [`VectorEntry`]s.

use serde_json::{Map, Value};

use crate::segment::CodeSegment;
use crate::storage::{VectorEntry, FILE_PATH_KEY};

/// Flat entry metadata for a segment.
///
/// Positional keys are written first; segment metadata fills in any key
/// not already present.
#[must_use]
pub fn entry_metadata(segment: &CodeSegment) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(FILE_PATH_KEY.into(), Value::from(segment.relative_path.as_str()));
    map.insert("startLine".into(), Value::from(segment.start_line));
    map.insert("endLine".into(), Value::from(segment.end_line));
    map.insert("type".into(), Value::from(segment.kind.as_str()));
    map.insert(
        "entityName".into(),
        segment
            .entity_name
            .as_deref()
            .map_or(Value::Null, Value::from),
    );
    map.insert("id".into(), Value::from(segment.id.as_str()));
    if let Some(parent_id) = &segment.parent_id {
        map.insert("parentId".into(), Value::from(parent_id.as_str()));
    }
    if let Some(parent_fqn) = &segment.parent_fqn {
        map.insert("parentFqn".into(), Value::from(parent_fqn.as_str()));
    }
    if let Some(modified) = segment.last_modified {
        map.insert("lastModified".into(), Value::from(modified.to_rfc3339()));
    }

    map.insert("isSubChunk".into(), Value::Bool(segment.is_sub_chunk()));
    if let Some(chunk) = &segment.chunk {
        map.insert("chunkNumber".into(), Value::from(chunk.chunk_number));
        map.insert("totalChunks".into(), Value::from(chunk.total_chunks));
        map.insert(
            "originalSegmentId".into(),
            Value::from(chunk.original_segment_id.as_str()),
        );
    }

    for (key, value) in segment.metadata.to_flat_map() {
        map.entry(key).or_insert(value);
    }
    map
}

/// Entry for a segment and its embedding.
#[must_use]
pub fn to_entry(segment: &CodeSegment, embedding: Vec<f32>) -> VectorEntry {
    VectorEntry {
        id: segment.id.clone(),
        embedding,
        metadata: entry_metadata(segment),
        document: segment.content.clone(),
    }
}

/// Pair segments with their embeddings, dropping segments whose vector is empty.
///
/// Returns the entries and the number of segments dropped. Callers check
/// that both slices have the same length first.
#[must_use]
pub fn pair_embeddings(
    segments: &[CodeSegment],
    embeddings: Vec<Vec<f32>>,
) -> (Vec<VectorEntry>, usize) {
    let mut missing = 0;
    let entries = segments
        .iter()
        .zip(embeddings)
        .filter_map(|(segment, embedding)| {
            if embedding.is_empty() {
                tracing::debug!(id = %segment.id, "No embedding for segment, skipping");
                missing += 1;
                None
            } else {
                Some(to_entry(segment, embedding))
            }
        })
        .collect();
    (entries, missing)
}
