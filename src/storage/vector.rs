//! Embedding blob encoding and distance math.

/// Encode a vector as little-endian `f32` bytes.
#[must_use]
pub fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a blob written by [`vector_to_blob`]. Trailing partial values are ignored.
#[must_use]
pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine distance (`1 - cosine similarity`), in `[0, 2]`.
///
/// `None` when the dimensions differ or either vector has zero norm.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(1.0 - dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_encoding() {
        let v = vec![1.5f32, -2.0, 0.0];
        let blob = vector_to_blob(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(&blob[..4], &1.5f32.to_le_bytes());
        assert_eq!(blob_to_vector(&blob), v);
        assert!(blob_to_vector(&[]).is_empty());
    }

    #[test]
    fn test_cosine_distance() {
        let d = cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!(d.abs() < 1e-6);

        let d = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((d - 1.0).abs() < 1e-6);

        let d = cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((d - 2.0).abs() < 1e-6);

        assert_eq!(cosine_distance(&[1.0], &[1.0, 2.0]), None);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 2.0]), None);
    }
}
