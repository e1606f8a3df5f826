//! Deterministic hash-based embeddings for offline runs and tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingGateway;
use crate::error::EmbeddingError;

/// Create a deterministic, L2-normalized embedding from the text's hash.
#[must_use]
pub fn placeholder_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    let mut seed = u64::from_le_bytes(seed_bytes);

    let mut embedding = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        #[allow(clippy::cast_precision_loss)]
        let value = (((seed >> 33) as f32) / (u32::MAX as f32)).mul_add(2.0, -1.0);
        embedding.push(value);
    }

    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut embedding {
            *v /= norm;
        }
    }
    embedding
}

/// Gateway backed by [`placeholder_embedding`].
#[derive(Debug, Clone)]
pub struct PlaceholderEmbedder {
    dimension: usize,
}

impl PlaceholderEmbedder {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingGateway for PlaceholderEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(placeholder_embedding(text, self.dimension))
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|text| {
                if text.trim().is_empty() {
                    Vec::new()
                } else {
                    placeholder_embedding(text, self.dimension)
                }
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        "placeholder"
    }
}
