//! Embedding gateway.
//!
//! This module provides:
//! - The [`EmbeddingGateway`] trait the pipelines embed through
//! - An Ollama HTTP backend ([`OllamaEmbedder`])
//! - A deterministic offline backend ([`PlaceholderEmbedder`])
//!
//! Batch calls never fail as a whole: an item that could not be embedded
//! comes back as an empty vector at its position.

mod ollama;
mod placeholder;

use std::sync::Arc;

use async_trait::async_trait;

pub use ollama::OllamaEmbedder;
pub use placeholder::{placeholder_embedding, PlaceholderEmbedder};

use crate::config::{EmbeddingConfig, PoolConfig};
use crate::error::EmbeddingError;
use crate::pool::StagePool;
use crate::{Error, Result};

/// Text to vector conversion.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Embed a single text. Blank text yields an empty vector.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError>;

    /// Embed many texts, one vector per input, in input order.
    ///
    /// Failed items are empty vectors.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// Build the gateway selected by `config.provider`.
///
/// # Errors
///
/// Returns an error for an unknown provider or an HTTP client that cannot be built.
pub fn build_gateway(
    config: &EmbeddingConfig,
    pools: &PoolConfig,
) -> Result<Arc<dyn EmbeddingGateway>> {
    match config.provider.as_str() {
        "ollama" => {
            let pool = StagePool::new("embedding", pools.embedding_workers, pools.embedding_queue);
            Ok(Arc::new(OllamaEmbedder::new(config, pool)?))
        }
        "placeholder" => Ok(Arc::new(PlaceholderEmbedder::new(config.dimension))),
        other => Err(Error::config(format!("unknown embedding provider '{other}'"))),
    }
}
