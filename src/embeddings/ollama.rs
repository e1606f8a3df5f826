//! Ollama embedding backend.
//!
//! Uses `POST {base_url}/api/embed` with `{"model", "input": [...]}`.
//! Inputs are split into request-sized groups that run on the embedding
//! stage pool.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::EmbeddingGateway;
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::pool::StagePool;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding gateway talking to an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    pool: StagePool,
}

impl OllamaEmbedder {
    /// Create an embedder with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig, pool: StagePool) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()
            .map_err(|e| EmbeddingError::Http(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/embed", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            pool,
        })
    }

    /// Endpoint requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(
        client: Client,
        endpoint: String,
        model: String,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = client
            .post(&endpoint)
            .json(&EmbedRequest {
                model: &model,
                input: &texts,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingGateway for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self
            .pool
            .run(Self::request(
                self.client.clone(),
                self.endpoint.clone(),
                self.model.clone(),
                vec![text.to_string()],
            ))
            .await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut results = vec![Vec::new(); texts.len()];

        let pending: Vec<usize> = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, _)| i)
            .collect();

        let mut handles = Vec::new();
        for group in pending.chunks(self.batch_size) {
            let inputs = group.iter().map(|&i| texts[i].clone()).collect();
            let handle = self
                .pool
                .spawn(Self::request(
                    self.client.clone(),
                    self.endpoint.clone(),
                    self.model.clone(),
                    inputs,
                ))
                .await;
            handles.push((group.to_vec(), handle));
        }

        for (group, handle) in handles {
            match handle.await {
                Ok(Ok(vectors)) => {
                    for (index, vector) in group.into_iter().zip(vectors) {
                        results[index] = vector;
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        items = group.len(),
                        error = %e,
                        "Embedding request failed, items left empty"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Embedding task failed");
                }
            }
        }

        tracing::debug!(
            requested = texts.len(),
            embedded = results.iter().filter(|v| !v.is_empty()).count(),
            model = %self.model,
            "Embedded batch"
        );
        results
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    /// Fake server: each input becomes `[len, 1.0]`; any input containing
    /// `boom` fails the whole request.
    async fn spawn_fake_ollama() -> String {
        async fn embed(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
            let inputs: Vec<String> = body["input"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            if inputs.iter().any(|s| s.contains("boom")) {
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
            let embeddings: Vec<Vec<f32>> = inputs
                .iter()
                .map(|s| vec![s.len() as f32, 1.0])
                .collect();
            Ok(Json(json!({ "model": body["model"], "embeddings": embeddings })))
        }

        let app = Router::new().route("/api/embed", post(embed));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn embedder(base_url: String, batch_size: usize) -> OllamaEmbedder {
        let config = EmbeddingConfig {
            base_url,
            batch_size,
            ..Default::default()
        };
        OllamaEmbedder::new(&config, StagePool::new("embedding", 2, 8)).unwrap()
    }

    #[test]
    fn test_endpoint() {
        let e = embedder("http://localhost:11434/".to_string(), 4);
        assert_eq!(e.endpoint(), "http://localhost:11434/api/embed");
        assert_eq!(e.model_name(), "nomic-embed-text");
    }

    #[tokio::test]
    async fn test_embed_single() {
        let base = spawn_fake_ollama().await;
        let e = embedder(base, 4);

        assert_eq!(e.embed("abc").await.unwrap(), vec![3.0, 1.0]);
        assert!(e.embed("  ").await.unwrap().is_empty());
        assert!(matches!(
            e.embed("boom").await,
            Err(EmbeddingError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_failures_are_positional() {
        let base = spawn_fake_ollama().await;
        let e = embedder(base, 2);

        let texts: Vec<String> = ["a", "", "bb", "boom", "ccc", "dddd"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let vectors = e.embed_batch(&texts).await;

        // groups of non-blank inputs: [a, bb] [boom, ccc] [dddd]
        assert_eq!(vectors.len(), 6);
        assert_eq!(vectors[0], vec![1.0, 1.0]);
        assert!(vectors[1].is_empty());
        assert_eq!(vectors[2], vec![2.0, 1.0]);
        assert!(vectors[3].is_empty());
        assert!(vectors[4].is_empty());
        assert_eq!(vectors[5], vec![4.0, 1.0]);
    }

    #[tokio::test]
    async fn test_unreachable_backend_yields_empty_vectors() {
        // nothing listens on port 9 locally
        let e = embedder("http://127.0.0.1:9".to_string(), 4);
        let vectors = e.embed_batch(&["x".to_string(), "y".to_string()]).await;
        assert_eq!(vectors, vec![Vec::<f32>::new(), Vec::new()]);
    }
}
