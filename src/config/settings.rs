//! Configuration settings and validation.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration for the indexer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for the `SQLite` vector store and other data.
    pub data_dir: PathBuf,

    /// Root of the source tree that is watched and indexed.
    pub watch_root: PathBuf,

    /// Vector store collection that receives the entries.
    pub collection: String,

    /// Host address to bind the control surface to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub segmentation: SegmentationConfig,
    pub pools: PoolConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub search: SearchConfig,
    pub updates: UpdateConfig,
}

/// Segmentation engine and eligibility settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Longest segment text, in characters, before it is split into chunks.
    pub max_segment_length: usize,
    /// Characters shared by consecutive chunks.
    pub overlap_chars: usize,
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
    /// File extensions, without the dot, that are parsed.
    pub extensions: Vec<String>,
}

/// Per-stage worker pool sizes and queue capacities.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub parse_workers: usize,
    pub parse_batch_size: usize,
    pub embedding_workers: usize,
    pub embedding_queue: usize,
    pub store_workers: usize,
    pub store_queue: usize,
    pub watch_workers: usize,
    pub watch_queue: usize,
    pub upsert_batch_size: usize,
}

/// Embedding backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `ollama` or `placeholder`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    /// Chat model used by the downstream query path.
    pub chat_model: String,
    /// Vector width produced by the placeholder provider.
    pub dimension: usize,
    /// Texts sent per HTTP request.
    pub batch_size: usize,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

/// Vector store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub busy_timeout_ms: u64,
}

/// Search settings shared with the query path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub min_similarity: f32,
    pub max_results: usize,
}

/// Incremental update settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Quiet period per path before a change is applied.
    pub debounce_ms: u64,
    /// Remove a file's existing entries before upserting its new segments.
    pub replace_on_modify: bool,
}

fn available_cores() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            watch_root: PathBuf::from("."),
            collection: "code_embeddings".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8765,
            log_level: "info".to_string(),
            segmentation: SegmentationConfig::default(),
            pools: PoolConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            search: SearchConfig::default(),
            updates: UpdateConfig::default(),
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_segment_length: 2000,
            overlap_chars: 100,
            max_file_size: 1024 * 1024,
            extensions: vec!["java".to_string()],
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cores = available_cores();
        Self {
            parse_workers: cores * 2,
            parse_batch_size: 50,
            embedding_workers: 2,
            embedding_queue: 100,
            store_workers: 2,
            store_queue: 50,
            watch_workers: (cores / 2).max(2),
            watch_queue: 50,
            upsert_batch_size: 200,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            chat_model: "llama3".to_string(),
            dimension: 768,
            batch_size: 32,
            connect_timeout_ms: 3000,
            read_timeout_ms: 30000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.5,
            max_results: 10,
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            replace_on_modify: true,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config '{}': {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::config(format!("invalid config '{}': {e}", path.display())))
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config("port cannot be 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.host.is_empty() {
            return Err(Error::config("host cannot be empty"));
        }

        if self.collection.trim().is_empty() {
            return Err(Error::config("collection cannot be empty"));
        }

        if self.segmentation.max_segment_length == 0 {
            return Err(Error::config("max_segment_length cannot be 0"));
        }
        if self.segmentation.max_file_size == 0 {
            return Err(Error::config("max_file_size cannot be 0"));
        }
        if self.segmentation.extensions.is_empty() {
            return Err(Error::config("extensions cannot be empty"));
        }

        let pools = [
            ("parse_workers", self.pools.parse_workers),
            ("parse_batch_size", self.pools.parse_batch_size),
            ("embedding_workers", self.pools.embedding_workers),
            ("embedding_queue", self.pools.embedding_queue),
            ("store_workers", self.pools.store_workers),
            ("store_queue", self.pools.store_queue),
            ("watch_workers", self.pools.watch_workers),
            ("watch_queue", self.pools.watch_queue),
            ("upsert_batch_size", self.pools.upsert_batch_size),
            ("embedding batch_size", self.embedding.batch_size),
            ("max_results", self.search.max_results),
        ];
        if let Some((name, _)) = pools.iter().find(|(_, value)| *value == 0) {
            return Err(Error::config(format!("{name} cannot be 0")));
        }

        match self.embedding.provider.as_str() {
            "ollama" | "placeholder" => {}
            other => {
                return Err(Error::config(format!(
                    "unknown embedding provider '{other}', must be one of: ollama, placeholder"
                )))
            }
        }
        if !self.embedding.base_url.starts_with("http") {
            return Err(Error::config(format!(
                "embedding base_url '{}' must be an http(s) URL",
                self.embedding.base_url
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::config("embedding dimension cannot be 0"));
        }

        if !(0.0..=1.0).contains(&self.search.min_similarity) {
            return Err(Error::config("min_similarity must be between 0 and 1"));
        }

        Ok(())
    }

    /// Get the path to the `SQLite` database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("codeindex.db")
    }

    /// Get the server address as a string.
    #[must_use]
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8765);
        assert_eq!(config.collection, "code_embeddings");
        assert_eq!(config.segmentation.max_segment_length, 2000);
        assert_eq!(config.segmentation.overlap_chars, 100);
        assert_eq!(config.pools.parse_batch_size, 50);
        assert_eq!(config.pools.upsert_batch_size, 200);
        assert!(config.pools.watch_workers >= 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_port() {
        let config = Config {
            port: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "invalid".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_validate_zero_segment_length() {
        let config = Config {
            segmentation: SegmentationConfig {
                max_segment_length: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_segment_length"));
    }

    #[test]
    fn test_validate_zero_pool() {
        let config = Config {
            pools: PoolConfig {
                store_workers: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store_workers"));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let config = Config {
            embedding: EmbeddingConfig {
                provider: "magic".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_validate_similarity_range() {
        let config = Config {
            search: SearchConfig {
                min_similarity: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_similarity"));
    }

    #[test]
    fn test_validate_empty_host() {
        let config = Config {
            host: String::new(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codeindex.toml");
        std::fs::write(
            &path,
            r#"
collection = "java_code"

[segmentation]
max_segment_length = 1500

[updates]
replace_on_modify = false
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.collection, "java_code");
        assert_eq!(config.segmentation.max_segment_length, 1500);
        assert_eq!(config.segmentation.overlap_chars, 100);
        assert!(!config.updates.replace_on_modify);
        assert_eq!(config.updates.debounce_ms, 1000);
    }

    #[test]
    fn test_from_file_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }

    #[test]
    fn test_database_path() {
        let config = Config {
            data_dir: PathBuf::from("/var/lib/codeindex"),
            ..Default::default()
        };
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/codeindex/codeindex.db")
        );
    }

    #[test]
    fn test_server_addr() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 9090,
            ..Default::default()
        };
        assert_eq!(config.server_addr(), "0.0.0.0:9090");
    }
}
