//! Configuration management for codeindex.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - TOML configuration file (lowest priority)

mod settings;

pub use settings::{
    Config, EmbeddingConfig, PoolConfig, SearchConfig, SegmentationConfig, StoreConfig,
    UpdateConfig,
};
