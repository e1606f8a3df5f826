//! codeindex - Java source indexer
//!
//! Entry point: loads configuration, wires the pipelines together and
//! serves the control surface.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use codeindex::embeddings::build_gateway;
use codeindex::indexing::IndexingOrchestrator;
use codeindex::pool::StagePool;
use codeindex::segment::EligibilityRules;
use codeindex::server::metrics::init_metrics;
use codeindex::server::observability::init_tracing;
use codeindex::server::{App, AppState, ServerConfig};
use codeindex::storage::SqliteVectorStore;
use codeindex::watcher::{ChangeDispatcher, FileWatcher, UpdateOrchestrator};
use codeindex::Config;

/// codeindex - keeps a vector store in sync with a Java source tree
#[derive(Parser, Debug)]
#[command(name = "codeindex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "CODEINDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the `SQLite` vector store
    #[arg(short, long, env = "CODEINDEX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Source tree to index and watch
    #[arg(short, long, env = "CODEINDEX_WATCH_ROOT")]
    watch_root: Option<PathBuf>,

    /// Host address to bind to
    #[arg(long, env = "CODEINDEX_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CODEINDEX_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CODEINDEX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging output
    #[arg(long, env = "CODEINDEX_LOG_JSON")]
    log_json: bool,

    /// Vector store collection name
    #[arg(long, env = "CODEINDEX_COLLECTION")]
    collection: Option<String>,

    /// Embedding provider (ollama, placeholder)
    #[arg(long, env = "CODEINDEX_EMBEDDING_PROVIDER")]
    provider: Option<String>,

    /// Start a full reindex as soon as the server is up
    #[arg(long)]
    reindex_on_start: bool,

    /// Run one full reindex and exit
    #[arg(long, conflicts_with = "reindex_on_start")]
    once: bool,

    /// Do not watch the source tree for changes
    #[arg(long)]
    no_watch: bool,
}

impl Cli {
    /// File values first, then anything given on the command line or environment.
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(data_dir) = &self.data_dir {
            config.data_dir.clone_from(data_dir);
        }
        if let Some(watch_root) = &self.watch_root {
            config.watch_root.clone_from(watch_root);
        }
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        if let Some(collection) = &self.collection {
            config.collection.clone_from(collection);
        }
        if let Some(provider) = &self.provider {
            config.embedding.provider.clone_from(provider);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_tracing(&config.log_level, cli.log_json);

    tracing::info!("codeindex v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?config, "Configuration loaded");

    config.validate()?;
    init_metrics();

    let store = Arc::new(
        SqliteVectorStore::open(
            config.database_path(),
            Duration::from_millis(config.store.busy_timeout_ms),
        )
        .with_context(|| format!("opening {}", config.database_path().display()))?,
    );
    let embedder = build_gateway(&config.embedding, &config.pools)?;
    tracing::info!(
        model = embedder.model_name(),
        collection = %config.collection,
        "Embedding gateway ready"
    );

    let indexing = Arc::new(IndexingOrchestrator::new(
        &config,
        Arc::clone(&embedder),
        store.clone(),
    ));

    if cli.once {
        let report = indexing.run(&config.watch_root).await?;
        tracing::info!(
            files = report.files_found,
            segments = report.segments_parsed,
            upserted = report.entries_upserted,
            batches_failed = report.batches_failed,
            "Reindex complete"
        );
        return Ok(());
    }

    let watcher = if cli.no_watch {
        None
    } else {
        let update = Arc::new(
            UpdateOrchestrator::new(&config, embedder, store.clone())
                .with_indexing(Arc::clone(&indexing)),
        );
        let dispatcher = Arc::new(ChangeDispatcher::new(
            update,
            StagePool::new("watch", config.pools.watch_workers, config.pools.watch_queue),
            Duration::from_millis(config.updates.debounce_ms),
            tokio::runtime::Handle::current(),
        ));
        let rules = EligibilityRules::new(&config.segmentation).with_gitignore(&config.watch_root);
        let watcher = Arc::new(FileWatcher::new(config.watch_root.clone(), rules, dispatcher));
        let starter = Arc::clone(&watcher);
        tokio::task::spawn_blocking(move || starter.start())
            .await
            .context("watcher start task failed")??;
        Some(watcher)
    };

    if cli.reindex_on_start {
        drop(indexing.start(config.watch_root.clone())?);
        tracing::info!(path = %config.watch_root.display(), "Initial reindex started");
    }

    let state = AppState {
        indexing,
        database: store.database().clone(),
        store,
        watcher,
        default_root: config.watch_root.clone(),
    };

    App::new(ServerConfig::from(&config), state).run().await?;
    Ok(())
}
