//! Control surface and ambient observability.
//!
//! This module provides:
//! - The axum application with graceful shutdown ([`App`])
//! - REST endpoints for reindexing, status and health
//! - Prometheus metrics and tracing setup

mod app;
pub mod metrics;
pub mod observability;
mod rest;

pub use app::{App, ServerConfig};
pub use rest::{create_rest_router, AppState, HealthResponse, IndexRequest, IndexResponse};
