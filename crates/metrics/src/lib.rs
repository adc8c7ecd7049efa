//! Metrics and logging for the token payout engine
//!
//! # Features
//!
//! - Prometheus counters and histograms for runs, batches, confirmations and
//!   deployments
//! - HTTP endpoint for metrics scraping
//! - `tracing` initialization from [`payout_config::LoggingConfig`]
//! - Per-run spans with a unique run id
//!
//! # Example
//!
//! ```no_run
//! use payout_metrics::{MetricsCollector, MetricsServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let collector = Arc::new(MetricsCollector::new());
//!     collector.record_run_started();
//!
//!     let server = MetricsServer::new(collector.clone(), "0.0.0.0:9090".to_string());
//!     server.serve().await.unwrap();
//! }
//! ```

pub mod collector;
pub mod http;
pub mod metrics;
pub mod tracing;

pub use collector::{BatchResult, MetricsCollector, MetricsError};
pub use http::{MetricsServer, MetricsServerError};
pub use crate::tracing::{default_directives, init_tracing, MetricsLayer, RunId, RunSpan, TracingError};
