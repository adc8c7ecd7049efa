use payout_config::LoggingConfig;
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::collector::MetricsCollector;

/// Default filter directives for a configured log level.
///
/// Payout crates log at debug unless the configured level is already more
/// verbose.
pub fn default_directives(level: &str) -> String {
    match level {
        "trace" | "debug" => level.to_string(),
        _ => format!("{level},payout=debug"),
    }
}

/// Initialize tracing with metrics integration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(
    config: &LoggingConfig,
    collector: Arc<MetricsCollector>,
) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    let json_layer = config.json.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .json()
    });
    let plain_layer = (!config.json).then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(plain_layer)
        .with(MetricsLayer::new(collector))
        .try_init()
        .map_err(|e| TracingError::InitError(e.to_string()))?;

    Ok(())
}

/// Tracing layer counting warning and error events
pub struct MetricsLayer {
    collector: Arc<MetricsCollector>,
}

impl MetricsLayer {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for MetricsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = match *metadata.level() {
            Level::ERROR => "error",
            Level::WARN => "warn",
            _ => return,
        };
        // crate name only, keeps label cardinality bounded
        let target = metadata.target().split("::").next().unwrap_or("unknown");
        self.collector.record_log_event(level, target);
    }
}

/// Identifier for one campaign run, unique across restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span context for one campaign run
#[derive(Debug, Clone)]
pub struct RunSpan {
    pub run_id: RunId,
    pub campaign_id: String,
}

impl RunSpan {
    pub fn new(campaign_id: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            campaign_id: campaign_id.into(),
        }
    }

    /// Tracing span carrying the run and campaign ids
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "campaign_run",
            run_id = %self.run_id,
            campaign_id = %self.campaign_id,
        )
    }
}

/// Tracing error types
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("tracing initialization error: {0}")]
    InitError(String),
}
