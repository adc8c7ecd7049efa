//! Token payout service.
//!
//! Wires an [`AppConfig`] into a ready [`Executor`]: opens the campaign
//! store, builds chain adapters for every configured chain, installs logging
//! and optionally serves Prometheus metrics.

use std::future::Future;
use std::sync::Arc;

use payout_chain::{AdapterRegistry, ChainError, EvmAdapter, EvmSigner, SolanaAdapter, SolanaSigner};
use payout_config::{validate_config, AppConfig, ConfigError};
use payout_engine::{BuilderError, Executor, ExecutorError};
use payout_metrics::{init_tracing, MetricsCollector, MetricsServer, MetricsServerError, TracingError};
use payout_store::{open_store, CampaignStore, StoreError};
use payout_types::ChainFamily;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use payout_engine::{DeployOutcome, ProgressEvent, RunSummary};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("executor setup error: {0}")]
    Builder(#[from] BuilderError),

    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("tracing error: {0}")]
    Tracing(#[from] TracingError),
}

/// Signing backends, held outside this process's key material
#[derive(Clone, Default)]
pub struct Signers {
    pub evm: Option<Arc<dyn EvmSigner>>,
    pub solana: Option<Arc<dyn SolanaSigner>>,
}

/// One adapter per configured chain; chains whose family has no signer are
/// skipped with a warning
pub fn adapters_from_config(
    config: &AppConfig,
    signers: &Signers,
) -> Result<AdapterRegistry, ServiceError> {
    let mut adapters = AdapterRegistry::new();

    for (name, chain) in &config.chains {
        match chain.family {
            ChainFamily::Evm => match &signers.evm {
                Some(signer) => {
                    let adapter = EvmAdapter::from_config(chain, Arc::clone(signer))?;
                    adapters.register(&chain.chain_key, Arc::new(adapter));
                }
                None => warn!(chain = %name, "no EVM signer configured, chain skipped"),
            },
            ChainFamily::Solana => match &signers.solana {
                Some(signer) => {
                    let adapter = SolanaAdapter::from_config(chain, Arc::clone(signer))?;
                    adapters.register(&chain.chain_key, Arc::new(adapter));
                }
                None => warn!(chain = %name, "no Solana signer configured, chain skipped"),
            },
        }
    }

    Ok(adapters)
}

pub struct PayoutService {
    config: AppConfig,
    executor: Arc<Executor>,
    metrics: Arc<MetricsCollector>,
}

impl PayoutService {
    /// Validate the config, open its store and build the executor
    pub async fn new(config: AppConfig, adapters: AdapterRegistry) -> Result<Self, ServiceError> {
        validate_config(&config)?;
        let store = open_store(&config.store.database_url).await?;
        Self::with_store(config, store, adapters)
    }

    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn CampaignStore>,
        adapters: AdapterRegistry,
    ) -> Result<Self, ServiceError> {
        let metrics = Arc::new(MetricsCollector::new());
        let executor = Executor::builder()
            .with_app_config(&config)
            .with_store(store)
            .with_adapters(adapters)
            .with_metrics(Arc::clone(&metrics))
            .build()?;

        Ok(Self {
            config,
            executor: Arc::new(executor),
            metrics,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Install the global subscriber; call once per process
    pub fn init_logging(&self) -> Result<(), ServiceError> {
        init_tracing(&self.config.logging, Arc::clone(&self.metrics))?;
        Ok(())
    }

    /// Pause campaigns a previous process left SENDING
    pub async fn recover(&self) -> Result<Vec<String>, ServiceError> {
        let paused = self.executor.recover_all().await?;
        if !paused.is_empty() {
            info!(campaigns = ?paused, "campaigns paused after restart");
        }
        Ok(paused)
    }

    /// Serve `/metrics` and `/health` until `shutdown` resolves; `None` when
    /// metrics are disabled
    pub fn spawn_metrics_server<F>(
        &self,
        shutdown: F,
    ) -> Option<JoinHandle<Result<(), MetricsServerError>>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.config.metrics.enabled {
            return None;
        }
        let server = MetricsServer::new(
            Arc::clone(&self.metrics),
            self.config.metrics.listen_addr.clone(),
        );
        Some(tokio::spawn(server.serve_with_shutdown(shutdown)))
    }
}
