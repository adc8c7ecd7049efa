//! Executor tests against the in-memory store and a scripted chain adapter

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use payout_chain::{
    ChainAdapter, ChainError, DeployReceipt, DeployRequest, FeeEstimate, FeeQuery, TransferBatch,
    TxStatusReport,
};
use payout_retry::RetryPolicy;
use payout_store::{CampaignStore, InMemoryStore};
use payout_types::{
    Campaign, CampaignStatus, ChainFamily, Recipient, RecipientStatus, TransactionKind,
    TransactionStatus,
};

use crate::{
    DeployOutcome, EngineConfig, ErrorKind, ExecutionLockRegistry, Executor, ExecutorError,
    LockKey, ProgressEvent,
};

type SubmitHook = Box<dyn Fn(usize) + Send + Sync>;

struct MockAdapter {
    family: ChainFamily,
    requires_contract: bool,
    submitted: Mutex<Vec<TransferBatch>>,
    submit_script: Mutex<VecDeque<Result<String, ChainError>>>,
    status: Mutex<TxStatusReport>,
    deploy_result: Mutex<Option<Result<DeployReceipt, ChainError>>>,
    deployment_status: Mutex<Option<Result<Option<DeployReceipt>, ChainError>>>,
    deploy_calls: AtomicUsize,
    fee_fails: bool,
    on_submit: Option<SubmitHook>,
    submit_calls: AtomicUsize,
}

impl MockAdapter {
    fn evm() -> Self {
        Self {
            family: ChainFamily::Evm,
            requires_contract: false,
            submitted: Mutex::new(Vec::new()),
            submit_script: Mutex::new(VecDeque::new()),
            status: Mutex::new(TxStatusReport::confirmed(100, Some(50_000))),
            deploy_result: Mutex::new(None),
            deployment_status: Mutex::new(None),
            deploy_calls: AtomicUsize::new(0),
            fee_fails: false,
            on_submit: None,
            submit_calls: AtomicUsize::new(0),
        }
    }

    fn requiring_contract(mut self) -> Self {
        self.requires_contract = true;
        self
    }

    fn with_script(self, script: Vec<Result<String, ChainError>>) -> Self {
        *self.submit_script.lock().unwrap() = script.into();
        self
    }

    fn with_status(self, status: TxStatusReport) -> Self {
        *self.status.lock().unwrap() = status;
        self
    }

    fn with_deploy(self, result: Result<DeployReceipt, ChainError>) -> Self {
        *self.deploy_result.lock().unwrap() = Some(result);
        self
    }

    fn set_deploy(&self, result: Result<DeployReceipt, ChainError>) {
        *self.deploy_result.lock().unwrap() = Some(result);
    }

    fn set_deployment_status(&self, status: Result<Option<DeployReceipt>, ChainError>) {
        *self.deployment_status.lock().unwrap() = Some(status);
    }

    fn deploy_calls(&self) -> usize {
        self.deploy_calls.load(Ordering::SeqCst)
    }

    fn with_failing_fees(mut self) -> Self {
        self.fee_fails = true;
        self
    }

    fn on_submit(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_submit = Some(Box::new(hook));
        self
    }

    fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn submitted(&self) -> Vec<TransferBatch> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn family(&self) -> ChainFamily {
        self.family
    }

    fn requires_contract(&self) -> bool {
        self.requires_contract
    }

    fn validate_address(&self, address: &str) -> bool {
        address.starts_with("0x") && address.len() == 42
    }

    async fn submit_batch(&self, batch: &TransferBatch) -> Result<String, ChainError> {
        let call = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.submit_script.lock().unwrap().pop_front();
        let result = scripted.unwrap_or_else(|| Ok(format!("0xtx{call}")));
        if result.is_ok() {
            self.submitted.lock().unwrap().push(batch.clone());
        }
        if let Some(hook) = &self.on_submit {
            hook(call);
        }
        result
    }

    async fn get_status(&self, _tx_hash: &str) -> Result<TxStatusReport, ChainError> {
        Ok(self.status.lock().unwrap().clone())
    }

    async fn deploy_contract(&self, _request: &DeployRequest) -> Result<DeployReceipt, ChainError> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        self.deploy_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(ChainError::Unsupported("no deploy scripted".into())))
    }

    async fn deployment_status(&self, _tx_hash: &str) -> Result<Option<DeployReceipt>, ChainError> {
        self.deployment_status
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(ChainError::Unsupported("no deployment status scripted".into())))
    }

    async fn estimate_fee(&self, query: &FeeQuery) -> Result<FeeEstimate, ChainError> {
        if self.fee_fails {
            return Err(ChainError::Network("fee oracle down".into()));
        }
        Ok(FeeEstimate::from_batches(
            query.batch_sizes.iter().map(|n| *n as u128 * 30_000).collect(),
            "wei",
        ))
    }
}

fn address(i: u64) -> String {
    format!("0x{i:040x}")
}

fn campaign(id: &str) -> Campaign {
    Campaign::new(id, ChainFamily::Evm, "1", None, "wallet-1")
        .with_status(CampaignStatus::Ready)
        .with_batch_size(2)
        .with_send_interval_ms(10)
}

async fn seed(store: &InMemoryStore, campaign: Campaign, recipients: u64) {
    let id = campaign.id.clone();
    store.create_campaign(&campaign).await.unwrap();
    let list: Vec<Recipient> = (0..recipients)
        .map(|i| Recipient::new(&id, address(i), "1.5", i))
        .collect();
    store.add_recipients(&id, &list).await.unwrap();
}

fn executor(
    store: Arc<InMemoryStore>,
    adapter: Arc<MockAdapter>,
    locks: ExecutionLockRegistry,
) -> Executor {
    let config = EngineConfig::default()
        .with_send_interval(Duration::from_millis(10))
        .with_submit_policy(RetryPolicy::new(3, Duration::from_millis(100)));
    Executor::builder()
        .with_store(store)
        .with_family_adapter(adapter)
        .with_locks(locks)
        .with_config(config)
        .build()
        .unwrap()
}

async fn statuses(store: &InMemoryStore, id: &str, status: RecipientStatus) -> Vec<Recipient> {
    store.list_recipients_by_status(id, status).await.unwrap()
}

// ==================== Run Tests ====================

#[tokio::test(start_paused = true)]
async fn test_run_completes_every_batch() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 5).await;
    let adapter = Arc::new(MockAdapter::evm());
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());
    let mut events = executor.subscribe();

    let summary = executor.run("c1").await.unwrap();

    assert_eq!(summary.status, CampaignStatus::Completed);
    assert_eq!(summary.batches_planned, 3);
    assert_eq!(summary.batches_processed, 3);
    assert_eq!(summary.counts.completed, 5);
    assert!(summary.recovery.is_empty());

    let sizes: Vec<usize> = adapter.submitted().iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    let campaign = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.completed_recipients, 5);
    assert_eq!(campaign.failed_recipients, 0);

    let completed = statuses(&store, "c1", RecipientStatus::Completed).await;
    assert!(completed.iter().all(|r| r.tx_hash.is_some()));

    let txs = store.list_transactions("c1").await.unwrap();
    assert_eq!(txs.len(), 3);
    assert!(txs
        .iter()
        .all(|tx| tx.status == TransactionStatus::Confirmed && tx.kind == TransactionKind::BatchSend));
    assert_eq!(txs[0].block_number, Some(100));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(ProgressEvent::RunStarted { batches: 3, .. })));
    assert!(matches!(
        seen.last(),
        Some(ProgressEvent::RunFinished {
            status: CampaignStatus::Completed,
            ..
        })
    ));
    assert!(!executor.is_running("c1"));
}

#[tokio::test(start_paused = true)]
async fn test_run_rejected_while_lock_held() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 2).await;
    let adapter = Arc::new(MockAdapter::evm());
    let locks = ExecutionLockRegistry::new();
    let executor = executor(store.clone(), adapter.clone(), locks.clone());

    let _held = locks.try_acquire(LockKey::Execute("c1".into())).unwrap();
    let err = executor.run("c1").await.unwrap_err();

    assert!(matches!(err, ExecutorError::AlreadyExecuting(_)));
    assert_eq!(adapter.submit_calls(), 0);
    let campaign = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_run_requires_runnable_status() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1").with_status(CampaignStatus::Created), 2).await;
    let executor = executor(store.clone(), Arc::new(MockAdapter::evm()), ExecutionLockRegistry::new());

    let err = executor.run("c1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = executor.run("missing").await.unwrap_err();
    assert!(matches!(err, ExecutorError::CampaignNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_transient_submit_error_is_retried() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 2).await;
    let adapter = Arc::new(MockAdapter::evm().with_script(vec![
        Err(ChainError::Network("connection reset".into())),
        Ok("0xretried".into()),
    ]));
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());

    let summary = executor.run("c1").await.unwrap();

    assert_eq!(summary.status, CampaignStatus::Completed);
    assert_eq!(adapter.submit_calls(), 2);
    let completed = statuses(&store, "c1", RecipientStatus::Completed).await;
    assert_eq!(completed[0].tx_hash.as_deref(), Some("0xretried"));
}

#[tokio::test(start_paused = true)]
async fn test_reverted_batch_fails_and_run_continues() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 4).await;
    let adapter = Arc::new(
        MockAdapter::evm().with_script(vec![Err(ChainError::Reverted("out of gas".into()))]),
    );
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());

    let summary = executor.run("c1").await.unwrap();

    // reverts are not retried
    assert_eq!(adapter.submit_calls(), 2);
    assert_eq!(summary.status, CampaignStatus::Completed);
    assert_eq!(summary.counts.completed, 2);
    assert_eq!(summary.counts.failed, 2);

    let failed = statuses(&store, "c1", RecipientStatus::Failed).await;
    assert_eq!(failed[0].address, address(0));
    assert!(failed[0].error.as_deref().unwrap().contains("out of gas"));
    assert!(failed[0].tx_hash.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_only_the_batch() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 3).await;
    let adapter = Arc::new(MockAdapter::evm().with_script(vec![
        Err(ChainError::RateLimited("429".into())),
        Err(ChainError::RateLimited("429".into())),
        Err(ChainError::RateLimited("429".into())),
    ]));
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());

    let summary = executor.run("c1").await.unwrap();

    assert_eq!(adapter.submit_calls(), 4);
    assert_eq!(summary.counts.failed, 2);
    assert_eq!(summary.counts.completed, 1);
    assert_eq!(summary.status, CampaignStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_timeout_fails_recipients() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 2).await;
    let adapter = Arc::new(MockAdapter::evm().with_status(TxStatusReport::pending()));
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());

    let summary = executor.run("c1").await.unwrap();

    assert_eq!(summary.counts.failed, 2);
    assert_eq!(summary.status, CampaignStatus::Completed);
    let failed = statuses(&store, "c1", RecipientStatus::Failed).await;
    assert!(failed[0].error.as_deref().unwrap().contains("confirmation timeout"));
    assert_eq!(failed[0].tx_hash.as_deref(), Some("0xtx1"));

    // the transaction may still land, so it is left pending
    let tx = store.get_transaction("0xtx1").await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_failed_transaction_fails_recipients() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 2).await;
    let adapter =
        Arc::new(MockAdapter::evm().with_status(TxStatusReport::failed(Some(42), Some(90_000))));
    let executor = executor(store.clone(), adapter, ExecutionLockRegistry::new());

    let summary = executor.run("c1").await.unwrap();

    assert_eq!(summary.counts.failed, 2);
    let tx = store.get_transaction("0xtx1").await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(tx.gas_used, Some(90_000));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_address_aborts_run() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 2).await;
    store
        .add_recipients("c1", &[Recipient::new("c1", "not-an-address", "1", 2)])
        .await
        .unwrap();
    let adapter = Arc::new(MockAdapter::evm());
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());

    let err = executor.run("c1").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(adapter.submit_calls(), 0);
    let campaign = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Failed);
    assert_eq!(statuses(&store, "c1", RecipientStatus::Pending).await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_adapter_rejecting_batch_aborts_run() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 4).await;
    let adapter = Arc::new(
        MockAdapter::evm().with_script(vec![Err(ChainError::InvalidInput("bad amount".into()))]),
    );
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());

    let err = executor.run("c1").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(adapter.submit_calls(), 1);
    let campaign = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Failed);
    assert_eq!(campaign.failed_recipients, 2);
    assert_eq!(statuses(&store, "c1", RecipientStatus::Pending).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_contract_is_configuration_error() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 2).await;
    let adapter = Arc::new(MockAdapter::evm().requiring_contract());
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());

    let err = executor.run("c1").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(adapter.submit_calls(), 0);
    let campaign = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_fee_estimate_failure_is_not_fatal() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 2).await;
    let adapter = Arc::new(MockAdapter::evm().with_failing_fees());
    let executor = executor(store.clone(), adapter, ExecutionLockRegistry::new());

    let summary = executor.run("c1").await.unwrap();
    assert_eq!(summary.status, CampaignStatus::Completed);
}

// ==================== Control Tests ====================

#[tokio::test(start_paused = true)]
async fn test_pause_then_resume() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 6).await;
    let locks = ExecutionLockRegistry::new();
    let pauser = locks.clone();
    let adapter = Arc::new(MockAdapter::evm().on_submit(move |call| {
        if call == 1 {
            pauser.pause("c1");
        }
    }));
    let executor = executor(store.clone(), adapter.clone(), locks);

    let summary = executor.run("c1").await.unwrap();

    // the in-flight batch finishes before the pause takes effect
    assert_eq!(summary.status, CampaignStatus::Paused);
    assert_eq!(summary.batches_processed, 1);
    assert_eq!(summary.counts.completed, 2);
    assert_eq!(summary.counts.pending, 4);
    assert_eq!(summary.counts.processing, 0);

    executor.resume("c1");
    let summary = executor.run("c1").await.unwrap();

    assert_eq!(summary.status, CampaignStatus::Completed);
    assert_eq!(summary.counts.completed, 6);
    // nobody was sent twice
    let sent: usize = adapter.submitted().iter().map(|b| b.len()).sum();
    assert_eq!(sent, 6);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_fails_campaign() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 6).await;
    let locks = ExecutionLockRegistry::new();
    let canceller = locks.clone();
    let adapter = Arc::new(MockAdapter::evm().on_submit(move |_| canceller.cancel("c1")));
    let executor = executor(store.clone(), adapter, locks.clone());

    let summary = executor.run("c1").await.unwrap();

    assert_eq!(summary.status, CampaignStatus::Failed);
    assert_eq!(summary.counts.completed, 2);
    assert_eq!(summary.counts.pending, 4);
    assert!(locks.signal("c1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_spawned_run_holds_lock() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1"), 4).await;
    let executor = Arc::new(executor(
        store.clone(),
        Arc::new(MockAdapter::evm()),
        ExecutionLockRegistry::new(),
    ));

    let handle = executor.spawn_run("c1");
    tokio::task::yield_now().await;
    assert!(executor.is_running("c1"));
    assert!(matches!(
        executor.run("c1").await,
        Err(ExecutorError::AlreadyExecuting(_))
    ));

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.status, CampaignStatus::Completed);
}

// ==================== Recovery Tests ====================

#[tokio::test(start_paused = true)]
async fn test_run_reconciles_processing_recipients() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1").with_status(CampaignStatus::Paused), 4).await;

    // a previous run broadcast one batch and died before marking the next
    store
        .record_transaction(&payout_types::TransactionRecord::pending(
            "0xold",
            "c1",
            TransactionKind::BatchSend,
            2,
        ))
        .await
        .unwrap();
    for i in 0..2 {
        store
            .update_recipient_status("c1", &address(i), RecipientStatus::Processing, Some("0xold"), None)
            .await
            .unwrap();
    }
    store
        .update_recipient_status("c1", &address(2), RecipientStatus::Processing, None, None)
        .await
        .unwrap();

    let adapter = Arc::new(MockAdapter::evm());
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());

    let summary = executor.run("c1").await.unwrap();

    assert_eq!(summary.recovery.completed, 2);
    assert_eq!(summary.recovery.requeued, 1);
    assert_eq!(summary.recovery.transactions, 1);
    assert_eq!(summary.status, CampaignStatus::Completed);
    assert_eq!(summary.counts.completed, 4);

    // only the two never-confirmed recipients were sent again
    let sent: Vec<String> = adapter
        .submitted()
        .iter()
        .flat_map(|b| b.transfers.iter().map(|t| t.address.clone()))
        .collect();
    assert_eq!(sent, vec![address(2), address(3)]);

    let old = store.get_transaction("0xold").await.unwrap().unwrap();
    assert_eq!(old.status, TransactionStatus::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_recover_interrupted_pauses_sending_campaigns() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1").with_status(CampaignStatus::Sending), 1).await;
    seed(&store, campaign("c2"), 1).await;
    let executor = executor(store.clone(), Arc::new(MockAdapter::evm()), ExecutionLockRegistry::new());

    let paused = executor.recover_all().await.unwrap();

    assert_eq!(paused, vec!["c1".to_string()]);
    let c1 = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(c1.status, CampaignStatus::Paused);
    assert_eq!(
        executor.recover_interrupted("c2").await.unwrap(),
        CampaignStatus::Ready
    );
}

// ==================== Deploy Tests ====================

fn receipt() -> DeployReceipt {
    DeployReceipt {
        contract_address: "0x00000000000000000000000000000000000000aa".into(),
        tx_hash: "0xdeploy".into(),
        block_number: 7,
        gas_used: 1_200_000,
    }
}

#[tokio::test(start_paused = true)]
async fn test_deploy_moves_campaign_to_ready() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1").with_status(CampaignStatus::Created), 2).await;
    let adapter = Arc::new(MockAdapter::evm().requiring_contract().with_deploy(Ok(receipt())));
    let executor = executor(store.clone(), adapter, ExecutionLockRegistry::new());

    let outcome = executor.deploy_contract("c1").await.unwrap();

    assert_eq!(outcome, DeployOutcome::Deployed(receipt()));
    let campaign = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Ready);
    assert_eq!(campaign.contract_ref.as_deref(), Some(receipt().contract_address.as_str()));

    let tx = store.get_transaction("0xdeploy").await.unwrap().unwrap();
    assert_eq!(tx.kind, TransactionKind::DeployContract);
    assert_eq!(tx.status, TransactionStatus::Confirmed);

    let err = executor.deploy_contract("c1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test(start_paused = true)]
async fn test_deploy_not_required_for_direct_send() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1").with_status(CampaignStatus::Created), 1).await;
    let executor = executor(store.clone(), Arc::new(MockAdapter::evm()), ExecutionLockRegistry::new());

    assert_eq!(
        executor.deploy_contract("c1").await.unwrap(),
        DeployOutcome::NotRequired
    );
    let campaign = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Ready);
    assert!(campaign.contract_ref.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_deploy_leaves_campaign_created() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1").with_status(CampaignStatus::Created), 1).await;
    let adapter = Arc::new(
        MockAdapter::evm()
            .requiring_contract()
            .with_deploy(Err(ChainError::InsufficientFunds("0 wei".into()))),
    );
    let executor = executor(store.clone(), adapter, ExecutionLockRegistry::new());

    let err = executor.deploy_contract("c1").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ChainState);
    let campaign = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Created);
    assert!(store.list_transactions("c1").await.unwrap().is_empty());
}

fn unconfirmed_deploy() -> ChainError {
    ChainError::Unconfirmed {
        tx_hash: "0xdeploy".into(),
        message: "not mined within 300s".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_deploy_is_recorded_pending() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1").with_status(CampaignStatus::Created), 1).await;
    let adapter = Arc::new(
        MockAdapter::evm()
            .requiring_contract()
            .with_deploy(Err(unconfirmed_deploy())),
    );
    adapter.set_deployment_status(Ok(None));
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());

    let err = executor.deploy_contract("c1").await.unwrap_err();
    assert!(matches!(
        &err,
        ExecutorError::DeploymentPending { tx_hash, .. } if tx_hash == "0xdeploy"
    ));
    assert_eq!(err.kind(), ErrorKind::ConfirmationTimeout);

    let campaign = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Created);
    let tx = store.get_transaction("0xdeploy").await.unwrap().unwrap();
    assert_eq!(tx.kind, TransactionKind::DeployContract);
    assert_eq!(tx.status, TransactionStatus::Pending);

    // still unmined: no second deployment goes out
    assert!(matches!(
        executor.deploy_contract("c1").await,
        Err(ExecutorError::DeploymentPending { .. })
    ));
    assert_eq!(adapter.deploy_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_redeploy_adopts_mined_pending_deployment() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1").with_status(CampaignStatus::Created), 1).await;
    let adapter = Arc::new(
        MockAdapter::evm()
            .requiring_contract()
            .with_deploy(Err(unconfirmed_deploy())),
    );
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());
    assert!(executor.deploy_contract("c1").await.is_err());

    adapter.set_deployment_status(Ok(Some(receipt())));
    let outcome = executor.deploy_contract("c1").await.unwrap();

    assert_eq!(outcome, DeployOutcome::Deployed(receipt()));
    assert_eq!(adapter.deploy_calls(), 1);
    let campaign = store.load_campaign("c1").await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Ready);
    assert_eq!(campaign.contract_ref.as_deref(), Some(receipt().contract_address.as_str()));
    let tx = store.get_transaction("0xdeploy").await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_reverted_pending_deployment_allows_fresh_deploy() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1").with_status(CampaignStatus::Created), 1).await;
    let adapter = Arc::new(
        MockAdapter::evm()
            .requiring_contract()
            .with_deploy(Err(unconfirmed_deploy())),
    );
    let executor = executor(store.clone(), adapter.clone(), ExecutionLockRegistry::new());
    assert!(executor.deploy_contract("c1").await.is_err());

    adapter.set_deployment_status(Err(ChainError::Reverted("out of gas".into())));
    let fresh = DeployReceipt {
        tx_hash: "0xdeploy2".into(),
        ..receipt()
    };
    adapter.set_deploy(Ok(fresh.clone()));

    assert_eq!(
        executor.deploy_contract("c1").await.unwrap(),
        DeployOutcome::Deployed(fresh)
    );
    assert_eq!(adapter.deploy_calls(), 2);
    let first = store.get_transaction("0xdeploy").await.unwrap().unwrap();
    assert_eq!(first.status, TransactionStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_deploy_blocked_by_running_campaign() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, campaign("c1").with_status(CampaignStatus::Created), 1).await;
    let locks = ExecutionLockRegistry::new();
    let executor = executor(store, Arc::new(MockAdapter::evm()), locks.clone());

    let _running = locks.try_acquire(LockKey::Execute("c1".into())).unwrap();
    assert!(matches!(
        executor.deploy_contract("c1").await,
        Err(ExecutorError::AlreadyExecuting(_))
    ));
}
