use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use payout_chain::{
    ChainAdapter, ChainError, DeployRequest, EvmAdapter, EvmBatchCall, EvmDeployCall, EvmSigner,
    JsonRpcClient, SignedEvmTransaction, SolanaAdapter, SolanaSigner, SolanaTransferMessage,
    TransferBatch,
};
use payout_retry::RetryPolicy;
use payout_types::{ChainFamily, Transfer};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

const CLIENT_TIMEOUT: Duration = Duration::from_millis(200);
const FIRST_REPLY_DELAY: Duration = Duration::from_millis(600);
const LAST_VALID_BLOCK_HEIGHT: u64 = 150;

// ═══════════════════════════════════════════════════════════════════════════
// LOCAL JSON-RPC NODE
// ═══════════════════════════════════════════════════════════════════════════

/// Node that accepts the first broadcast but replies only after the client
/// has given up on it
struct SlowNode {
    family: ChainFamily,
    accepted: Mutex<Vec<String>>,
    broadcasts: AtomicUsize,
    blockhashes: AtomicUsize,
    block_height: AtomicU64,
    /// Whether accepted Solana transactions show up in signature lookups
    lands: AtomicBool,
    slow_first_reply: AtomicBool,
    receipt_reads: AtomicUsize,
    /// EVM receipts are returned from this read onwards
    mined_from_read: AtomicUsize,
}

impl SlowNode {
    async fn start(family: ChainFamily) -> (Arc<Self>, String) {
        let node = Arc::new(Self {
            family,
            accepted: Mutex::new(Vec::new()),
            broadcasts: AtomicUsize::new(0),
            blockhashes: AtomicUsize::new(0),
            block_height: AtomicU64::new(100),
            lands: AtomicBool::new(true),
            slow_first_reply: AtomicBool::new(true),
            receipt_reads: AtomicUsize::new(0),
            mined_from_read: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/", post(handle))
            .with_state(Arc::clone(&node));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        (node, url)
    }

    fn accepted(&self) -> usize {
        self.accepted.lock().unwrap().len()
    }

    fn tx_id(&self, raw: &str) -> String {
        match self.family {
            ChainFamily::Evm => evm_hash(&hex::decode(raw.trim_start_matches("0x")).unwrap()),
            ChainFamily::Solana => solana_signature(&STANDARD.decode(raw).unwrap()),
        }
    }
}

fn reply(id: &Value, result: Value) -> Json<Value> {
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

fn reply_error(id: &Value, code: i64, message: &str) -> Json<Value> {
    Json(json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}))
}

async fn handle(State(node): State<Arc<SlowNode>>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    let params = &request["params"];

    match request["method"].as_str().unwrap_or_default() {
        "eth_getTransactionCount" => reply(&id, json!(format!("0x{:x}", node.accepted()))),
        "eth_gasPrice" => reply(&id, json!("0x3b9aca00")),
        "eth_getTransactionReceipt" => {
            let read = node.receipt_reads.fetch_add(1, Ordering::SeqCst);
            if read == 0 {
                return reply_error(&id, -32603, "internal error");
            }
            if read < node.mined_from_read.load(Ordering::SeqCst) {
                return reply(&id, Value::Null);
            }
            reply(
                &id,
                json!({
                    "status": "0x1",
                    "blockNumber": "0x20",
                    "gasUsed": "0x1e8480",
                    "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3"
                }),
            )
        }
        "getLatestBlockhash" => {
            let n = node.blockhashes.fetch_add(1, Ordering::SeqCst);
            reply(
                &id,
                json!({
                    "context": {"slot": 1},
                    "value": {
                        "blockhash": format!("blockhash-{n}"),
                        "lastValidBlockHeight": LAST_VALID_BLOCK_HEIGHT
                    }
                }),
            )
        }
        "getBlockHeight" => reply(&id, json!(node.block_height.load(Ordering::SeqCst))),
        "getSignatureStatuses" => {
            let signature = params[0][0].as_str().unwrap_or_default().to_string();
            let landed = node.lands.load(Ordering::SeqCst)
                && node
                    .accepted
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|raw| node.tx_id(raw) == signature);
            let status = if landed {
                json!({"slot": 90, "err": null, "confirmationStatus": "confirmed"})
            } else {
                Value::Null
            };
            reply(&id, json!({"context": {"slot": 1}, "value": [status]}))
        }
        "eth_sendRawTransaction" | "sendTransaction" => {
            let raw = params[0].as_str().unwrap_or_default().to_string();
            node.broadcasts.fetch_add(1, Ordering::SeqCst);

            let (known, first) = {
                let mut accepted = node.accepted.lock().unwrap();
                let known = accepted.contains(&raw);
                if !known {
                    accepted.push(raw.clone());
                }
                (known, !known && accepted.len() == 1)
            };

            if known {
                return match node.family {
                    ChainFamily::Evm => reply_error(&id, -32000, "already known"),
                    ChainFamily::Solana => reply_error(
                        &id,
                        -32002,
                        "Transaction simulation failed: This transaction has already been processed",
                    ),
                };
            }
            if first && node.slow_first_reply.load(Ordering::SeqCst) {
                tokio::time::sleep(FIRST_REPLY_DELAY).await;
            }
            reply(&id, json!(node.tx_id(&raw)))
        }
        other => reply_error(&id, -32601, &format!("method {other} not found")),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SIGNERS
// ═══════════════════════════════════════════════════════════════════════════

fn evm_hash(raw: &[u8]) -> String {
    format!("0x{:0>64}", hex::encode(raw))
}

fn solana_signature(raw: &[u8]) -> String {
    bs58::encode(&raw[1..65]).into_string()
}

#[derive(Default)]
struct RecordingSigner {
    nonces: Mutex<Vec<u64>>,
    blockhashes: Mutex<Vec<String>>,
}

#[async_trait]
impl EvmSigner for RecordingSigner {
    async fn address(&self, _wallet_ref: &str) -> Result<String, ChainError> {
        Ok("0x52908400098527886E0F7030069857D2E4169EE7".to_string())
    }

    async fn sign_batch(
        &self,
        _wallet_ref: &str,
        call: &EvmBatchCall,
    ) -> Result<SignedEvmTransaction, ChainError> {
        self.nonces.lock().unwrap().push(call.nonce);
        let raw = format!("batch:{}:{}", call.nonce, call.transfers.len()).into_bytes();
        Ok(SignedEvmTransaction {
            tx_hash: evm_hash(&raw),
            raw,
        })
    }

    async fn sign_deploy(
        &self,
        _wallet_ref: &str,
        call: &EvmDeployCall,
    ) -> Result<SignedEvmTransaction, ChainError> {
        self.nonces.lock().unwrap().push(call.nonce);
        let raw = format!("deploy:{}", call.nonce).into_bytes();
        Ok(SignedEvmTransaction {
            tx_hash: evm_hash(&raw),
            raw,
        })
    }
}

#[async_trait]
impl SolanaSigner for RecordingSigner {
    async fn pubkey(&self, _wallet_ref: &str) -> Result<String, ChainError> {
        Ok("11111111111111111111111111111111".to_string())
    }

    async fn sign_transfer(
        &self,
        _wallet_ref: &str,
        message: &SolanaTransferMessage,
    ) -> Result<Vec<u8>, ChainError> {
        self.blockhashes
            .lock()
            .unwrap()
            .push(message.recent_blockhash.clone());

        let mut signature = [0u8; 64];
        for (slot, byte) in signature.iter_mut().zip(message.recent_blockhash.bytes()) {
            *slot = byte;
        }
        let mut raw = vec![1u8];
        raw.extend_from_slice(&signature);
        raw.extend_from_slice(format!("transfers:{}", message.transfers.len()).as_bytes());
        Ok(raw)
    }
}

fn batch(addresses: &[&str], contract: Option<&str>) -> TransferBatch {
    TransferBatch {
        campaign_id: "airdrop-1".into(),
        chain_key: "1".into(),
        token: None,
        contract: contract.map(str::to_string),
        wallet_ref: "hot-wallet".into(),
        transfers: addresses
            .iter()
            .map(|address| Transfer {
                address: address.to_string(),
                amount: "1.5".into(),
            })
            .collect(),
    }
}

fn evm_batch() -> TransferBatch {
    batch(
        &[
            "0xde709f2102306220921060314715629080e2fb77",
            "0x27b1fdb04752bbc536007a920d24acb045561c26",
        ],
        Some("0x5fbdb2315678afecb367f032d93f642f64180aa3"),
    )
}

fn solana_batch() -> TransferBatch {
    batch(
        &[
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
        ],
        None,
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// EVM
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_evm_retry_after_lost_reply_rebroadcasts_same_transaction() {
    let (node, url) = SlowNode::start(ChainFamily::Evm).await;
    let signer = Arc::new(RecordingSigner::default());
    let adapter = EvmAdapter::new(
        JsonRpcClient::new(&url, CLIENT_TIMEOUT).unwrap(),
        signer.clone(),
        1,
    );
    let batch = evm_batch();

    let tx_hash = RetryPolicy::new(3, Duration::from_millis(10))
        .execute_classified(|| adapter.submit_batch(&batch))
        .await
        .unwrap();

    assert_eq!(tx_hash, evm_hash(b"batch:0:2"));
    assert_eq!(*signer.nonces.lock().unwrap(), vec![0]);
    assert_eq!(node.accepted(), 1);
    assert_eq!(node.broadcasts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_evm_next_batch_signs_fresh_after_acknowledged_broadcast() {
    let (node, url) = SlowNode::start(ChainFamily::Evm).await;
    let signer = Arc::new(RecordingSigner::default());
    let adapter = EvmAdapter::new(
        JsonRpcClient::new(&url, Duration::from_secs(2)).unwrap(),
        signer.clone(),
        1,
    );

    let first = adapter.submit_batch(&evm_batch()).await.unwrap();
    let second = adapter
        .submit_batch(&batch(
            &["0x52908400098527886E0F7030069857D2E4169EE7"],
            Some("0x5fbdb2315678afecb367f032d93f642f64180aa3"),
        ))
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(*signer.nonces.lock().unwrap(), vec![0, 1]);
    assert_eq!(node.accepted(), 2);
}

fn deploy_request() -> DeployRequest {
    DeployRequest {
        campaign_id: "airdrop-1".into(),
        chain_key: "1".into(),
        token: None,
        wallet_ref: "hot-wallet".into(),
    }
}

async fn deploy_adapter() -> (Arc<SlowNode>, EvmAdapter) {
    let (node, url) = SlowNode::start(ChainFamily::Evm).await;
    node.slow_first_reply.store(false, Ordering::SeqCst);
    let adapter = EvmAdapter::new(
        JsonRpcClient::new(&url, Duration::from_secs(2)).unwrap(),
        Arc::new(RecordingSigner::default()),
        1,
    );
    (node, adapter)
}

#[tokio::test]
async fn test_deploy_survives_transient_receipt_failure() {
    let (node, adapter) = deploy_adapter().await;
    let adapter = adapter.with_deploy_timeout(Duration::from_secs(5), Duration::from_millis(20));

    let receipt = adapter.deploy_contract(&deploy_request()).await.unwrap();

    assert_eq!(receipt.tx_hash, evm_hash(b"deploy:0"));
    assert_eq!(receipt.contract_address, "0x5fbdb2315678afecb367f032d93f642f64180aa3");
    assert_eq!(receipt.block_number, 32);
    assert_eq!(node.receipt_reads.load(Ordering::SeqCst), 2);
    assert_eq!(node.accepted(), 1);
}

#[tokio::test]
async fn test_deploy_past_deadline_reports_transaction_hash() {
    let (node, adapter) = deploy_adapter().await;
    node.mined_from_read.store(usize::MAX, Ordering::SeqCst);
    let adapter = adapter.with_deploy_timeout(Duration::from_millis(100), Duration::from_millis(20));

    let err = adapter.deploy_contract(&deploy_request()).await.unwrap_err();

    match err {
        ChainError::Unconfirmed { tx_hash, .. } => assert_eq!(tx_hash, evm_hash(b"deploy:0")),
        other => panic!("expected unconfirmed deployment, got {other:?}"),
    }
    assert_eq!(
        adapter.deployment_status(&evm_hash(b"deploy:0")).await.unwrap(),
        None
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// SOLANA
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_solana_retry_within_blockhash_validity_resends_same_bytes() {
    let (node, url) = SlowNode::start(ChainFamily::Solana).await;
    let signer = Arc::new(RecordingSigner::default());
    let adapter = SolanaAdapter::new(JsonRpcClient::new(&url, CLIENT_TIMEOUT).unwrap(), signer.clone());
    let batch = solana_batch();

    let signature = RetryPolicy::new(3, Duration::from_millis(10))
        .execute_classified(|| adapter.submit_batch(&batch))
        .await
        .unwrap();

    assert_eq!(*signer.blockhashes.lock().unwrap(), vec!["blockhash-0"]);
    assert_eq!(node.accepted(), 1);
    assert_eq!(node.broadcasts.load(Ordering::SeqCst), 2);
    assert_eq!(signature, node.tx_id(&node.accepted.lock().unwrap()[0]));
}

#[tokio::test]
async fn test_solana_expired_blockhash_reports_landed_transaction() {
    let (node, url) = SlowNode::start(ChainFamily::Solana).await;
    let signer = Arc::new(RecordingSigner::default());
    let adapter = SolanaAdapter::new(JsonRpcClient::new(&url, CLIENT_TIMEOUT).unwrap(), signer.clone());
    let batch = solana_batch();

    let err = adapter.submit_batch(&batch).await.unwrap_err();
    assert!(matches!(err, ChainError::Timeout(_)), "got {err:?}");

    node.block_height.store(LAST_VALID_BLOCK_HEIGHT + 1, Ordering::SeqCst);
    let signature = adapter.submit_batch(&batch).await.unwrap();

    assert_eq!(signer.blockhashes.lock().unwrap().len(), 1);
    assert_eq!(node.broadcasts.load(Ordering::SeqCst), 1);
    assert_eq!(signature, node.tx_id(&node.accepted.lock().unwrap()[0]));
}

#[tokio::test]
async fn test_solana_expired_unseen_transaction_is_signed_again() {
    let (node, url) = SlowNode::start(ChainFamily::Solana).await;
    node.lands.store(false, Ordering::SeqCst);
    let signer = Arc::new(RecordingSigner::default());
    let adapter = SolanaAdapter::new(JsonRpcClient::new(&url, CLIENT_TIMEOUT).unwrap(), signer.clone());
    let batch = solana_batch();

    assert!(adapter.submit_batch(&batch).await.is_err());

    node.block_height.store(LAST_VALID_BLOCK_HEIGHT + 1, Ordering::SeqCst);
    let signature = adapter.submit_batch(&batch).await.unwrap();

    assert_eq!(
        *signer.blockhashes.lock().unwrap(),
        vec!["blockhash-0", "blockhash-1"]
    );
    assert_eq!(signature, node.tx_id(&node.accepted.lock().unwrap()[1]));
}
