//! In-memory mock collaborators shared by the executor's unit tests

use crate::context::{ExecutorConfig, ExecutorDeps, StepFlags, TaskEnv};
use crate::interfaces::{
    BatchStatus, BridgeStatusService, QuoteService, ReceivingStatus, RelayedTaskStatus,
    RelayerService, RpcEndpoint, RpcProvider, TransactionBuilder, WalletClient,
};
use async_trait::async_trait;
use crossflow_confirm::{PollingBackoff, RaceConfig};
use crossflow_status::StatusManager;
use crossflow_types::{
    Chain, ChainId, EngineError, Estimate, ReceiptStatus, Route, SignedTypedData, Step, Token,
    TransactionReceipt, TransactionRequest, TypedDataEnvelope,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) struct MockWallet {
    address: Mutex<String>,
    chain: Mutex<ChainId>,
    supports_batch: AtomicBool,
    reject_batch: AtomicBool,
    reject_signature: AtomicBool,
    sign_delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<TransactionRequest>>,
    batches: Mutex<Vec<Vec<TransactionRequest>>>,
    signatures: AtomicU32,
    tx_counter: AtomicU32,
    batch_counter: AtomicU32,
}

impl MockWallet {
    pub(crate) fn new(address: &str, chain: ChainId) -> Self {
        Self {
            address: Mutex::new(address.to_string()),
            chain: Mutex::new(chain),
            supports_batch: AtomicBool::new(false),
            reject_batch: AtomicBool::new(false),
            reject_signature: AtomicBool::new(false),
            sign_delay: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            signatures: AtomicU32::new(0),
            tx_counter: AtomicU32::new(0),
            batch_counter: AtomicU32::new(0),
        }
    }

    pub(crate) fn set_address(&self, address: &str) {
        *self.address.lock().unwrap() = address.to_string();
    }

    pub(crate) fn set_chain(&self, chain: ChainId) {
        *self.chain.lock().unwrap() = chain;
    }

    pub(crate) fn current_chain(&self) -> ChainId {
        *self.chain.lock().unwrap()
    }

    pub(crate) fn set_supports_batch(&self, supported: bool) {
        self.supports_batch.store(supported, Ordering::SeqCst);
    }

    pub(crate) fn set_reject_batch(&self, reject: bool) {
        self.reject_batch.store(reject, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub(crate) fn set_reject_signature(&self, reject: bool) {
        self.reject_signature.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn set_sign_delay(&self, delay: Duration) {
        *self.sign_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_batches(&self) -> Vec<Vec<TransactionRequest>> {
        self.batches.lock().unwrap().clone()
    }

    pub(crate) fn signature_count(&self) -> u32 {
        self.signatures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletClient for MockWallet {
    async fn address(&self) -> Result<String, EngineError> {
        Ok(self.address.lock().unwrap().clone())
    }

    async fn chain_id(&self) -> Result<ChainId, EngineError> {
        Ok(*self.chain.lock().unwrap())
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), EngineError> {
        *self.chain.lock().unwrap() = chain_id;
        Ok(())
    }

    async fn sign_typed_data(&self, _envelope: &TypedDataEnvelope) -> Result<String, EngineError> {
        let delay = *self.sign_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject_signature.load(Ordering::SeqCst) {
            return Err(EngineError::Rpc(
                "user denied message signature".to_string(),
            ));
        }
        let n = self.signatures.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xsig{n}"))
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> Result<String, EngineError> {
        self.sent.lock().unwrap().push(request.clone());
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xtx{n}"))
    }

    async fn send_batch(&self, calls: &[TransactionRequest]) -> Result<String, EngineError> {
        self.batches.lock().unwrap().push(calls.to_vec());
        if self.reject_batch.load(Ordering::SeqCst) {
            return Err(EngineError::Rpc(
                "user rejected wallet_sendCalls request".to_string(),
            ));
        }
        let n = self.batch_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("batch-{n}"))
    }

    async fn supports_atomic_batch(&self, _chain_id: ChainId) -> Result<bool, EngineError> {
        Ok(self.supports_batch.load(Ordering::SeqCst))
    }
}

pub(crate) struct MockEndpoint {
    url: String,
    allowance: Mutex<u128>,
    revert: AtomicBool,
}

impl MockEndpoint {
    pub(crate) fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            allowance: Mutex::new(0),
            revert: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_allowance(&self, allowance: u128) {
        *self.allowance.lock().unwrap() = allowance;
    }

    pub(crate) fn set_revert(&self, revert: bool) {
        self.revert.store(revert, Ordering::SeqCst);
    }
}

#[async_trait]
impl RpcEndpoint for MockEndpoint {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_allowance(
        &self,
        _chain_id: ChainId,
        _token: &str,
        _owner: &str,
        _spender: &str,
    ) -> Result<u128, EngineError> {
        Ok(*self.allowance.lock().unwrap())
    }

    async fn get_balance(
        &self,
        _chain_id: ChainId,
        _token: &str,
        _owner: &str,
    ) -> Result<u128, EngineError> {
        Ok(u64::MAX as u128)
    }

    async fn get_transaction_receipt(
        &self,
        _chain_id: ChainId,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, EngineError> {
        let status = if self.revert.load(Ordering::SeqCst) {
            ReceiptStatus::Reverted
        } else {
            ReceiptStatus::Success
        };
        Ok(Some(TransactionReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: 1,
            status,
        }))
    }

    async fn get_batch_status(
        &self,
        _chain_id: ChainId,
        batch_id: &str,
    ) -> Result<BatchStatus, EngineError> {
        if self.revert.load(Ordering::SeqCst) {
            return Ok(BatchStatus::Failed("batch reverted".to_string()));
        }
        Ok(BatchStatus::Confirmed {
            tx_hash: format!("{batch_id}:tx"),
        })
    }
}

pub(crate) struct MockProvider {
    endpoints: Vec<Arc<MockEndpoint>>,
}

impl RpcProvider for MockProvider {
    fn endpoints(&self, _chain_id: ChainId) -> Result<Vec<Arc<dyn RpcEndpoint>>, EngineError> {
        Ok(self
            .endpoints
            .iter()
            .map(|e| e.clone() as Arc<dyn RpcEndpoint>)
            .collect())
    }
}

pub(crate) struct MockQuotes {
    rate_drop: AtomicBool,
}

impl MockQuotes {
    pub(crate) fn new() -> Self {
        Self {
            rate_drop: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_rate_drop(&self, drop: bool) {
        self.rate_drop.store(drop, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuoteService for MockQuotes {
    async fn refresh_step_transaction(&self, step: &Step) -> Result<Step, EngineError> {
        let mut refreshed = step.clone();
        refreshed.transaction_request = Some(TransactionRequest {
            chain_id: step.from_chain_id,
            to: "0xrouter".to_string(),
            data: "0xswapdata".to_string(),
            value: 0,
            gas_limit: Some(300_000),
            gas_price: None,
        });
        if self.rate_drop.load(Ordering::SeqCst) {
            refreshed.estimate.to_amount_min = step.estimate.to_amount_min.saturating_sub(1);
        }
        Ok(refreshed)
    }
}

pub(crate) struct MockRelayer {
    execute_after: AtomicU32,
    polls: AtomicU32,
    cancelled: AtomicBool,
    submissions: Mutex<Vec<SignedTypedData>>,
}

impl MockRelayer {
    pub(crate) fn new() -> Self {
        Self {
            execute_after: AtomicU32::new(0),
            polls: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_execute_after(&self, polls: u32) {
        self.execute_after.store(polls, Ordering::SeqCst);
    }

    pub(crate) fn set_cancelled(&self, cancelled: bool) {
        self.cancelled.store(cancelled, Ordering::SeqCst);
    }
}

#[async_trait]
impl RelayerService for MockRelayer {
    async fn submit(
        &self,
        _chain_id: ChainId,
        order: &SignedTypedData,
    ) -> Result<String, EngineError> {
        self.submissions.lock().unwrap().push(order.clone());
        Ok("task-1".to_string())
    }

    async fn task_status(&self, _task_id: &str) -> Result<RelayedTaskStatus, EngineError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Ok(RelayedTaskStatus::Cancelled(
                "order replaced on chain".to_string(),
            ));
        }
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        if poll >= self.execute_after.load(Ordering::SeqCst) {
            Ok(RelayedTaskStatus::Executed {
                tx_hash: "0xrelayed".to_string(),
            })
        } else {
            Ok(RelayedTaskStatus::Pending)
        }
    }
}

pub(crate) struct MockBridge {
    done_after: AtomicU32,
    polls: AtomicU32,
    failed: AtomicBool,
}

impl MockBridge {
    pub(crate) fn new() -> Self {
        Self {
            done_after: AtomicU32::new(0),
            polls: AtomicU32::new(0),
            failed: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_done_after(&self, polls: u32) {
        self.done_after.store(polls, Ordering::SeqCst);
    }

    pub(crate) fn set_failed(&self, failed: bool) {
        self.failed.store(failed, Ordering::SeqCst);
    }
}

#[async_trait]
impl BridgeStatusService for MockBridge {
    async fn receiving_status(
        &self,
        _step: &Step,
        _source_tx_hash: &str,
    ) -> Result<ReceivingStatus, EngineError> {
        if self.failed.load(Ordering::SeqCst) {
            return Ok(ReceivingStatus::Failed("transfer refunded".to_string()));
        }
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        if poll >= self.done_after.load(Ordering::SeqCst) {
            Ok(ReceivingStatus::Done {
                tx_hash: "0xdest".to_string(),
                tx_link: None,
            })
        } else {
            Ok(ReceivingStatus::Pending)
        }
    }
}

pub(crate) struct MockBuilder;

impl TransactionBuilder for MockBuilder {
    fn build_approval(
        &self,
        token: &Token,
        _owner: &str,
        spender: &str,
        amount: u128,
    ) -> Result<TransactionRequest, EngineError> {
        Ok(TransactionRequest {
            chain_id: token.chain_id,
            to: token.address.clone(),
            data: format!("approve:{spender}:{amount}"),
            value: 0,
            gas_limit: None,
            gas_price: None,
        })
    }
}

pub(crate) fn make_step(id: &str, from_chain: ChainId, to_chain: ChainId) -> Step {
    Step {
        id: id.to_string(),
        from_chain_id: from_chain,
        to_chain_id: to_chain,
        from_token: Token::new(from_chain, "0x1111", "USDC", 6),
        to_token: Token::new(to_chain, "0x2222", "DAI", 18),
        from_amount: 1_000_000,
        from_address: "0xaaa".to_string(),
        to_address: "0xbbb".to_string(),
        approval_address: Some("0xrouter".to_string()),
        estimate: Estimate {
            from_amount: 1_000_000,
            to_amount: 990_000,
            to_amount_min: 980_000,
            approval_reset: false,
            gasless: false,
        },
        transaction_request: None,
        typed_data: Vec::new(),
        execution: None,
    }
}

pub(crate) fn chain_registry() -> HashMap<ChainId, Chain> {
    let mut chains = HashMap::new();
    chains.insert(
        1,
        Chain::new(1, "eth", "Ethereum").with_explorer_url("https://scan.example"),
    );
    chains.insert(
        137,
        Chain::new(137, "pol", "Polygon").with_explorer_url("https://polygonscan.example"),
    );
    chains
}

pub(crate) fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        race: RaceConfig {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
            max_endpoint_failures: 3,
        },
        receiving_backoff: PollingBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(5),
            Duration::from_millis(50),
        ),
        receiving_timeout: Duration::from_secs(10),
        relayed_poll_interval: Duration::from_millis(10),
        relayed_timeout: Duration::from_secs(10),
        signature_timeout: Duration::from_millis(100),
    }
}

/// Mocks plus a status manager holding a single-step route
pub(crate) struct TestWorld {
    pub status: Arc<StatusManager>,
    pub wallet: Arc<MockWallet>,
    pub endpoint: Arc<MockEndpoint>,
    pub quotes: Arc<MockQuotes>,
    pub relayer: Arc<MockRelayer>,
    pub bridge: Arc<MockBridge>,
    pub config: ExecutorConfig,
}

impl TestWorld {
    pub(crate) fn new(step: Step) -> Self {
        Self::with_steps(vec![step])
    }

    pub(crate) fn with_steps(steps: Vec<Step>) -> Self {
        let step = steps.first().expect("route needs at least one step").clone();
        let route = Route {
            id: "route-1".to_string(),
            from_address: step.from_address.clone(),
            to_address: step.to_address.clone(),
            steps,
        };
        Self {
            status: Arc::new(StatusManager::new(route)),
            wallet: Arc::new(MockWallet::new(&step.from_address, step.from_chain_id)),
            endpoint: Arc::new(MockEndpoint::new("https://rpc.example")),
            quotes: Arc::new(MockQuotes::new()),
            relayer: Arc::new(MockRelayer::new()),
            bridge: Arc::new(MockBridge::new()),
            config: fast_config(),
        }
    }

    pub(crate) fn deps(&self) -> ExecutorDeps {
        ExecutorDeps {
            wallet: self.wallet.clone(),
            quotes: self.quotes.clone(),
            rpc: Arc::new(MockProvider {
                endpoints: vec![self.endpoint.clone()],
            }),
            tx_builder: Arc::new(MockBuilder),
            relayer: Some(self.relayer.clone()),
            bridge_status: Some(self.bridge.clone()),
        }
    }
}

/// A test world with a ready task environment for driving tasks directly
pub(crate) struct Harness {
    pub status: Arc<StatusManager>,
    pub env: Arc<TaskEnv>,
    pub wallet: Arc<MockWallet>,
    pub endpoint: Arc<MockEndpoint>,
    pub quotes: Arc<MockQuotes>,
    pub relayer: Arc<MockRelayer>,
    pub bridge: Arc<MockBridge>,
}

impl Harness {
    pub(crate) fn set_interaction(&mut self, allow: bool) {
        let mut env = (*self.env).clone();
        env.flags.allow_user_interaction = allow;
        self.env = Arc::new(env);
    }
}

pub(crate) fn harness(step: Step) -> Harness {
    let step_id = step.id.clone();
    let world = TestWorld::new(step);
    world
        .status
        .init_execution(&step_id)
        .expect("step exists in route");

    let env = Arc::new(TaskEnv {
        status: world.status.clone(),
        deps: world.deps(),
        config: world.config.clone(),
        chains: chain_registry(),
        step_id,
        flags: StepFlags {
            allow_user_interaction: true,
            allow_chain_switch: true,
            ..StepFlags::default()
        },
    });

    Harness {
        status: world.status,
        env,
        wallet: world.wallet,
        endpoint: world.endpoint,
        quotes: world.quotes,
        relayer: world.relayer,
        bridge: world.bridge,
    }
}
