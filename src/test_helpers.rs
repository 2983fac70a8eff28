use crate::{
    activity_log::ActivityLog,
    contract::{
        ContractClient,
        EventStream,
        LotteryRpc,
        Receipt,
    },
    directory::ContractDescriptor,
    error::{
        LotteryField,
        RpcFailure,
    },
    events::{
        ContractEvent,
        EventKind,
    },
    wallet::{
        WalletConnector,
        WalletEnvironment,
        WalletProvider,
    },
};
use alloy::primitives::{
    Address,
    TxHash,
    U256,
    address,
};
use futures::StreamExt;
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::{
    mpsc,
    oneshot,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const LOTTERY_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const PLAYER_ACCOUNT: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

/// Descriptor for the lottery as a local dev chain deploys it.
pub fn lottery_descriptor() -> ContractDescriptor {
    let abi = serde_json::json!(
        lottery_abi::REQUIRED_ENTRIES
            .iter()
            .map(|name| serde_json::json!({ "type": "function", "name": name }))
            .collect::<Vec<_>>()
    );
    ContractDescriptor::new(LOTTERY_ADDRESS, abi).unwrap()
}

/// A client connected through a fake wallet. The log holds the connection line.
pub async fn connected_client(
    rpc: FakeLotteryRpc,
) -> (ContractClient<FakeLotteryRpc>, ActivityLog) {
    let log = ActivityLog::new();
    let environment = FakeWalletEnvironment::with_accounts(vec![PLAYER_ACCOUNT], rpc);
    let mut connector = WalletConnector::new(environment, log.clone());
    let wallet = connector.connect().await.unwrap();
    let client = ContractClient::new(lottery_descriptor(), &wallet, log.clone());
    (client, log)
}

/// Yields to the runtime until `condition` holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition was not reached");
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LotteryState {
    pub phase_code: u8,
    pub balance: U256,
    pub entry_fee: U256,
    pub players: U256,
    pub recent_winner: Address,
}

impl Default for LotteryState {
    fn default() -> Self {
        Self {
            phase_code: 0,
            balance: U256::ZERO,
            entry_fee: U256::from(10_000_000_000_000_000u64),
            players: U256::ZERO,
            recent_winner: Address::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct FakeChain {
    state: LotteryState,
    read_failures: HashMap<LotteryField, RpcFailure>,
    state_reads: usize,
    state_gates: VecDeque<oneshot::Receiver<()>>,
    entry_rejection: Option<RpcFailure>,
    revert_entries: bool,
    entries: Vec<U256>,
    receipts: HashMap<TxHash, Receipt>,
    subscription_refusals: HashMap<EventKind, RpcFailure>,
    listeners: Vec<(EventKind, mpsc::UnboundedSender<ContractEvent>)>,
}

/// In-memory lottery contract. Clones share one chain.
#[derive(Clone, Debug, Default)]
pub struct FakeLotteryRpc {
    chain: Arc<Mutex<FakeChain>>,
}

impl FakeLotteryRpc {
    pub fn with_state(state: LotteryState) -> Self {
        let rpc = Self::default();
        rpc.update(|current| *current = state);
        rpc
    }

    pub fn state(&self) -> LotteryState {
        self.lock().state.clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut LotteryState)) {
        f(&mut self.lock().state);
    }

    pub fn fail_read(&self, field: LotteryField, failure: RpcFailure) {
        self.lock().read_failures.insert(field, failure);
    }

    pub fn clear_failures(&self) {
        self.lock().read_failures.clear();
    }

    /// The next `getLotteryState` call blocks until the returned sender fires. Its value
    /// is captured before it blocks.
    pub fn hold_next_state_read(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().state_gates.push_back(rx);
        tx
    }

    pub fn state_reads(&self) -> usize {
        self.lock().state_reads
    }

    pub fn reject_entries(&self, failure: RpcFailure) {
        self.lock().entry_rejection = Some(failure);
    }

    pub fn revert_entries(&self) {
        self.lock().revert_entries = true;
    }

    pub fn entries(&self) -> Vec<U256> {
        self.lock().entries.clone()
    }

    pub fn refuse_subscriptions(&self, kind: EventKind, failure: RpcFailure) {
        self.lock().subscription_refusals.insert(kind, failure);
    }

    /// Delivers `event` to every open listener of its kind.
    pub fn emit(&self, event: ContractEvent) {
        let mut chain = self.lock();
        chain.listeners.retain(|(_, tx)| !tx.is_closed());
        for (kind, tx) in &chain.listeners {
            if *kind == event.kind() {
                let _ = tx.send(event.clone());
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        let mut chain = self.lock();
        chain.listeners.retain(|(_, tx)| !tx.is_closed());
        chain.listeners.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeChain> {
        self.chain.lock().unwrap()
    }

    fn read<T>(
        &self,
        field: LotteryField,
        f: impl FnOnce(&LotteryState) -> T,
    ) -> Result<T, RpcFailure> {
        let chain = self.lock();
        match chain.read_failures.get(&field) {
            Some(failure) => Err(failure.clone()),
            None => Ok(f(&chain.state)),
        }
    }
}

impl LotteryRpc for FakeLotteryRpc {
    async fn lottery_state(&self, _contract: Address) -> Result<u8, RpcFailure> {
        let (result, gate) = {
            let mut chain = self.lock();
            chain.state_reads += 1;
            let gate = chain.state_gates.pop_front();
            let result = match chain.read_failures.get(&LotteryField::Phase) {
                Some(failure) => Err(failure.clone()),
                None => Ok(chain.state.phase_code),
            };
            (result, gate)
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        result
    }

    async fn entry_fee(&self, _contract: Address) -> Result<U256, RpcFailure> {
        self.read(LotteryField::EntryFee, |state| state.entry_fee)
    }

    async fn number_of_players(&self, _contract: Address) -> Result<U256, RpcFailure> {
        self.read(LotteryField::PlayerCount, |state| state.players)
    }

    async fn recent_winner(&self, _contract: Address) -> Result<Address, RpcFailure> {
        self.read(LotteryField::RecentWinner, |state| state.recent_winner)
    }

    async fn balance(&self, _address: Address) -> Result<U256, RpcFailure> {
        self.read(LotteryField::PrizePool, |state| state.balance)
    }

    async fn enter_lottery(&self, _contract: Address, value: U256) -> Result<TxHash, RpcFailure> {
        let mut chain = self.lock();
        if let Some(failure) = chain.entry_rejection.clone() {
            return Err(failure);
        }
        chain.entries.push(value);
        let tx_hash = TxHash::with_last_byte(chain.entries.len() as u8);
        let success = !chain.revert_entries;
        if success {
            chain.state.players += U256::from(1);
            chain.state.balance += value;
        }
        let block_number = Some(chain.entries.len() as u64);
        chain.receipts.insert(
            tx_hash,
            Receipt {
                tx_hash,
                block_number,
                success,
            },
        );
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Receipt, RpcFailure> {
        self.lock()
            .receipts
            .get(&tx_hash)
            .copied()
            .ok_or_else(|| RpcFailure::new(format!("transaction {tx_hash} not found")))
    }

    async fn watch_events(
        &self,
        _contract: Address,
        kind: EventKind,
    ) -> Result<EventStream, RpcFailure> {
        let mut chain = self.lock();
        if let Some(failure) = chain.subscription_refusals.get(&kind) {
            return Err(failure.clone());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        chain.listeners.push((kind, tx));
        Ok(UnboundedReceiverStream::new(rx).map(Ok::<_, RpcFailure>).boxed())
    }
}

/// A wallet environment whose provider, if any, answers from memory.
#[derive(Clone, Default)]
pub struct FakeWalletEnvironment {
    provider: Option<FakeWalletProvider>,
}

#[derive(Clone)]
pub struct FakeWalletProvider {
    accounts: Result<Vec<Address>, RpcFailure>,
    rpc: FakeLotteryRpc,
}

impl FakeWalletEnvironment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<Address>, rpc: FakeLotteryRpc) -> Self {
        Self {
            provider: Some(FakeWalletProvider {
                accounts: Ok(accounts),
                rpc,
            }),
        }
    }

    pub fn rejecting(failure: RpcFailure) -> Self {
        Self {
            provider: Some(FakeWalletProvider {
                accounts: Err(failure),
                rpc: FakeLotteryRpc::default(),
            }),
        }
    }

    /// Makes the wallet authorize `accounts` from now on.
    pub fn authorize(&mut self, accounts: Vec<Address>, rpc: FakeLotteryRpc) {
        self.provider = Some(FakeWalletProvider {
            accounts: Ok(accounts),
            rpc,
        });
    }
}

impl WalletEnvironment for FakeWalletEnvironment {
    type Provider = FakeWalletProvider;

    fn probe(&self) -> Option<FakeWalletProvider> {
        self.provider.clone()
    }
}

impl WalletProvider for FakeWalletProvider {
    type Rpc = FakeLotteryRpc;

    async fn request_accounts(&mut self) -> Result<Vec<Address>, RpcFailure> {
        self.accounts.clone()
    }

    fn signer(&self, _account: Address) -> Result<FakeLotteryRpc, RpcFailure> {
        Ok(self.rpc.clone())
    }
}
