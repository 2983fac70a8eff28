use crate::{
    activity_log::ActivityLog,
    directory::ContractDescriptor,
    error::{
        ClientError,
        LotteryField,
        Result,
        RpcFailure,
    },
    events::{
        ContractEvent,
        EventKind,
    },
    wallet::ConnectedWallet,
};
use alloy::primitives::{
    Address,
    TxHash,
    U256,
};
use futures::{
    StreamExt,
    stream::BoxStream,
};
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};

/// Decoded deliveries of one contract event, in emission order.
pub type EventStream = BoxStream<'static, std::result::Result<ContractEvent, RpcFailure>>;

/// Chain access used by [`ContractClient`].
///
/// Implemented over a JSON-RPC provider for the real application and by an in-memory fake
/// in tests.
pub trait LotteryRpc: Clone + 'static {
    fn lottery_state(
        &self,
        contract: Address,
    ) -> impl Future<Output = std::result::Result<u8, RpcFailure>>;

    fn entry_fee(
        &self,
        contract: Address,
    ) -> impl Future<Output = std::result::Result<U256, RpcFailure>>;

    fn number_of_players(
        &self,
        contract: Address,
    ) -> impl Future<Output = std::result::Result<U256, RpcFailure>>;

    fn recent_winner(
        &self,
        contract: Address,
    ) -> impl Future<Output = std::result::Result<Address, RpcFailure>>;

    fn balance(
        &self,
        address: Address,
    ) -> impl Future<Output = std::result::Result<U256, RpcFailure>>;

    /// Signs and broadcasts `enterLottery` carrying `value` wei.
    fn enter_lottery(
        &self,
        contract: Address,
        value: U256,
    ) -> impl Future<Output = std::result::Result<TxHash, RpcFailure>>;

    /// Resolves once the transaction is mined or the transport gives up on it.
    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = std::result::Result<Receipt, RpcFailure>>;

    fn watch_events(
        &self,
        contract: Address,
        kind: EventKind,
    ) -> impl Future<Output = std::result::Result<EventStream, RpcFailure>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionHandle {
    pub tx_hash: TxHash,
    pub value: U256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// A standing listener on one contract event. Dropping it stops the listener.
#[derive(Debug)]
pub struct EventSubscription {
    kind: EventKind,
    active: Arc<AtomicBool>,
    forwarder: JoinHandle<()>,
}

impl EventSubscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.forwarder.is_finished()
    }

    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.forwarder.abort();
    }
}

/// Read/write access to the deployed lottery on behalf of a connected account.
#[derive(Clone)]
pub struct ContractClient<R> {
    descriptor: ContractDescriptor,
    account: Address,
    rpc: R,
    log: ActivityLog,
}

impl<R: LotteryRpc> ContractClient<R> {
    pub fn new(
        descriptor: ContractDescriptor,
        wallet: &ConnectedWallet<R>,
        log: ActivityLog,
    ) -> Self {
        Self {
            descriptor,
            account: wallet.account(),
            rpc: wallet.rpc().clone(),
            log,
        }
    }

    fn contract(&self) -> Address {
        self.descriptor.contract_address()
    }

    pub async fn lottery_phase_code(&self) -> Result<u8> {
        self.rpc
            .lottery_state(self.contract())
            .await
            .map_err(refresh_error(LotteryField::Phase))
    }

    pub async fn entry_fee(&self) -> Result<U256> {
        self.rpc
            .entry_fee(self.contract())
            .await
            .map_err(refresh_error(LotteryField::EntryFee))
    }

    pub async fn player_count(&self) -> Result<U256> {
        self.rpc
            .number_of_players(self.contract())
            .await
            .map_err(refresh_error(LotteryField::PlayerCount))
    }

    pub async fn recent_winner(&self) -> Result<Address> {
        self.rpc
            .recent_winner(self.contract())
            .await
            .map_err(refresh_error(LotteryField::RecentWinner))
    }

    /// The prize pool is whatever the contract holds.
    pub async fn contract_balance(&self) -> Result<U256> {
        self.rpc
            .balance(self.contract())
            .await
            .map_err(refresh_error(LotteryField::PrizePool))
    }

    pub async fn enter(&self, value: U256) -> Result<TransactionHandle> {
        match self.rpc.enter_lottery(self.contract(), value).await {
            Ok(tx_hash) => {
                tracing::info!(%tx_hash, %value, account = %self.account, "entry transaction submitted");
                self.log
                    .append(format!("Transaction sent... Hash: {tx_hash}"));
                self.log.append("Waiting for transaction to be mined...");
                Ok(TransactionHandle { tx_hash, value })
            }
            Err(failure) => {
                tracing::error!(code = ?failure.code, error = %failure.message, "entry submission failed");
                self.log.append(format!("Error entering lottery: {failure}"));
                Err(ClientError::Submission(failure))
            }
        }
    }

    pub async fn await_confirmation(&self, handle: &TransactionHandle) -> Result<Receipt> {
        let tx_hash = handle.tx_hash;
        let outcome = match self.rpc.wait_for_receipt(tx_hash).await {
            Ok(receipt) if receipt.success => Ok(receipt),
            Ok(receipt) => Err(RpcFailure::new(match receipt.block_number {
                Some(block) => format!("transaction reverted in block {block}"),
                None => "transaction reverted".to_owned(),
            })),
            Err(failure) => Err(failure),
        };
        match outcome {
            Ok(receipt) => {
                tracing::info!(%tx_hash, block = ?receipt.block_number, "entry confirmed");
                self.log.append("You have successfully entered the lottery!");
                Ok(receipt)
            }
            Err(source) => {
                let error = ClientError::Confirmation { tx_hash, source };
                tracing::error!(%error, "entry confirmation failed");
                self.log.append(format!("Error entering lottery: {error}"));
                Err(error)
            }
        }
    }

    /// Installs a listener for `kind` whose deliveries are posted to `sink` in emission
    /// order.
    pub async fn subscribe<T>(
        &self,
        kind: EventKind,
        sink: mpsc::UnboundedSender<T>,
    ) -> Result<EventSubscription>
    where
        T: From<ContractEvent> + Send + 'static,
    {
        let stream = match self.rpc.watch_events(self.contract(), kind).await {
            Ok(stream) => stream,
            Err(source) => {
                let error = ClientError::Subscription {
                    event: kind,
                    source,
                };
                tracing::error!(%error, "event subscription failed");
                self.log.append(format!("Error: {error}"));
                return Err(error);
            }
        };
        tracing::debug!(event = %kind, "listening for contract events");

        let active = Arc::new(AtomicBool::new(true));
        let forwarder = tokio::spawn(forward_events(
            kind,
            stream,
            sink,
            active.clone(),
            self.log.clone(),
        ));
        Ok(EventSubscription {
            kind,
            active,
            forwarder,
        })
    }
}

async fn forward_events<T>(
    kind: EventKind,
    mut stream: EventStream,
    sink: mpsc::UnboundedSender<T>,
    active: Arc<AtomicBool>,
    log: ActivityLog,
) where
    T: From<ContractEvent>,
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if sink.send(T::from(event)).is_err() {
                    tracing::debug!(event = %kind, "event sink closed");
                    break;
                }
            }
            Err(failure) => {
                tracing::warn!(event = %kind, error = %failure, "dropping undecodable event");
                log.append(format!("Error reading {kind} event: {failure}"));
            }
        }
    }
    active.store(false, Ordering::SeqCst);
}

fn refresh_error(field: LotteryField) -> impl FnOnce(RpcFailure) -> ClientError {
    move |source| ClientError::Refresh { field, source }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        FakeLotteryRpc,
        connected_client,
        wait_until,
    };
    use alloy::primitives::address;

    const PLAYER: Address = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");

    #[tokio::test]
    async fn reads__failing_field__is_tagged_with_that_field() {
        // given
        let rpc = FakeLotteryRpc::default();
        rpc.fail_read(LotteryField::PlayerCount, RpcFailure::new("connection reset"));
        let (client, _log) = connected_client(rpc.clone()).await;

        // when
        let result = client.player_count().await;

        // then
        assert_eq!(
            result,
            Err(ClientError::Refresh {
                field: LotteryField::PlayerCount,
                source: RpcFailure::new("connection reset"),
            })
        );
        assert!(client.entry_fee().await.is_ok());
    }

    #[tokio::test]
    async fn enter__accepted__returns_handle_and_logs_hash() {
        // given
        let rpc = FakeLotteryRpc::default();
        let (client, log) = connected_client(rpc.clone()).await;
        let value = U256::from(10_000_000_000_000_000u64);

        // when
        let handle = client.enter(value).await.unwrap();

        // then
        assert_eq!(handle.value, value);
        assert_eq!(rpc.entries(), vec![value]);
        let messages: Vec<_> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages[..2],
            [
                "Waiting for transaction to be mined...".to_owned(),
                format!("Transaction sent... Hash: {}", handle.tx_hash),
            ]
        );
    }

    #[tokio::test]
    async fn enter__rejected__is_submission_error_with_code() {
        // given
        let rpc = FakeLotteryRpc::default();
        rpc.reject_entries(RpcFailure::with_code(4001, "User rejected the request."));
        let (client, log) = connected_client(rpc.clone()).await;
        let before = log.len();

        // when
        let result = client.enter(U256::from(1)).await;

        // then
        let error = result.unwrap_err();
        assert_eq!(error.code(), Some(4001));
        assert!(matches!(error, ClientError::Submission(_)));
        assert_eq!(log.len(), before + 1);
    }

    #[tokio::test]
    async fn await_confirmation__reverted__is_confirmation_error() {
        // given
        let rpc = FakeLotteryRpc::default();
        rpc.revert_entries();
        let (client, log) = connected_client(rpc.clone()).await;
        let handle = client.enter(U256::from(1)).await.unwrap();

        // when
        let result = client.await_confirmation(&handle).await;

        // then
        let Err(ClientError::Confirmation { tx_hash, .. }) = result else {
            panic!("expected confirmation error, got {result:?}");
        };
        assert_eq!(tx_hash, handle.tx_hash);
        assert!(
            log.latest()
                .unwrap()
                .message
                .starts_with("Error entering lottery:")
        );
    }

    #[tokio::test]
    async fn await_confirmation__mined__logs_success() {
        let rpc = FakeLotteryRpc::default();
        let (client, log) = connected_client(rpc.clone()).await;
        let handle = client.enter(U256::from(1)).await.unwrap();

        let receipt = client.await_confirmation(&handle).await.unwrap();

        assert!(receipt.success);
        assert_eq!(receipt.tx_hash, handle.tx_hash);
        assert_eq!(
            log.latest().unwrap().message,
            "You have successfully entered the lottery!"
        );
    }

    #[tokio::test]
    async fn subscribe__deliveries__arrive_in_emission_order() {
        // given
        let rpc = FakeLotteryRpc::default();
        let (client, _log) = connected_client(rpc.clone()).await;
        let (tx, mut rx) = mpsc::unbounded_channel::<ContractEvent>();
        let subscription = client.subscribe(EventKind::LotteryEnter, tx).await.unwrap();
        let players = [PLAYER, Address::repeat_byte(1), Address::repeat_byte(2)];

        // when
        for player in players {
            rpc.emit(ContractEvent::PlayerEntered { player });
        }

        // then
        for player in players {
            assert_eq!(
                rx.recv().await,
                Some(ContractEvent::PlayerEntered { player })
            );
        }
        assert!(subscription.is_active());
    }

    #[tokio::test]
    async fn subscribe__refused__is_subscription_error() {
        let rpc = FakeLotteryRpc::default();
        rpc.refuse_subscriptions(EventKind::WinnerPicked, RpcFailure::new("filter not found"));
        let (client, log) = connected_client(rpc.clone()).await;
        let (tx, _rx) = mpsc::unbounded_channel::<ContractEvent>();
        let before = log.len();

        let result = client.subscribe(EventKind::WinnerPicked, tx).await;

        assert!(matches!(
            result,
            Err(ClientError::Subscription {
                event: EventKind::WinnerPicked,
                ..
            })
        ));
        assert_eq!(log.len(), before + 1);
    }

    #[tokio::test]
    async fn unsubscribe__stops_forwarding() {
        // given
        let rpc = FakeLotteryRpc::default();
        let (client, _log) = connected_client(rpc.clone()).await;
        let (tx, mut rx) = mpsc::unbounded_channel::<ContractEvent>();
        let subscription = client.subscribe(EventKind::LotteryEnter, tx).await.unwrap();

        // when
        subscription.unsubscribe();
        wait_until(|| rx.is_closed()).await;

        // then
        rpc.emit(ContractEvent::PlayerEntered { player: PLAYER });
        assert_eq!(rx.recv().await, None);
    }
}
