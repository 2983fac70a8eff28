use crate::{
    contract::{
        EventStream,
        LotteryRpc,
        Receipt,
    },
    error::RpcFailure,
    events::{
        ContractEvent,
        EventKind,
    },
};
use alloy::{
    network::ReceiptResponse,
    primitives::{
        Address,
        TxHash,
        U256,
    },
    providers::{
        DynProvider,
        PendingTransactionBuilder,
        Provider,
    },
    transports::TransportError,
};
use futures::StreamExt;
use lottery_abi::ILottery;
use std::{
    fmt,
    time::Duration,
};

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// [`LotteryRpc`] over an EVM JSON-RPC endpoint with a local signer attached.
#[derive(Clone)]
pub struct EvmLotteryRpc {
    provider: DynProvider,
    confirmation_timeout: Duration,
}

impl fmt::Debug for EvmLotteryRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmLotteryRpc")
            .field("confirmation_timeout", &self.confirmation_timeout)
            .finish_non_exhaustive()
    }
}

impl EvmLotteryRpc {
    pub fn new(provider: DynProvider, confirmation_timeout: Duration) -> Self {
        Self {
            provider,
            confirmation_timeout,
        }
    }

    fn lottery(&self, contract: Address) -> ILottery::ILotteryInstance<DynProvider> {
        ILottery::new(contract, self.provider.clone())
    }
}

impl LotteryRpc for EvmLotteryRpc {
    async fn lottery_state(&self, contract: Address) -> Result<u8, RpcFailure> {
        self.lottery(contract)
            .getLotteryState()
            .call()
            .await
            .map_err(contract_failure)
    }

    async fn entry_fee(&self, contract: Address) -> Result<U256, RpcFailure> {
        self.lottery(contract)
            .getEntryFee()
            .call()
            .await
            .map_err(contract_failure)
    }

    async fn number_of_players(&self, contract: Address) -> Result<U256, RpcFailure> {
        self.lottery(contract)
            .getNumberOfPlayers()
            .call()
            .await
            .map_err(contract_failure)
    }

    async fn recent_winner(&self, contract: Address) -> Result<Address, RpcFailure> {
        self.lottery(contract)
            .getRecentWinner()
            .call()
            .await
            .map_err(contract_failure)
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcFailure> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| transport_failure(&e))
    }

    async fn enter_lottery(&self, contract: Address, value: U256) -> Result<TxHash, RpcFailure> {
        let pending = self
            .lottery(contract)
            .enterLottery()
            .value(value)
            .send()
            .await
            .map_err(contract_failure)?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Receipt, RpcFailure> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .map_err(|e| RpcFailure::new(e.to_string()))?;
        Ok(Receipt {
            tx_hash: receipt.transaction_hash(),
            block_number: receipt.block_number(),
            success: receipt.status(),
        })
    }

    async fn watch_events(
        &self,
        contract: Address,
        kind: EventKind,
    ) -> Result<EventStream, RpcFailure> {
        let lottery = self.lottery(contract);
        let stream = match kind {
            EventKind::LotteryEnter => lottery
                .LotteryEnter_filter()
                .watch()
                .await
                .map_err(|e| transport_failure(&e))?
                .into_stream()
                .map(|item| {
                    item.map(|(event, _log)| ContractEvent::PlayerEntered {
                        player: event.player,
                    })
                    .map_err(|e| RpcFailure::new(e.to_string()))
                })
                .boxed(),
            EventKind::WinnerPicked => lottery
                .WinnerPicked_filter()
                .watch()
                .await
                .map_err(|e| transport_failure(&e))?
                .into_stream()
                .map(|item| {
                    item.map(|(event, _log)| ContractEvent::WinnerPicked {
                        winner: event.winner,
                    })
                    .map_err(|e| RpcFailure::new(e.to_string()))
                })
                .boxed(),
        };
        Ok(stream)
    }
}

/// Keeps the JSON-RPC error code when the node (or the wallet) returned one.
fn transport_failure(error: &TransportError) -> RpcFailure {
    match error.as_error_resp() {
        Some(payload) => RpcFailure::with_code(payload.code, payload.message.to_string()),
        None => RpcFailure::new(error.to_string()),
    }
}

fn contract_failure(error: alloy::contract::Error) -> RpcFailure {
    match &error {
        alloy::contract::Error::TransportError(e) => transport_failure(e),
        _ => RpcFailure::new(error.to_string()),
    }
}
