use crate::{
    activity_log::ActivityLog,
    contract::{
        ContractClient,
        LotteryRpc,
    },
    error::Result,
    snapshot::{
        LotteryPhase,
        LotterySnapshot,
        RecentWinner,
    },
};
use std::sync::{
    Arc,
    atomic::{
        AtomicU64,
        Ordering,
    },
};
use tokio::sync::watch;

/// The latest snapshot and the ticket of the refresh that produced it.
///
/// Ticket 0 means nothing has been published yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishedSnapshot {
    pub ticket: u64,
    pub snapshot: Option<Arc<LotterySnapshot>>,
}

/// Reads the lottery as one unit and publishes the result.
///
/// Clones share the ticket counter and the published snapshot.
#[derive(Clone)]
pub struct LotterySynchronizer<R> {
    client: ContractClient<R>,
    log: ActivityLog,
    tickets: Arc<AtomicU64>,
    published: Arc<watch::Sender<PublishedSnapshot>>,
}

impl<R: LotteryRpc> LotterySynchronizer<R> {
    pub fn new(client: ContractClient<R>, log: ActivityLog) -> Self {
        let (published, _) = watch::channel(PublishedSnapshot::default());
        Self {
            client,
            log,
            tickets: Arc::new(AtomicU64::new(0)),
            published: Arc::new(published),
        }
    }

    pub fn current(&self) -> Option<Arc<LotterySnapshot>> {
        self.published.borrow().snapshot.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PublishedSnapshot> {
        self.published.subscribe()
    }

    /// On success returns the snapshot now published. That is this refresh's result
    /// unless a refresh that started later has already published.
    pub async fn refresh(&self) -> Result<Arc<LotterySnapshot>> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(ticket, "refresh started");
        self.log.append("Refreshing lottery information...");
        match self.read_snapshot().await {
            Ok(snapshot) => Ok(self.publish(ticket, snapshot)),
            Err(error) => {
                tracing::error!(ticket, %error, "refresh failed");
                self.log.append(format!("Error updating info: {error}"));
                Err(error)
            }
        }
    }

    async fn read_snapshot(&self) -> Result<LotterySnapshot> {
        let (phase_code, prize_pool_wei, entry_fee_wei, player_count, winner) = futures::try_join!(
            self.client.lottery_phase_code(),
            self.client.contract_balance(),
            self.client.entry_fee(),
            self.client.player_count(),
            self.client.recent_winner(),
        )?;
        Ok(LotterySnapshot {
            phase: LotteryPhase::try_from(phase_code)?,
            prize_pool_wei,
            entry_fee_wei,
            player_count,
            recent_winner: RecentWinner::from(winner),
        })
    }

    fn publish(&self, ticket: u64, snapshot: LotterySnapshot) -> Arc<LotterySnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut newer = None;
        let published = self.published.send_if_modified(|current| {
            if ticket > current.ticket {
                current.ticket = ticket;
                current.snapshot = Some(snapshot.clone());
                true
            } else {
                newer = current.snapshot.clone();
                false
            }
        });
        if published {
            tracing::info!(ticket, phase = %snapshot.phase, players = %snapshot.player_count, "snapshot published");
            self.log.append("Lottery info updated successfully.");
            snapshot
        } else {
            tracing::debug!(ticket, "discarding stale refresh result");
            newer.unwrap_or(snapshot)
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{
            ClientError,
            LotteryField,
            RpcFailure,
        },
        test_helpers::{
            FakeLotteryRpc,
            LotteryState,
            connected_client,
        },
    };
    use alloy::primitives::{
        Address,
        U256,
        address,
    };

    const WINNER: Address = address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

    fn ether(amount: u64) -> U256 {
        U256::from(amount) * U256::from(1_000_000_000_000_000_000u64)
    }

    #[tokio::test]
    async fn refresh__all_reads_succeed__publishes_snapshot() {
        // given
        let rpc = FakeLotteryRpc::with_state(LotteryState {
            phase_code: 0,
            balance: ether(5),
            entry_fee: U256::from(10_000_000_000_000_000u64),
            players: U256::from(3),
            recent_winner: Address::ZERO,
        });
        let (client, log) = connected_client(rpc).await;
        let synchronizer = LotterySynchronizer::new(client, log.clone());
        let mut observer = synchronizer.subscribe();

        // when
        let snapshot = synchronizer.refresh().await.unwrap();

        // then
        assert_eq!(snapshot.phase, LotteryPhase::Open);
        assert_eq!(snapshot.prize_pool_wei, ether(5));
        assert_eq!(snapshot.player_count, U256::from(3));
        assert_eq!(snapshot.recent_winner.to_string(), "No winner yet");
        assert_eq!(synchronizer.current(), Some(snapshot.clone()));
        assert!(observer.has_changed().unwrap());
        assert_eq!(observer.borrow_and_update().ticket, 1);
        assert_eq!(
            log.latest().unwrap().message,
            "Lottery info updated successfully."
        );
    }

    #[tokio::test]
    async fn refresh__one_read_fails__keeps_previous_snapshot() {
        // given
        let rpc = FakeLotteryRpc::default();
        let (client, log) = connected_client(rpc.clone()).await;
        let synchronizer = LotterySynchronizer::new(client, log.clone());
        let previous = synchronizer.refresh().await.unwrap();
        rpc.update(|state| state.players = U256::from(9));
        rpc.fail_read(LotteryField::PrizePool, RpcFailure::new("timeout"));

        // when
        let result = synchronizer.refresh().await;

        // then
        assert_eq!(
            result,
            Err(ClientError::Refresh {
                field: LotteryField::PrizePool,
                source: RpcFailure::new("timeout"),
            })
        );
        assert_eq!(synchronizer.current(), Some(previous));
        assert_eq!(
            log.latest().unwrap().message,
            "Error updating info: failed reading prize pool: timeout"
        );
    }

    #[tokio::test]
    async fn refresh__unknown_phase_code__is_not_published() {
        let rpc = FakeLotteryRpc::default();
        rpc.update(|state| state.phase_code = 3);
        let (client, log) = connected_client(rpc).await;
        let synchronizer = LotterySynchronizer::new(client, log);

        let result = synchronizer.refresh().await;

        assert_eq!(result, Err(ClientError::UnknownLotteryPhase(3)));
        assert_eq!(synchronizer.current(), None);
    }

    #[tokio::test]
    async fn refresh__winner_and_phase__are_mapped() {
        let rpc = FakeLotteryRpc::default();
        rpc.update(|state| {
            state.phase_code = 1;
            state.recent_winner = WINNER;
        });
        let (client, log) = connected_client(rpc).await;
        let synchronizer = LotterySynchronizer::new(client, log);

        let snapshot = synchronizer.refresh().await.unwrap();

        assert_eq!(snapshot.phase, LotteryPhase::CalculatingWinner);
        assert_eq!(snapshot.recent_winner, RecentWinner::Winner(WINNER));
    }

    #[tokio::test]
    async fn refresh__older_result_completing_last__is_discarded() {
        // given
        let rpc = FakeLotteryRpc::default();
        rpc.update(|state| state.players = U256::from(1));
        let (client, log) = connected_client(rpc.clone()).await;
        let synchronizer = LotterySynchronizer::new(client, log);
        let release_older = rpc.hold_next_state_read();
        let mut older = Box::pin(synchronizer.refresh());
        assert!(futures::poll!(older.as_mut()).is_pending());

        // when
        rpc.update(|state| state.players = U256::from(2));
        let newer = synchronizer.refresh().await.unwrap();
        release_older.send(()).unwrap();
        let older = older.await.unwrap();

        // then
        assert_eq!(newer.player_count, U256::from(2));
        assert_eq!(older.player_count, U256::from(2));
        assert_eq!(
            synchronizer.current().unwrap().player_count,
            U256::from(2)
        );
        assert_eq!(synchronizer.subscribe().borrow().ticket, 2);
    }
}
