use crate::{
    activity_log::ActivityLog,
    contract::{
        ContractClient,
        EventSubscription,
        LotteryRpc,
    },
    error::Result,
    events::{
        ContractEvent,
        EventKind,
        UserNotification,
    },
    snapshot::LotterySnapshot,
    synchronizer::LotterySynchronizer,
};
use alloy::primitives::TxHash;
use futures::{
    FutureExt,
    future::LocalBoxFuture,
};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshReason {
    Manual,
    Event(ContractEvent),
    /// An entry transaction was mined.
    Confirmed(TxHash),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncCommand {
    Refresh(RefreshReason),
    Shutdown,
}

impl From<ContractEvent> for SyncCommand {
    fn from(event: ContractEvent) -> Self {
        SyncCommand::Refresh(RefreshReason::Event(event))
    }
}

/// Posts work to a running [`EventSubscriptionManager`].
#[derive(Clone, Debug)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    /// `false` once the manager has stopped.
    pub fn request_refresh(&self, reason: RefreshReason) -> bool {
        self.commands.send(SyncCommand::Refresh(reason)).is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(SyncCommand::Shutdown);
    }
}

type RefreshFuture = LocalBoxFuture<'static, Result<Arc<LotterySnapshot>>>;

/// Turns contract events and refresh requests into refreshes, never more than one at a
/// time.
///
/// Requests that arrive while a refresh is running collapse into a single follow-up
/// refresh.
pub struct EventSubscriptionManager<R> {
    synchronizer: LotterySynchronizer<R>,
    commands: mpsc::UnboundedReceiver<SyncCommand>,
    sender: mpsc::WeakUnboundedSender<SyncCommand>,
    notifications: mpsc::UnboundedSender<UserNotification>,
    subscriptions: Vec<EventSubscription>,
    log: ActivityLog,
    in_flight: Option<RefreshFuture>,
    follow_up: bool,
}

impl<R: LotteryRpc> EventSubscriptionManager<R> {
    pub fn new(
        synchronizer: LotterySynchronizer<R>,
        notifications: mpsc::UnboundedSender<UserNotification>,
        log: ActivityLog,
    ) -> (Self, SyncHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Self {
            synchronizer,
            commands: rx,
            sender: tx.downgrade(),
            notifications,
            subscriptions: Vec::new(),
            log,
            in_flight: None,
            follow_up: false,
        };
        (manager, SyncHandle { commands: tx })
    }

    /// Subscribes to every lottery event. Listeners installed before a failure stay
    /// attached.
    pub async fn attach(&mut self, client: &ContractClient<R>) -> Result<()> {
        let Some(sender) = self.sender.upgrade() else {
            tracing::debug!("attach after every sync handle was dropped");
            return Ok(());
        };
        for kind in EventKind::ALL {
            if self.subscriptions.iter().any(|s| s.kind() == kind) {
                continue;
            }
            let subscription = client.subscribe(kind, sender.clone()).await?;
            self.subscriptions.push(subscription);
        }
        Ok(())
    }

    pub fn subscriptions(&self) -> &[EventSubscription] {
        &self.subscriptions
    }

    /// Runs until shut down. In-flight and follow-up refreshes finish before it returns.
    pub async fn run(mut self) {
        let mut accepting = true;
        loop {
            if !accepting && self.in_flight.is_none() {
                break;
            }
            tokio::select! {
                command = self.commands.recv(), if accepting => match command {
                    Some(SyncCommand::Refresh(reason)) => self.on_refresh_requested(reason),
                    Some(SyncCommand::Shutdown) | None => {
                        tracing::debug!("sync worker draining");
                        accepting = false;
                        self.commands.close();
                    }
                },
                result = completion(&mut self.in_flight) => {
                    self.in_flight = None;
                    if let Err(error) = result {
                        tracing::debug!(%error, "refresh ended with error");
                    }
                    if std::mem::take(&mut self.follow_up) {
                        self.start_refresh();
                    }
                }
            }
        }
        self.subscriptions.clear();
        tracing::info!("sync worker stopped");
    }

    fn on_refresh_requested(&mut self, reason: RefreshReason) {
        match &reason {
            RefreshReason::Event(event) => {
                self.log.append(event.describe());
                if let ContractEvent::WinnerPicked { winner } = event {
                    let _ = self
                        .notifications
                        .send(UserNotification::WinnerPicked { winner: *winner });
                }
            }
            RefreshReason::Manual | RefreshReason::Confirmed(_) => {}
        }
        if self.in_flight.is_some() {
            tracing::debug!(?reason, "refresh already running; coalescing");
            self.follow_up = true;
        } else {
            tracing::debug!(?reason, "starting refresh");
            self.start_refresh();
        }
    }

    fn start_refresh(&mut self) {
        let synchronizer = self.synchronizer.clone();
        self.in_flight = Some(async move { synchronizer.refresh().await }.boxed_local());
    }
}

async fn completion(in_flight: &mut Option<RefreshFuture>) -> Result<Arc<LotterySnapshot>> {
    match in_flight {
        Some(refresh) => refresh.await,
        None => std::future::pending().await,
    }
}
