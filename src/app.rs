use crate::{
    activity_log::ActivityLog,
    config::AppConfig,
    contract::{
        ContractClient,
        LotteryRpc,
        Receipt,
    },
    directory::{
        ContractDescriptor,
        ContractDirectory,
    },
    error::Result,
    events::UserNotification,
    snapshot::LotterySnapshot,
    subscription::{
        EventSubscriptionManager,
        RefreshReason,
        SyncHandle,
    },
    synchronizer::LotterySynchronizer,
    ui,
    wallet::{
        ConnectionState,
        KeystoreEnvironment,
        WalletConnector,
        WalletEnvironment,
        WalletProvider,
    },
};
use color_eyre::eyre::WrapErr;
use futures::{
    FutureExt,
    StreamExt,
    future::LocalBoxFuture,
    stream::FuturesUnordered,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    DirectoryResolved,
    /// Wallet connected but no live event feed.
    Connected,
    Active,
    /// Contract info could not be loaded. Nothing else is offered.
    Unavailable,
}

/// Everything the UI needs for one frame.
#[derive(Clone, Debug)]
pub struct AppView {
    pub lifecycle: Lifecycle,
    pub status: String,
    pub connection: ConnectionState,
    pub snapshot: Option<Arc<LotterySnapshot>>,
    pub log_lines: Vec<String>,
    pub contract_address: Option<String>,
    pub pending_entries: usize,
}

pub type EntryFuture = LocalBoxFuture<'static, Result<Receipt>>;

type RpcOf<E> = <<E as WalletEnvironment>::Provider as WalletProvider>::Rpc;

struct Session<R> {
    client: ContractClient<R>,
    synchronizer: LotterySynchronizer<R>,
    sync: SyncHandle,
}

pub struct AppController<E: WalletEnvironment> {
    lifecycle: Lifecycle,
    status: String,
    directory: ContractDirectory,
    descriptor: Option<ContractDescriptor>,
    connector: WalletConnector<E>,
    session: Option<Session<RpcOf<E>>>,
    notifications: mpsc::UnboundedSender<UserNotification>,
    log: ActivityLog,
    pending_entries: usize,
}

impl<E: WalletEnvironment> AppController<E> {
    pub fn new(
        directory: ContractDirectory,
        environment: E,
        notifications: mpsc::UnboundedSender<UserNotification>,
        log: ActivityLog,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            status: "Initializing...".to_owned(),
            directory,
            descriptor: None,
            connector: WalletConnector::new(environment, log.clone()),
            session: None,
            notifications,
            log,
            pending_entries: 0,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn connector(&self) -> &WalletConnector<E> {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut WalletConnector<E> {
        &mut self.connector
    }

    pub fn sync_handle(&self) -> Option<&SyncHandle> {
        self.session.as_ref().map(|s| &s.sync)
    }

    pub fn current_snapshot(&self) -> Option<Arc<LotterySnapshot>> {
        self.session.as_ref().and_then(|s| s.synchronizer.current())
    }

    pub async fn startup(&mut self) -> Result<()> {
        if self.lifecycle != Lifecycle::Uninitialized {
            return Ok(());
        }
        self.log.append("Initializing application...");
        match self.directory.resolve().await {
            Ok(descriptor) => {
                self.descriptor = Some(descriptor);
                self.lifecycle = Lifecycle::DirectoryResolved;
                self.status = "Please connect your wallet.".to_owned();
                Ok(())
            }
            Err(error) => {
                self.lifecycle = Lifecycle::Unavailable;
                self.status = error.status_text().to_owned();
                Err(error)
            }
        }
    }

    /// Connects the wallet and starts synchronizing.
    ///
    /// Returns the subscription manager that serializes every later refresh; the caller
    /// drives it. It is returned even when the live event feed could not be attached.
    pub async fn connect(&mut self) -> Result<Option<EventSubscriptionManager<RpcOf<E>>>> {
        if self.lifecycle != Lifecycle::DirectoryResolved {
            tracing::debug!(lifecycle = ?self.lifecycle, "connect ignored");
            return Ok(None);
        }
        let Some(descriptor) = self.descriptor.clone() else {
            return Ok(None);
        };
        self.status = "Connecting...".to_owned();
        let wallet = match self.connector.connect().await {
            Ok(wallet) => wallet,
            Err(error) => {
                self.status = self.connector.state().status_text();
                return Err(error);
            }
        };
        self.status = self.connector.state().status_text();

        let client = ContractClient::new(descriptor, &wallet, self.log.clone());
        let synchronizer = LotterySynchronizer::new(client.clone(), self.log.clone());
        self.lifecycle = Lifecycle::Connected;
        // a failed first read is logged and does not undo the connection
        let _ = synchronizer.refresh().await;

        let (mut manager, handle) = EventSubscriptionManager::new(
            synchronizer.clone(),
            self.notifications.clone(),
            self.log.clone(),
        );
        match manager.attach(&client).await {
            Ok(()) => self.lifecycle = Lifecycle::Active,
            Err(error) => self.status = error.status_text().to_owned(),
        }
        self.session = Some(Session {
            client,
            synchronizer,
            sync: handle,
        });
        Ok(Some(manager))
    }

    /// Queues a manual refresh. `false` when not connected or the manager has stopped.
    pub fn request_refresh(&self) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        let posted = session.sync.request_refresh(RefreshReason::Manual);
        if !posted {
            tracing::warn!("refresh requested after the sync worker stopped");
        }
        posted
    }

    /// Starts an entry paying the current entry fee. The returned future resolves once
    /// the transaction is mined; hand its output to [`Self::entry_settled`].
    pub fn submit_entry(&mut self) -> Option<EntryFuture> {
        let session = self.session.as_ref()?;
        self.log.append("Attempting to enter lottery...");
        self.pending_entries += 1;
        self.status = "Entering lottery...".to_owned();
        let client = session.client.clone();
        let sync = session.sync.clone();
        let log = self.log.clone();
        Some(enter_lottery(client, sync, log).boxed_local())
    }

    pub fn entry_settled(&mut self, outcome: &Result<Receipt>) {
        self.pending_entries = self.pending_entries.saturating_sub(1);
        self.status = match outcome {
            Ok(_) => "Successfully entered the lottery!".to_owned(),
            Err(error) => error.status_text().to_owned(),
        };
    }

    pub fn shutdown(&self) {
        if let Some(sync) = self.sync_handle() {
            sync.shutdown();
        }
    }

    pub fn view(&self) -> AppView {
        AppView {
            lifecycle: self.lifecycle,
            status: self.status.clone(),
            connection: self.connector.state().clone(),
            snapshot: self.current_snapshot(),
            log_lines: self.log.entries().iter().map(ToString::to_string).collect(),
            contract_address: self.descriptor.as_ref().map(|d| d.address.clone()),
            pending_entries: self.pending_entries,
        }
    }
}

async fn enter_lottery<R: LotteryRpc>(
    client: ContractClient<R>,
    sync: SyncHandle,
    log: ActivityLog,
) -> Result<Receipt> {
    let fee = match client.entry_fee().await {
        Ok(fee) => fee,
        Err(error) => {
            tracing::error!(%error, "could not read entry fee");
            log.append(format!("Error entering lottery: {error}"));
            return Err(error);
        }
    };
    let handle = client.enter(fee).await?;
    let receipt = client.await_confirmation(&handle).await?;
    if !sync.request_refresh(RefreshReason::Confirmed(receipt.tx_hash)) {
        tracing::warn!(tx_hash = %receipt.tx_hash, "entry confirmed after the sync worker stopped");
    }
    Ok(receipt)
}

const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

pub async fn run_app(config: AppConfig) -> color_eyre::Result<()> {
    let log = ActivityLog::with_capacity(config.log_capacity);
    let directory = ContractDirectory::new(config.info_url.clone(), log.clone())?;
    let mut environment = KeystoreEnvironment::new(
        config.wallet_dir.clone(),
        config.wallet_name.clone(),
        config.rpc_url.clone(),
        config.confirmation_timeout,
    );
    if let Some(password) = config.wallet_password.clone() {
        environment.set_password(password);
    }
    let (notification_tx, notification_rx) = mpsc::unbounded_channel();
    let controller = AppController::new(directory, environment, notification_tx, log);
    let mut ui_state = ui::UiState::default();
    let input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, &mut ui_state, input_events, notification_rx).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    mut controller: AppController<KeystoreEnvironment>,
    ui_state: &mut ui::UiState,
    mut input_events: ui::InputEventReceiver,
    mut notifications: mpsc::UnboundedReceiver<UserNotification>,
) -> color_eyre::Result<()> {
    tracing::info!("Running app loop");
    ui::draw(ui_state, &controller.view()).wrap_err("initial draw failed")?;
    // the failure is already in the log and the status line
    let _ = controller.startup().await;

    let mut worker: Option<LocalBoxFuture<'static, ()>> = None;
    let mut entries: FuturesUnordered<EntryFuture> = FuturesUnordered::new();
    let mut ticker = time::interval(REDRAW_INTERVAL);
    let mut quitting = false;

    loop {
        ui::draw(ui_state, &controller.view()).wrap_err("draw failed")?;
        if quitting && worker.is_none() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            _ = drive(&mut worker) => {
                worker = None;
            }
            Some(outcome) = entries.next(), if !entries.is_empty() => {
                controller.entry_settled(&outcome);
            }
            Some(notification) = notifications.recv() => {
                ui_state.push_notification(notification);
            }
            _ = tokio::signal::ctrl_c() => {
                controller.shutdown();
                quitting = true;
            }
            raw_ev = ui::next_raw_event(&mut input_events), if !quitting => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => {
                        controller.shutdown();
                        quitting = true;
                    }
                    ui::UserEvent::Connect => {
                        if controller.lifecycle() != Lifecycle::DirectoryResolved {
                            continue;
                        }
                        let environment = controller.connector().environment();
                        if environment.keystore().is_some() && !environment.has_password() {
                            ui_state.open_password_prompt();
                            continue;
                        }
                        connect(&mut controller, ui_state, &mut worker).await?;
                    }
                    ui::UserEvent::SubmitPassword(password) => {
                        controller
                            .connector_mut()
                            .environment_mut()
                            .set_password(password);
                        connect(&mut controller, ui_state, &mut worker).await?;
                    }
                    ui::UserEvent::Refresh => {
                        controller.request_refresh();
                    }
                    ui::UserEvent::EnterLottery => {
                        if let Some(entry) = controller.submit_entry() {
                            entries.push(entry);
                        }
                    }
                    ui::UserEvent::Redraw => {}
                }
            }
        }
    }
    Ok(())
}

async fn connect(
    controller: &mut AppController<KeystoreEnvironment>,
    ui_state: &mut ui::UiState,
    worker: &mut Option<LocalBoxFuture<'static, ()>>,
) -> color_eyre::Result<()> {
    ui::draw(ui_state, &controller.view()).wrap_err("draw before connect failed")?;
    // failures are logged by the connector and shown in the status line
    if let Ok(Some(manager)) = controller.connect().await {
        *worker = Some(manager.run().boxed_local());
    }
    Ok(())
}

async fn drive(worker: &mut Option<LocalBoxFuture<'static, ()>>) {
    match worker {
        Some(worker) => worker.await,
        None => std::future::pending().await,
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        FakeLotteryRpc,
        FakeWalletEnvironment,
        PLAYER_ACCOUNT,
    };

    fn controller(url: &str) -> (AppController<FakeWalletEnvironment>, ActivityLog) {
        let log = ActivityLog::new();
        let directory = ContractDirectory::new(url, log.clone()).unwrap();
        let environment =
            FakeWalletEnvironment::with_accounts(vec![PLAYER_ACCOUNT], FakeLotteryRpc::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        (AppController::new(directory, environment, tx, log.clone()), log)
    }

    #[tokio::test]
    async fn connect__before_startup__is_ignored() {
        // given
        let (mut controller, log) = controller("http://127.0.0.1:1/api/contract-info");

        // when
        let manager = controller.connect().await.unwrap();

        // then
        assert!(manager.is_none());
        assert_eq!(controller.lifecycle(), Lifecycle::Uninitialized);
        assert!(!controller.connector().state().is_connected());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn startup__unreachable_directory__is_unavailable() {
        // given
        let (mut controller, log) = controller("http://127.0.0.1:1/api/contract-info");

        // when
        let result = controller.startup().await;

        // then
        assert!(result.unwrap_err().is_fatal());
        let view = controller.view();
        assert_eq!(view.lifecycle, Lifecycle::Unavailable);
        assert_eq!(view.status, "Error: Could not load contract info.");
        assert_eq!(view.contract_address, None);
        assert!(log.latest().unwrap().message.starts_with("Error:"));
        assert!(controller.submit_entry().is_none());
        assert_eq!(controller.view().pending_entries, 0);
    }

    #[test]
    fn view__fresh_controller__is_initializing() {
        let (controller, _log) = controller("http://127.0.0.1:1/api/contract-info");

        let view = controller.view();

        assert_eq!(view.lifecycle, Lifecycle::Uninitialized);
        assert_eq!(view.status, "Initializing...");
        assert!(view.snapshot.is_none());
        assert!(view.log_lines.is_empty());
    }
}
