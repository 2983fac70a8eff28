use crate::{
    activity_log::ActivityLog,
    contract::LotteryRpc,
    error::{
        ClientError,
        Result,
        RpcFailure,
    },
    rpc::EvmLotteryRpc,
};
use alloy::{
    network::EthereumWallet,
    primitives::Address,
    providers::{
        Provider,
        ProviderBuilder,
    },
    signers::local::PrivateKeySigner,
};
use eth_keystore::decrypt_key;
use std::{
    fmt,
    fs,
    future::Future,
    io,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use url::Url;

/// Something that may hold a wallet provider, e.g. a keystore directory.
pub trait WalletEnvironment {
    type Provider: WalletProvider;

    /// `None` when no wallet is installed.
    fn probe(&self) -> Option<Self::Provider>;

    /// Called after a failed authorization so the next attempt asks again.
    fn reset_credentials(&mut self) {}
}

pub trait WalletProvider {
    type Rpc: LotteryRpc;

    /// Asks the wallet to authorize this client. The first account is used.
    fn request_accounts(
        &mut self,
    ) -> impl Future<Output = std::result::Result<Vec<Address>, RpcFailure>>;

    /// Chain access that signs as `account`.
    fn signer(&self, account: Address) -> std::result::Result<Self::Rpc, RpcFailure>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub account: Option<Address>,
    /// Why the last attempt failed. Cleared by a successful connect.
    pub error: Option<ClientError>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    pub fn status_text(&self) -> String {
        match (self.phase, self.account, &self.error) {
            (ConnectionPhase::Connected, Some(account), _) => {
                format!("Connected: {}", short_address(account))
            }
            (ConnectionPhase::Connecting, _, _) => "Connecting...".to_owned(),
            (_, _, Some(error)) => error.status_text().to_owned(),
            _ => "Not connected".to_owned(),
        }
    }
}

/// `0x1234...abcd`
pub fn short_address(address: Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Proof of a successful connection. Only [`WalletConnector::connect`] hands these out.
#[derive(Clone, Debug)]
pub struct ConnectedWallet<R> {
    account: Address,
    rpc: R,
}

impl<R> ConnectedWallet<R> {
    pub fn account(&self) -> Address {
        self.account
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }
}

pub struct WalletConnector<E> {
    environment: E,
    state: ConnectionState,
    log: ActivityLog,
}

type RpcOf<E> = <<E as WalletEnvironment>::Provider as WalletProvider>::Rpc;

impl<E: WalletEnvironment> WalletConnector<E> {
    pub fn new(environment: E, log: ActivityLog) -> Self {
        Self {
            environment,
            state: ConnectionState::default(),
            log,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut E {
        &mut self.environment
    }

    pub async fn connect(&mut self) -> Result<ConnectedWallet<RpcOf<E>>> {
        let Some(mut provider) = self.environment.probe() else {
            let error = ClientError::ProviderUnavailable;
            tracing::warn!("no wallet provider found");
            self.log
                .append("No wallet provider found. Please install a wallet.");
            self.state = ConnectionState {
                phase: ConnectionPhase::Disconnected,
                account: None,
                error: Some(error.clone()),
            };
            return Err(error);
        };

        self.state = ConnectionState {
            phase: ConnectionPhase::Connecting,
            account: None,
            error: None,
        };
        match Self::authorize(&mut provider).await {
            Ok(wallet) => {
                tracing::info!(account = %wallet.account, "wallet connected");
                self.log
                    .append(format!("Wallet connected: {}", wallet.account));
                self.state = ConnectionState {
                    phase: ConnectionPhase::Connected,
                    account: Some(wallet.account),
                    error: None,
                };
                Ok(wallet)
            }
            Err(error) => {
                tracing::error!(%error, "wallet connection failed");
                self.log.append(format!("Connection failed: {error}"));
                self.environment.reset_credentials();
                self.state = ConnectionState {
                    phase: ConnectionPhase::Disconnected,
                    account: None,
                    error: Some(error.clone()),
                };
                Err(error)
            }
        }
    }

    async fn authorize(provider: &mut E::Provider) -> Result<ConnectedWallet<RpcOf<E>>> {
        let accounts = provider
            .request_accounts()
            .await
            .map_err(|e| ClientError::connection(e.to_string()))?;
        let account = accounts
            .first()
            .copied()
            .ok_or_else(|| ClientError::connection("wallet authorized no accounts"))?;
        let rpc = provider
            .signer(account)
            .map_err(|e| ClientError::connection(e.to_string()))?;
        Ok(ConnectedWallet { account, rpc })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeystoreDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl KeystoreDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".foundry").join("keystores"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Option<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Some(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

/// Keystore files in `dir`, sorted by name. A missing directory holds none.
pub fn list_wallets(dir: &Path) -> io::Result<Vec<KeystoreDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let name = name.strip_suffix(".json").unwrap_or(name).to_owned();
        wallets.push(KeystoreDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

/// The named keystore, or the first one when no name is given.
pub fn find_wallet(dir: &Path, name: Option<&str>) -> io::Result<Option<KeystoreDescriptor>> {
    let wallets = list_wallets(dir)?;
    Ok(match name {
        Some(name) => wallets.into_iter().find(|w| w.name == name),
        None => wallets.into_iter().next(),
    })
}

/// Encrypted keystores on disk acting as the wallet.
#[derive(Clone)]
pub struct KeystoreEnvironment {
    wallet_dir: PathBuf,
    wallet_name: Option<String>,
    rpc_url: Url,
    confirmation_timeout: Duration,
    password: Option<String>,
}

impl fmt::Debug for KeystoreEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystoreEnvironment")
            .field("wallet_dir", &self.wallet_dir)
            .field("wallet_name", &self.wallet_name)
            .field("rpc_url", &self.rpc_url.as_str())
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl KeystoreEnvironment {
    pub fn new(
        wallet_dir: PathBuf,
        wallet_name: Option<String>,
        rpc_url: Url,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            wallet_dir,
            wallet_name,
            rpc_url,
            confirmation_timeout,
            password: None,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(password.into());
    }

    pub fn clear_password(&mut self) {
        self.password = None;
    }

    pub fn keystore(&self) -> Option<KeystoreDescriptor> {
        match find_wallet(&self.wallet_dir, self.wallet_name.as_deref()) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(dir = %self.wallet_dir.display(), error = %e, "failed to read wallet directory");
                None
            }
        }
    }
}

impl WalletEnvironment for KeystoreEnvironment {
    type Provider = KeystoreProvider;

    fn probe(&self) -> Option<KeystoreProvider> {
        let keystore = self.keystore()?;
        Some(KeystoreProvider {
            keystore,
            password: self.password.clone(),
            rpc_url: self.rpc_url.clone(),
            confirmation_timeout: self.confirmation_timeout,
            signer: None,
        })
    }

    fn reset_credentials(&mut self) {
        self.clear_password();
    }
}

pub struct KeystoreProvider {
    keystore: KeystoreDescriptor,
    password: Option<String>,
    rpc_url: Url,
    confirmation_timeout: Duration,
    signer: Option<PrivateKeySigner>,
}

impl WalletProvider for KeystoreProvider {
    type Rpc = EvmLotteryRpc;

    async fn request_accounts(&mut self) -> std::result::Result<Vec<Address>, RpcFailure> {
        let password = self.password.clone().ok_or_else(|| {
            RpcFailure::new(format!(
                "no password supplied for wallet '{}'",
                self.keystore.name
            ))
        })?;
        let path = self.keystore.path.clone();
        // key derivation blocks for a while
        let secret = tokio::task::spawn_blocking(move || decrypt_key(&path, password))
            .await
            .map_err(|e| RpcFailure::new(format!("keystore decryption aborted: {e}")))?
            .map_err(|_| {
                RpcFailure::new(format!("invalid password for wallet '{}'", self.keystore.name))
            })?;
        let signer = PrivateKeySigner::from_slice(&secret).map_err(|e| {
            RpcFailure::new(format!(
                "wallet '{}' contained unsupported key material: {e}",
                self.keystore.name
            ))
        })?;
        let account = signer.address();
        self.signer = Some(signer);
        Ok(vec![account])
    }

    fn signer(&self, account: Address) -> std::result::Result<EvmLotteryRpc, RpcFailure> {
        let signer = self
            .signer
            .clone()
            .filter(|signer| signer.address() == account)
            .ok_or_else(|| RpcFailure::new(format!("account {account} is not authorized")))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url.clone())
            .erased();
        Ok(EvmLotteryRpc::new(provider, self.confirmation_timeout))
    }
}
