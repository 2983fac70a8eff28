use crate::{
    activity_log::DEFAULT_LOG_CAPACITY,
    rpc::DEFAULT_CONFIRMATION_TIMEOUT,
    wallet,
};
use clap::Parser;
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::{
    path::PathBuf,
    time::Duration,
};
use url::Url;

pub const DEFAULT_INFO_URL: &str = "http://127.0.0.1:5000/api/contract-info";
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

#[derive(Parser, Debug)]
#[command(name = "lottery-client", about = "Terminal client for the lottery contract")]
pub struct Args {
    /// Endpoint serving the contract address and ABI
    #[arg(long, default_value = DEFAULT_INFO_URL)]
    pub info_url: String,

    /// JSON-RPC endpoint of the chain the lottery is deployed on
    #[arg(long, default_value = DEFAULT_RPC_URL)]
    pub rpc_url: Url,

    /// Keystore to unlock (defaults to the first one in the wallet directory)
    #[arg(long)]
    pub wallet: Option<String>,

    /// Keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    pub wallet_dir: Option<String>,

    #[arg(long, env = "LOTTERY_WALLET_PASSWORD", hide_env_values = true)]
    pub wallet_password: Option<String>,

    /// Activity log lines kept in memory
    #[arg(long, default_value_t = DEFAULT_LOG_CAPACITY)]
    pub log_capacity: usize,

    /// Seconds to wait for an entry to be mined
    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_TIMEOUT.as_secs())]
    pub confirmation_timeout: u64,

    /// Where the rolling log file is written
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,
}

#[derive(Clone)]
pub struct AppConfig {
    pub info_url: String,
    pub rpc_url: Url,
    pub wallet_dir: PathBuf,
    pub wallet_name: Option<String>,
    pub wallet_password: Option<String>,
    pub log_capacity: usize,
    pub confirmation_timeout: Duration,
    pub log_dir: PathBuf,
}

impl Args {
    pub fn into_config(self) -> Result<AppConfig> {
        let wallet_dir = wallet::resolve_wallet_dir(self.wallet_dir.as_deref())
            .ok_or_else(|| eyre!("HOME is not set; pass --wallet-dir"))?;
        if self.log_capacity == 0 {
            return Err(eyre!("--log-capacity must be at least 1"));
        }
        Ok(AppConfig {
            info_url: self.info_url,
            rpc_url: self.rpc_url,
            wallet_dir,
            wallet_name: self.wallet,
            wallet_password: self.wallet_password,
            log_capacity: self.log_capacity,
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout),
            log_dir: self.log_dir,
        })
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_config__defaults__match_local_dev_setup() {
        let args = Args::try_parse_from(["lottery-client", "--wallet-dir", "/tmp/keys"]).unwrap();

        let config = args.into_config().unwrap();

        assert_eq!(config.info_url, DEFAULT_INFO_URL);
        assert_eq!(config.rpc_url.as_str(), "http://127.0.0.1:8545/");
        assert_eq!(config.wallet_dir, PathBuf::from("/tmp/keys"));
        assert_eq!(config.log_capacity, 200);
        assert_eq!(config.confirmation_timeout, Duration::from_secs(120));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn into_config__zero_log_capacity__is_rejected() {
        let args = Args::try_parse_from([
            "lottery-client",
            "--wallet-dir",
            "/tmp/keys",
            "--log-capacity",
            "0",
        ])
        .unwrap();

        assert!(args.into_config().is_err());
    }

    #[test]
    fn try_parse_from__bad_rpc_url__fails() {
        let result = Args::try_parse_from(["lottery-client", "--rpc-url", "not a url"]);

        assert!(result.is_err());
    }
}
