use anyhow::Context;
use clap::{
    Parser,
    Subcommand,
};
use deployments::{
    ContractInfoStore,
    DEFAULT_INFO_FILE,
    read_abi_file,
    register_contract,
};
use info_server::ContractInfoServer;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the registered contract's address and ABI over HTTP
    Serve {
        #[arg(short, long, default_value_t = 5000)]
        port: u16,

        #[arg(long, default_value = DEFAULT_INFO_FILE)]
        info_file: PathBuf,

        #[arg(short, long, default_value = "false")]
        tracing: bool,
    },
    /// Record a deployed contract so the client can find it
    Register {
        #[arg(short, long)]
        address: String,

        /// JSON ABI, either a bare array or a compiler artifact with an `abi` field
        #[arg(long)]
        abi: PathBuf,

        #[arg(long, default_value = DEFAULT_INFO_FILE)]
        info_file: PathBuf,
    },
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Serve {
            port,
            info_file,
            tracing,
        } => {
            if tracing {
                init_tracing();
            }
            let store = ContractInfoStore::new(info_file);
            let server = ContractInfoServer::start(store, Some(port))?;
            println!("Serving contract info at {}", server.contract_info_url());
            match tokio::signal::ctrl_c().await {
                Ok(_) => tracing::info!("Received interrupt, exiting"),
                Err(_) => tracing::warn!("Received interrupt error, exiting anyway"),
            }
            Ok(())
        }
        Command::Register {
            address,
            abi,
            info_file,
        } => {
            let abi = read_abi_file(&abi)?;
            let store = ContractInfoStore::new(info_file);
            let record = register_contract(&store, &address, abi)
                .with_context(|| format!("registering contract {address}"))?;
            println!(
                "Contract address and ABI saved to {} ({})",
                store.path().display(),
                record.address
            );
            Ok(())
        }
    }
}
