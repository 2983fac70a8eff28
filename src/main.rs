use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use lottery_client::{
    app,
    config::Args,
};
use std::path::Path;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

/// The terminal belongs to the UI, so tracing goes to a daily file.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("failed to create log directory {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, "lottery-client.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
    Ok(guard)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = Args::parse().into_config()?;
    let _guard = init_tracing(&config.log_dir)?;
    tracing::info!(info_url = %config.info_url, rpc_url = %config.rpc_url, "starting lottery client");
    app::run_app(config).await
}
