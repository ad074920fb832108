//! Configstore - Binary Entry Point

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use configstore::{logging, supervisor, ConfigStoreConfig, ConfigStoreResult};

#[derive(Debug, Parser)]
#[command(name = "configstore", version, about = "Configuration store service")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "configstore.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

async fn serve(config: ConfigStoreConfig, cancel: CancellationToken) -> ConfigStoreResult<()> {
    let handles = supervisor::construct(&config).await?;
    supervisor::run(handles, cancel).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match ConfigStoreConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configstore: {}", e);
            return ExitCode::FAILURE;
        }
    };
    config.debug |= args.debug;
    logging::init(&config);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            tracing::warn!(error = %e, "cannot install signal handler");
        }
    }

    tracing::info!(version = configstore::VERSION, config = %args.config.display(), "starting configstore");
    match serve(config, cancel).await {
        Ok(()) => {
            tracing::info!("configstore stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "configstore failed");
            ExitCode::FAILURE
        }
    }
}
