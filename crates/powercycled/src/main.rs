//! powercycled — power-constrained device cycling daemon.
//!
//! # Usage
//!
//! ```text
//! powercycled run --config /etc/powercycle.toml --data-dir /var/lib/powercycle
//! powercycled check-config --config /etc/powercycle.toml
//! ```

use std::net::SocketAddr;

use clap::Parser;
use tracing::{error, info};

use powercycled::{Cli, Command, Daemon, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    match cli.command {
        Command::Run {
            overrides,
            data_dir,
            port,
        } => {
            let config = overrides.load()?;
            let data_dir = data_dir.unwrap_or_else(|| config.server.data_dir.clone());
            let port = port.unwrap_or(config.server.port);

            info!(devices = config.devices.ids.len(), "powercycle daemon starting");
            let daemon = Daemon::assemble(&config, &data_dir)?;

            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = tokio::net::TcpListener::bind(addr).await?;
            daemon
                .run(listener, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "failed to listen for ctrl-c");
                        std::future::pending::<()>().await;
                    }
                })
                .await
        }
        Command::CheckConfig { overrides } => {
            let config = overrides.load()?;
            config.validate()?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
