//! Tickvault server binary.
//!
//! Binds the UDP socket described by the configuration and serves requests
//! until interrupted.
//!
//! ```text
//! Options:
//!   -c, --config <FILE>                Path to configuration file
//!       --host <HOST>                  Bind address [env: TICKVAULT_SERVER_HOST]
//!       --port <PORT>                  UDP port [env: TICKVAULT_SERVER_PORT]
//!       --recv-buffer-size <BYTES>     Largest datagram accepted
//!       --max-datagram-size <BYTES>    Largest reply sent
//!       --log-level <FILTER>           Default log filter [env: TICKVAULT_LOG_LEVEL]
//! ```
//!
//! `RUST_LOG`, when set, takes precedence over the configured log level.

use clap::Parser;
use tickvault::{CliArgs, Settings, UdpServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let cli_args = CliArgs::parse();
    let settings = Settings::new(&cli_args)?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&settings.logging.level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = UdpServer::bind(&settings.server).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
