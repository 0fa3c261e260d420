mod probe;

use clap::Parser;
use dhcp_net::{Args, ProbeConfig};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn StdError>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ProbeConfig::from(Args::parse());
    tracing::info!(
        "Probing for DHCP servers on '{}' using a {} socket",
        config.interface,
        if config.uses_udp() { "UDP" } else { "raw" }
    );

    let offers = probe::run(&config).await?;
    if offers.is_empty() {
        tracing::warn!("No DHCP OFFER received within {:?}", config.reply_timeout);
    } else {
        tracing::info!("Received {} DHCP OFFER(s)", offers.len());
    }

    Ok(())
}
