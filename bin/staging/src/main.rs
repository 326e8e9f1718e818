//! Staging draw on a live network
//!
//! Enters the deployed Lottery once and waits for the network's keepers and
//! VRF to pick a winner. Development chains have no keepers, so nothing runs there.

use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lottery_host::{run_live_draw, Config, DeployedContract, RpcClient, RpcLottery};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("╔═══════════════════════════════════════════════╗");
    info!("║             Lottery staging draw              ║");
    info!("╚═══════════════════════════════════════════════╝");

    let config = Config::from_env();
    if config.is_development_chain() {
        info!("{} is a development chain, staging draw skipped", config.network);
        return Ok(());
    }

    info!("");
    info!("Configuration:");
    info!("  Network:        {} (chain {})", config.network, config.chain_id);
    info!("  RPC:            {}", config.rpc_url);
    info!("  Confirmations:  {}", config.confirmations);
    info!("  Poll interval:  {:?}", config.poll_interval());
    info!("  Winner timeout: {:?}", config.winner_timeout());
    info!("  Receipt bound:  {:?}", config.receipt_timeout());
    info!("");

    let client = Arc::new(RpcClient::from_config(&config));
    let contract = DeployedContract::resolve(&config)?;
    let lottery = RpcLottery::new(client.clone(), contract.address);

    let player = match &config.player_address {
        Some(text) => text.parse::<Address>()?,
        None => first_account(&client).await?,
    };
    info!("Entering {} from {}", contract.address, player);

    let report = run_live_draw(&lottery, player, config.winner_timeout()).await?;
    report.check()?;

    info!("✓ Winner {} paid {} wei", report.recent_winner, report.entrance_fee);
    Ok(())
}

/// First unlocked account of the node
async fn first_account(client: &RpcClient) -> Result<Address> {
    let accounts = client.request("eth_accounts", json!([])).await?;
    let first = accounts
        .get(0)
        .and_then(|a| a.as_str())
        .ok_or_else(|| anyhow!("node has no unlocked accounts, set PLAYER_ADDRESS"))?;
    Ok(first.parse()?)
}
