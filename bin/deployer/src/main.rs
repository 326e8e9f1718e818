//! Post-deploy binary: front-end update, then source verification

use anyhow::Result;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lottery_host::{Config, DeployedContract, FinalizeOutcome, Finalizer, Verifier};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("╔═══════════════════════════════════════════════╗");
    info!("║           Lottery post-deploy steps           ║");
    info!("╚═══════════════════════════════════════════════╝");

    let config = Config::from_env();

    info!("");
    info!("Configuration:");
    info!("  Network:        {} (chain {})", config.network, config.chain_id);
    info!("  Deployments:    {}", config.deployments_dir.display());
    info!("  Front end:      {}", if config.finalizer.enabled { "update" } else { "skip" });
    info!("  Addresses file: {}", config.finalizer.addresses_file.display());
    info!("  ABI file:       {}", config.finalizer.abi_file.display());
    info!("  Address mode:   {:?}", config.finalizer.mode);
    info!("");

    let contract = DeployedContract::resolve(&config)?;
    info!("{} deployed at {}", contract.name, contract.address);

    match Finalizer::new(config.finalizer.clone()).run(&contract, config.chain_id)? {
        FinalizeOutcome::Skipped => info!("Front end update skipped"),
        FinalizeOutcome::Updated { address_added } => {
            info!("Front end updated (new address recorded: {})", address_added);
        }
    }

    if config.is_development_chain() {
        info!("Development chain, skipping verification");
    } else if config.verify.api_key.is_none() {
        info!("ETHERSCAN_API_KEY not set, skipping verification");
    } else {
        match contract.constructor_arguments() {
            Ok(args) => {
                Verifier::new(config.verify.clone())
                    .verify(contract.address, &args)
                    .await;
            }
            Err(e) => warn!("Skipping verification, constructor arguments unavailable: {}", e),
        }
    }

    Ok(())
}
