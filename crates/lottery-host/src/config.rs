//! Configuration

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Networks on which the contract is deployed against mocks and never verified
pub const DEVELOPMENT_CHAINS: [&str; 2] = ["hardhat", "localhost"];

/// Chain id of the local development chain
pub const DEVELOPMENT_CHAIN_ID: u64 = 31337;

/// 0.01 ETH in wei
const DEFAULT_ENTRANCE_FEE: u64 = 10_000_000_000_000_000;

/// Whether `network` is a local development chain
pub fn is_development_chain(network: &str) -> bool {
    DEVELOPMENT_CHAINS.contains(&network)
}

/// Per-network deployment parameters of the Lottery
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name
    pub name: String,
    /// Chain id
    pub chain_id: u64,
    /// VRF coordinator address (`None` on development chains, where the mock is deployed)
    pub vrf_coordinator: Option<String>,
    /// Entrance fee in wei
    pub entrance_fee: U256,
    /// VRF key hash
    pub gas_lane: String,
    /// VRF subscription id
    pub subscription_id: u64,
    /// Gas limit of the fulfillment callback
    pub callback_gas_limit: u32,
    /// Seconds between draws
    pub interval: u64,
}

impl NetworkConfig {
    /// Look up the parameters of a known chain
    pub fn for_chain(chain_id: u64) -> Option<Self> {
        let entrance_fee = U256::from(DEFAULT_ENTRANCE_FEE);
        let config = match chain_id {
            DEVELOPMENT_CHAIN_ID => Self {
                name: "hardhat".to_string(),
                chain_id,
                vrf_coordinator: None,
                entrance_fee,
                gas_lane: "0x79d3d8832d904592c0bf9818b621522c988bb8b0c05cdc3b15aea1b6e8db0c15"
                    .to_string(),
                subscription_id: 0,
                callback_gas_limit: 500_000,
                interval: 30,
            },
            5 => Self {
                name: "goerli".to_string(),
                chain_id,
                vrf_coordinator: Some("0x2Ca8E0C643bDe4C2E08ab1fA0da3401AdAD7734D".to_string()),
                entrance_fee,
                gas_lane: "0x79d3d8832d904592c0bf9818b621522c988bb8b0c05cdc3b15aea1b6e8db0c15"
                    .to_string(),
                subscription_id: 0,
                callback_gas_limit: 500_000,
                interval: 30,
            },
            11_155_111 => Self {
                name: "sepolia".to_string(),
                chain_id,
                vrf_coordinator: Some("0x8103B0A8A00be2DDC778e6e7eaa21791Cd364625".to_string()),
                entrance_fee,
                gas_lane: "0x474e34a077df58807dbe9c96d3c009b23b3c6d0cce433e59bbf5b34f823bc56c"
                    .to_string(),
                subscription_id: 0,
                callback_gas_limit: 500_000,
                interval: 30,
            },
            _ => return None,
        };
        Some(config)
    }

    /// Look up the parameters of a known network by name
    pub fn for_network(name: &str) -> Option<Self> {
        match name {
            "hardhat" | "localhost" => Self::for_chain(DEVELOPMENT_CHAIN_ID),
            "goerli" => Self::for_chain(5),
            "sepolia" => Self::for_chain(11_155_111),
            _ => None,
        }
    }

    /// Lottery constructor arguments in declaration order.
    /// `None` on development chains, where the coordinator is a mock deployed alongside.
    pub fn constructor_args(&self) -> Option<Vec<Value>> {
        let coordinator = self.vrf_coordinator.as_ref()?;
        Some(vec![
            json!(coordinator),
            json!(self.entrance_fee.to_string()),
            json!(self.gas_lane),
            json!(self.subscription_id),
            json!(self.callback_gas_limit),
            json!(self.interval),
        ])
    }
}

/// How the finalizer records a new address in the front-end registry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressMode {
    /// Append the address to the chain's list unless already present
    #[default]
    Append,
    /// Legacy behavior: the chain's list is replaced by the single new address
    Replace,
}

impl From<&str> for AddressMode {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "replace" => Self::Replace,
            _ => Self::Append,
        }
    }
}

/// Front-end artifact update settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinalizerConfig {
    /// Set when `UPDATE_FRONTEND` is present and non-empty
    pub enabled: bool,
    /// `contractAddresses.json`
    pub addresses_file: PathBuf,
    /// `abi.json`
    pub abi_file: PathBuf,
    /// Registry update mode
    pub mode: AddressMode,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addresses_file: PathBuf::from("../nxt/constants/contractAddresses.json"),
            abi_file: PathBuf::from("../nxt/constants/abi.json"),
            mode: AddressMode::Append,
        }
    }
}

/// Block explorer verification settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Etherscan-compatible API endpoint
    pub api_url: String,
    /// API key; verification is skipped without one
    pub api_key: Option<String>,
    /// Fully qualified contract name, e.g. `contracts/Lottery.sol:Lottery`
    pub contract_name: String,
    /// Solc version string, e.g. `v0.8.7+commit.e28d00a7`
    pub compiler_version: String,
    /// Standard JSON input file submitted as source code
    pub source_file: Option<PathBuf>,
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Status polls before giving up
    pub max_polls: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api-sepolia.etherscan.io/api".to_string(),
            api_key: None,
            contract_name: "contracts/Lottery.sol:Lottery".to_string(),
            compiler_version: "v0.8.7+commit.e28d00a7".to_string(),
            source_file: None,
            poll_interval: Duration::from_secs(3),
            max_polls: 20,
        }
    }
}

/// Host configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Network name (`hardhat`, `localhost`, `sepolia`, ..)
    pub network: String,
    /// Chain id used as key in the address registry
    pub chain_id: u64,
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Deployed Lottery address, when no deployment artifact is available
    pub lottery_address: Option<String>,
    /// Unlocked account that enters the raffle on live networks
    pub player_address: Option<String>,
    /// Deployment artifact root (`deployments/<network>/<Name>.json`)
    pub deployments_dir: PathBuf,
    /// Confirmations to wait for after each transaction
    pub confirmations: u64,
    /// Receipt and log polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound on the wait for `WinnerPicked`, in seconds
    pub winner_timeout_secs: u64,
    /// Upper bound on the wait for a transaction receipt, in seconds
    pub receipt_timeout_secs: u64,
    /// Front-end artifacts
    pub finalizer: FinalizerConfig,
    /// Source verification
    pub verify: VerifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: "localhost".to_string(),
            chain_id: DEVELOPMENT_CHAIN_ID,
            rpc_url: "http://localhost:8545".to_string(),
            lottery_address: None,
            player_address: None,
            deployments_dir: PathBuf::from("deployments"),
            confirmations: 1,
            poll_interval_ms: 1000,
            winner_timeout_secs: 300,
            receipt_timeout_secs: 120,
            finalizer: FinalizerConfig::default(),
            verify: VerifyConfig::default(),
        }
    }
}

impl Config {
    /// Load from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let network = var("NETWORK").unwrap_or(defaults.network);
        let chain_id = var("CHAIN_ID")
            .and_then(|s| s.parse().ok())
            .or_else(|| NetworkConfig::for_network(&network).map(|n| n.chain_id))
            .unwrap_or(DEVELOPMENT_CHAIN_ID);

        let finalizer = FinalizerConfig {
            // any non-empty value counts, "false" included
            enabled: var("UPDATE_FRONTEND").is_some_and(|s| !s.is_empty()),
            addresses_file: var("FRONTEND_ADDRESSES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.finalizer.addresses_file),
            abi_file: var("FRONTEND_ABI_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.finalizer.abi_file),
            mode: var("FRONTEND_ADDRESS_MODE")
                .map(|s| AddressMode::from(s.as_str()))
                .unwrap_or_default(),
        };

        let verify = VerifyConfig {
            api_url: var("ETHERSCAN_API_URL").unwrap_or(defaults.verify.api_url),
            api_key: var("ETHERSCAN_API_KEY").filter(|s| !s.is_empty()),
            contract_name: var("VERIFY_CONTRACT_NAME").unwrap_or(defaults.verify.contract_name),
            compiler_version: var("VERIFY_COMPILER_VERSION")
                .unwrap_or(defaults.verify.compiler_version),
            source_file: var("VERIFY_SOURCE_FILE").map(PathBuf::from),
            ..defaults.verify
        };

        Self {
            network,
            chain_id,
            rpc_url: var("RPC_URL").unwrap_or(defaults.rpc_url),
            lottery_address: var("LOTTERY_ADDRESS"),
            player_address: var("PLAYER_ADDRESS"),
            deployments_dir: var("DEPLOYMENTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.deployments_dir),
            confirmations: var("CONFIRMATIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confirmations),
            poll_interval_ms: var("POLL_INTERVAL_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.poll_interval_ms),
            winner_timeout_secs: var("WINNER_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.winner_timeout_secs),
            receipt_timeout_secs: var("RECEIPT_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.receipt_timeout_secs),
            finalizer,
            verify,
        }
    }

    /// Polling interval as a duration
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Winner wait bound as a duration
    pub const fn winner_timeout(&self) -> Duration {
        Duration::from_secs(self.winner_timeout_secs)
    }

    /// Receipt wait bound as a duration
    pub const fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    /// Whether the configured network is a development chain
    pub fn is_development_chain(&self) -> bool {
        is_development_chain(&self.network)
    }
}
