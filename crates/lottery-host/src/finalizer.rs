//! Post-deploy front-end update
//!
//! Publishes the deployed Lottery for the front-end project: the ABI goes to
//! `abi.json` (overwritten wholesale), the address is recorded under the
//! chain id in `contractAddresses.json`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use lottery_bindings::abi::constructor_types;
use lottery_bindings::{lottery_abi, AbiValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{AddressMode, Config, FinalizerConfig, NetworkConfig};

/// Finalizer error
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// Reading or writing a file failed
    #[error("{}: {source}", .path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
    /// A file did not hold the expected JSON
    #[error("{}: malformed JSON: {source}", .path.display())]
    Parse {
        /// Offending file
        path: PathBuf,
        /// Parser error
        source: serde_json::Error,
    },
    /// Deployment artifact is inconsistent
    #[error("invalid deployment artifact: {0}")]
    Artifact(String),
}

/// Deployment artifact as written by the deploy framework
#[derive(Debug, Deserialize)]
struct ArtifactFile {
    address: Address,
    abi: Value,
    #[serde(default)]
    args: Vec<Value>,
}

/// A deployed contract: name, address, ABI and constructor arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployedContract {
    /// Contract name, e.g. `Lottery`
    pub name: String,
    /// Deployed address
    pub address: Address,
    /// JSON ABI
    pub abi: Value,
    /// Constructor arguments as recorded at deploy time
    pub args: Vec<Value>,
}

impl DeployedContract {
    /// Load `<dir>/<network>/<name>.json`
    pub fn load(dir: &Path, network: &str, name: &str) -> Result<Self, FinalizeError> {
        let path = dir.join(network).join(format!("{name}.json"));
        let text = fs::read_to_string(&path).map_err(|source| FinalizeError::Io {
            path: path.clone(),
            source,
        })?;
        let artifact: ArtifactFile =
            serde_json::from_str(&text).map_err(|source| FinalizeError::Parse { path, source })?;

        Ok(Self {
            name: name.to_string(),
            address: artifact.address,
            abi: artifact.abi,
            args: artifact.args,
        })
    }

    /// The Lottery at `address`, described by the built-in ABI
    pub fn lottery(address: Address) -> Self {
        Self {
            name: "Lottery".to_string(),
            address,
            abi: lottery_abi(),
            args: Vec::new(),
        }
    }

    /// The Lottery named by `LOTTERY_ADDRESS`, else the network's deployment artifact.
    ///
    /// Without an artifact the constructor arguments are taken from the
    /// network table, so the contract can still be verified.
    pub fn resolve(config: &Config) -> Result<Self, FinalizeError> {
        let Some(text) = &config.lottery_address else {
            return Self::load(&config.deployments_dir, &config.network, "Lottery");
        };
        let address = text
            .parse::<Address>()
            .map_err(|e| FinalizeError::Artifact(format!("LOTTERY_ADDRESS {text}: {e}")))?;
        let args = NetworkConfig::for_chain(config.chain_id)
            .and_then(|network| network.constructor_args())
            .unwrap_or_default();
        Ok(Self {
            args,
            ..Self::lottery(address)
        })
    }

    /// Constructor arguments typed against the ABI's constructor inputs
    pub fn constructor_arguments(&self) -> Result<Vec<AbiValue>, FinalizeError> {
        let types = constructor_types(&self.abi);
        if types.len() != self.args.len() {
            return Err(FinalizeError::Artifact(format!(
                "{} has {} constructor inputs but {} recorded arguments",
                self.name,
                types.len(),
                self.args.len()
            )));
        }

        types
            .iter()
            .zip(&self.args)
            .map(|(kind, value)| {
                AbiValue::from_json(kind, value).map_err(|e| FinalizeError::Artifact(e.to_string()))
            })
            .collect()
    }
}

/// Chain id (decimal string) to deployed addresses
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressRegistry(BTreeMap<String, Vec<String>>);

impl AddressRegistry {
    /// Load the registry; a missing file is an empty registry
    pub fn load(path: &Path) -> Result<Self, FinalizeError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not found, starting an empty registry", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(FinalizeError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| FinalizeError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the registry as compact JSON
    pub fn save(&self, path: &Path) -> Result<(), FinalizeError> {
        write_json(path, self)
    }

    /// Record `address` under `chain_id`. Returns whether the list changed.
    pub fn record(&mut self, chain_id: u64, address: Address, mode: AddressMode) -> bool {
        let address = address.to_checksum(None);
        let key = chain_id.to_string();

        match mode {
            AddressMode::Append => match self.0.get_mut(&key) {
                Some(list) => {
                    if list.iter().any(|known| known.eq_ignore_ascii_case(&address)) {
                        false
                    } else {
                        list.push(address);
                        true
                    }
                }
                None => {
                    self.0.insert(key, vec![address]);
                    true
                }
            },
            AddressMode::Replace => {
                let replaced = vec![address];
                let changed = self.0.get(&key) != Some(&replaced);
                self.0.insert(key, replaced);
                changed
            }
        }
    }

    /// Addresses recorded for `chain_id`
    pub fn addresses(&self, chain_id: u64) -> &[String] {
        self.0.get(&chain_id.to_string()).map_or(&[], Vec::as_slice)
    }
}

/// Result of a finalizer run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// `UPDATE_FRONTEND` was not set
    Skipped,
    /// Both artifacts were written
    Updated {
        /// Whether the registry gained the address
        address_added: bool,
    },
}

/// Front-end artifact writer
#[derive(Clone, Debug)]
pub struct Finalizer {
    config: FinalizerConfig,
}

impl Finalizer {
    /// Create a finalizer
    pub const fn new(config: FinalizerConfig) -> Self {
        Self { config }
    }

    /// Publish `contract` for `chain_id` if enabled
    pub fn run(&self, contract: &DeployedContract, chain_id: u64) -> Result<FinalizeOutcome, FinalizeError> {
        if !self.config.enabled {
            debug!("UPDATE_FRONTEND not set, front end left alone");
            return Ok(FinalizeOutcome::Skipped);
        }

        info!("Updating front end...");
        // a malformed registry must fail before the ABI is touched
        let registry = AddressRegistry::load(&self.config.addresses_file)?;
        self.update_abi(contract)?;
        let address_added = self.update_contract_addresses(registry, contract, chain_id)?;
        info!("Front end updated ({} on chain {})", contract.address, chain_id);

        Ok(FinalizeOutcome::Updated { address_added })
    }

    /// Overwrite `abi.json` with the contract's ABI
    pub fn update_abi(&self, contract: &DeployedContract) -> Result<(), FinalizeError> {
        write_json(&self.config.abi_file, &contract.abi)?;
        debug!("ABI written to {}", self.config.abi_file.display());
        Ok(())
    }

    /// Record the contract's address in `registry` and save it to `contractAddresses.json`
    pub fn update_contract_addresses(
        &self,
        mut registry: AddressRegistry,
        contract: &DeployedContract,
        chain_id: u64,
    ) -> Result<bool, FinalizeError> {
        let path = &self.config.addresses_file;
        let added = registry.record(chain_id, contract.address, self.config.mode);
        registry.save(path)?;
        debug!(
            "Address registry {} now lists {} address(es) for chain {}",
            path.display(),
            registry.addresses(chain_id).len(),
            chain_id
        );
        Ok(added)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), FinalizeError> {
    let io_error = |source| FinalizeError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let text = serde_json::to_string(value).map_err(|source| FinalizeError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(io_error)
}
