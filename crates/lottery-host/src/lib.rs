//! Lottery host
//!
//! Off-chain tooling around the Lottery contract:
//! - `finalizer`: publishes address and ABI to the front-end project
//! - `verify`: block explorer source verification
//! - `rpc`: JSON-RPC contract client
//! - `devchain`: in-process development chain with a VRF coordinator mock
//! - `listener`: one-shot event wait with timeout
//! - `scenario`: local and live draw orchestration

pub mod config;
pub mod contract;
pub mod devchain;
pub mod finalizer;
pub mod listener;
pub mod rpc;
pub mod scenario;
pub mod verify;

pub use config::{AddressMode, Config, FinalizerConfig, NetworkConfig, VerifyConfig};
pub use contract::{ChainControl, ContractError, EventSubscription, LotteryContract, TxReceipt};
pub use devchain::{AutomationHandle, DevChainConfig, LocalChain, LocalLottery};
pub use finalizer::{AddressRegistry, DeployedContract, FinalizeError, FinalizeOutcome, Finalizer};
pub use listener::{PendingEvent, WaitError};
pub use rpc::{RpcClient, RpcDevControls, RpcLottery};
pub use scenario::{
    run_live_draw, run_local_draw, DrawReport, LiveDrawReport, LocalFixture, ScenarioError,
};
pub use verify::{VerifyError, VerifyOutcome, Verifier};
