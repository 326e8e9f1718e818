//! Contract bindings
//!
//! Hand-written interface of the Lottery contract and of the VRF coordinator
//! mock it is deployed against: selectors, event topics, revert reasons and a
//! small static ABI codec.

pub mod abi;
pub mod codec;
pub mod events;
pub mod revert;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

pub use abi::{event_topic, keccak256, lottery_abi, selector};
pub use codec::{AbiValue, DecodeError};
pub use events::{EventKind, Log, LotteryEvent};
pub use revert::RevertReason;

/// Lottery state as returned by `getLotteryState()`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LotteryState {
    /// Accepting entries
    Open = 0,
    /// Waiting for the randomness request to be fulfilled
    Calculating = 1,
}

impl LotteryState {
    /// Numeric value of the state, as encoded on chain
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<U256> for LotteryState {
    type Error = DecodeError;

    fn try_from(value: U256) -> Result<Self, Self::Error> {
        match value.saturating_to::<u64>() {
            0 => Ok(Self::Open),
            1 => Ok(Self::Calculating),
            _ => Err(DecodeError::InvalidValue {
                kind: "LotteryState",
                value: value.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for LotteryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => f.write_str("OPEN"),
            Self::Calculating => f.write_str("CALCULATING"),
        }
    }
}
