//! Revert reasons

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::abi::selector;
use crate::codec::{self, AbiValue, WORD};

/// Custom error: entry paid less than the entrance fee
pub const NOT_ENOUGH_ETH_ENTERED: &str = "Lottery__NotEnoughETHEntered()";
/// Custom error: entry while the lottery is calculating
pub const NOT_OPEN: &str = "Lottery__NotOpen()";
/// Custom error: `performUpkeep` while `checkUpkeep` is false
pub const UPKEEP_NOT_NEEDED: &str = "Lottery__UpKeepNotNeeded(uint256,uint256,uint256)";
/// Custom error: payout to the winner failed
pub const TRANSFER_FAILED: &str = "Lottery__TransferFailed()";
/// `require(.., message)` revert
pub const ERROR_STRING: &str = "Error(string)";
/// Compiler-inserted checks (overflow, out-of-bounds access, ..)
pub const PANIC: &str = "Panic(uint256)";

/// Panic code of an out-of-bounds array access
pub const PANIC_ARRAY_OUT_OF_BOUNDS: u64 = 0x32;

/// Message the coordinator mock reverts with for an unknown request id
pub const NONEXISTENT_REQUEST: &str = "nonexistent request";

/// Why a call or transaction reverted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevertReason {
    /// Payment below the entrance fee
    NotEnoughEthEntered,
    /// Lottery is not open
    NotOpen,
    /// Upkeep was not due
    UpkeepNotNeeded {
        /// Contract balance
        balance: U256,
        /// Number of players
        players: U256,
        /// Raw lottery state
        state: U256,
    },
    /// Winner payout failed
    TransferFailed,
    /// `Error(string)`, e.g. "nonexistent request"
    Message(String),
    /// `Panic(uint256)`
    Panic(U256),
    /// Revert data this crate does not know how to read (hex)
    Unknown(String),
}

impl RevertReason {
    /// Decode revert data returned by a node
    pub fn decode(data: &[u8]) -> Self {
        let Some((head, body)) = data.split_first_chunk::<4>() else {
            return Self::Unknown(format!("0x{}", hex::encode(data)));
        };

        if *head == selector(NOT_ENOUGH_ETH_ENTERED) {
            Self::NotEnoughEthEntered
        } else if *head == selector(NOT_OPEN) {
            Self::NotOpen
        } else if *head == selector(TRANSFER_FAILED) {
            Self::TransferFailed
        } else if *head == selector(UPKEEP_NOT_NEEDED) {
            match (
                codec::decode_uint(body, 0),
                codec::decode_uint(body, 1),
                codec::decode_uint(body, 2),
            ) {
                (Ok(balance), Ok(players), Ok(state)) => Self::UpkeepNotNeeded {
                    balance,
                    players,
                    state,
                },
                _ => Self::Unknown(format!("0x{}", hex::encode(data))),
            }
        } else if *head == selector(PANIC) {
            codec::decode_uint(body, 0)
                .map(Self::Panic)
                .unwrap_or_else(|_| Self::Unknown(format!("0x{}", hex::encode(data))))
        } else if *head == selector(ERROR_STRING) {
            decode_error_string(body)
                .map(Self::Message)
                .unwrap_or_else(|| Self::Unknown(format!("0x{}", hex::encode(data))))
        } else {
            Self::Unknown(format!("0x{}", hex::encode(data)))
        }
    }

    /// Revert data a contract would produce for this reason
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::NotEnoughEthEntered => selector(NOT_ENOUGH_ETH_ENTERED).to_vec(),
            Self::NotOpen => selector(NOT_OPEN).to_vec(),
            Self::TransferFailed => selector(TRANSFER_FAILED).to_vec(),
            Self::UpkeepNotNeeded {
                balance,
                players,
                state,
            } => codec::encode_call(
                UPKEEP_NOT_NEEDED,
                &[
                    AbiValue::Uint(*balance),
                    AbiValue::Uint(*players),
                    AbiValue::Uint(*state),
                ],
            ),
            Self::Message(message) => {
                let mut data = codec::encode_call(
                    ERROR_STRING,
                    &[
                        AbiValue::Uint(U256::from(WORD)),
                        AbiValue::Uint(U256::from(message.len())),
                    ],
                );
                let mut tail = message.as_bytes().to_vec();
                tail.resize(message.len().div_ceil(WORD) * WORD, 0);
                data.extend_from_slice(&tail);
                data
            }
            Self::Panic(code) => codec::encode_call(PANIC, &[AbiValue::Uint(*code)]),
            Self::Unknown(raw) => codec::decode_hex(raw).unwrap_or_default(),
        }
    }

    /// Whether the revert carries the given message (case-insensitive),
    /// the way test assertions match `revertedWith(..)`
    pub fn matches(&self, expected: &str) -> bool {
        self.to_string().eq_ignore_ascii_case(expected)
    }
}

fn decode_error_string(body: &[u8]) -> Option<String> {
    let offset = codec::decode_uint(body, 0).ok()?.saturating_to::<usize>();
    let len = U256::from_be_bytes(*body.get(offset..)?.first_chunk::<32>()?).saturating_to::<usize>();
    let start = offset.checked_add(WORD)?;
    let bytes = body.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEnoughEthEntered => f.write_str("Lottery__NotEnoughETHEntered"),
            Self::NotOpen => f.write_str("Lottery__NotOpen"),
            Self::UpkeepNotNeeded { .. } => f.write_str("Lottery__UpKeepNotNeeded"),
            Self::TransferFailed => f.write_str("Lottery__TransferFailed"),
            Self::Message(message) => f.write_str(message),
            Self::Panic(code) => write!(f, "panic code 0x{code:x}"),
            Self::Unknown(raw) => write!(f, "unknown revert {raw}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_custom_errors() {
        assert_eq!(
            RevertReason::decode(&selector(NOT_ENOUGH_ETH_ENTERED)),
            RevertReason::NotEnoughEthEntered
        );
        assert_eq!(RevertReason::decode(&selector(NOT_OPEN)), RevertReason::NotOpen);

        let upkeep = RevertReason::UpkeepNotNeeded {
            balance: U256::from(10),
            players: U256::from(1),
            state: U256::from(1),
        };
        assert_eq!(RevertReason::decode(&upkeep.encode()), upkeep);
    }

    #[test]
    fn test_decode_error_string() {
        let reason = RevertReason::Message(NONEXISTENT_REQUEST.to_string());
        let data = reason.encode();
        assert_eq!(data.len(), 4 + 3 * WORD);
        assert_eq!(RevertReason::decode(&data), reason);
        assert!(reason.matches("Nonexistent Request"));
    }

    #[test]
    fn test_decode_panic() {
        let panic = RevertReason::Panic(U256::from(PANIC_ARRAY_OUT_OF_BOUNDS));
        assert_eq!(RevertReason::decode(&panic.encode()), panic);
        assert_eq!(panic.to_string(), "panic code 0x32");
    }

    #[test]
    fn test_short_or_foreign_data_is_unknown() {
        assert_eq!(RevertReason::decode(&[]), RevertReason::Unknown("0x".to_string()));
        assert!(matches!(
            RevertReason::decode(&[0xde, 0xad, 0xbe, 0xef]),
            RevertReason::Unknown(_)
        ));
    }

    #[test]
    fn test_display_names_match_contract_errors() {
        assert!(RevertReason::NotEnoughEthEntered.matches("Lottery__NotEnoughETHEntered"));
        assert!(RevertReason::NotOpen.matches("Lottery__NotOpen"));
        assert!(RevertReason::UpkeepNotNeeded {
            balance: U256::ZERO,
            players: U256::ZERO,
            state: U256::ZERO,
        }
        .matches("Lottery__UpKeepNotNeeded"));
    }
}
