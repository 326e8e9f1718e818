//! Lottery and coordinator events

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::abi::event_topic;
use crate::codec::{self, AbiValue, DecodeError};

/// Event kind, used to filter subscriptions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `RaffleEnter(address indexed player)`
    RaffleEnter,
    /// `RequestedLotteryWinner(uint256 indexed requestId)`
    RequestedLotteryWinner,
    /// `WinnerPicked(address indexed winner)`
    WinnerPicked,
    /// Coordinator: `RandomWordsRequested(..)`
    RandomWordsRequested,
    /// Coordinator: `RandomWordsFulfilled(..)`
    RandomWordsFulfilled,
}

impl EventKind {
    /// All kinds, in declaration order
    pub const ALL: [Self; 5] = [
        Self::RaffleEnter,
        Self::RequestedLotteryWinner,
        Self::WinnerPicked,
        Self::RandomWordsRequested,
        Self::RandomWordsFulfilled,
    ];

    /// Canonical event signature
    pub const fn signature(self) -> &'static str {
        match self {
            Self::RaffleEnter => "RaffleEnter(address)",
            Self::RequestedLotteryWinner => "RequestedLotteryWinner(uint256)",
            Self::WinnerPicked => "WinnerPicked(address)",
            Self::RandomWordsRequested => {
                "RandomWordsRequested(bytes32,uint256,uint256,uint64,uint16,uint32,uint32,address)"
            }
            Self::RandomWordsFulfilled => "RandomWordsFulfilled(uint256,uint256,uint96,bool)",
        }
    }

    /// Topic 0
    pub fn topic(self) -> B256 {
        event_topic(self.signature())
    }

    /// Look up the kind of a topic 0
    pub fn from_topic(topic: &B256) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == *topic)
    }
}

/// Decoded event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotteryEvent {
    /// A player entered the raffle
    RaffleEnter {
        /// Entrant
        player: Address,
    },
    /// Upkeep requested randomness
    RequestedLotteryWinner {
        /// Coordinator request id
        request_id: U256,
    },
    /// Fulfillment picked a winner and paid out
    WinnerPicked {
        /// Recipient of the pot
        winner: Address,
    },
    /// The coordinator accepted a randomness request
    RandomWordsRequested {
        /// Assigned request id
        request_id: U256,
        /// Requesting consumer
        sender: Address,
    },
    /// The coordinator delivered random words
    RandomWordsFulfilled {
        /// Fulfilled request id
        request_id: U256,
        /// Whether the consumer callback succeeded
        success: bool,
    },
}

impl LotteryEvent {
    /// Kind of this event
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::RaffleEnter { .. } => EventKind::RaffleEnter,
            Self::RequestedLotteryWinner { .. } => EventKind::RequestedLotteryWinner,
            Self::WinnerPicked { .. } => EventKind::WinnerPicked,
            Self::RandomWordsRequested { .. } => EventKind::RandomWordsRequested,
            Self::RandomWordsFulfilled { .. } => EventKind::RandomWordsFulfilled,
        }
    }

    /// Decode a raw log. Returns `Ok(None)` for logs of other events.
    pub fn decode(topics: &[B256], data: &[u8]) -> Result<Option<Self>, DecodeError> {
        let Some(kind) = topics.first().and_then(EventKind::from_topic) else {
            return Ok(None);
        };

        let topic = |index: usize| -> Result<[u8; 32], DecodeError> {
            topics.get(index).map(|t| t.0).ok_or(DecodeError::ShortData {
                needed: index + 1,
                actual: topics.len(),
            })
        };

        let event = match kind {
            EventKind::RaffleEnter => Self::RaffleEnter {
                player: codec::decode_address(&topic(1)?, 0)?,
            },
            EventKind::RequestedLotteryWinner => Self::RequestedLotteryWinner {
                request_id: U256::from_be_bytes(topic(1)?),
            },
            EventKind::WinnerPicked => Self::WinnerPicked {
                winner: codec::decode_address(&topic(1)?, 0)?,
            },
            EventKind::RandomWordsRequested => Self::RandomWordsRequested {
                request_id: codec::decode_uint(data, 0)?,
                sender: codec::decode_address(&topic(3)?, 0)?,
            },
            EventKind::RandomWordsFulfilled => Self::RandomWordsFulfilled {
                request_id: U256::from_be_bytes(topic(1)?),
                success: codec::decode_bool(data, 2)?,
            },
        };
        Ok(Some(event))
    }

    /// Raw `(topics, data)` of this event as a node would return it.
    ///
    /// Fields the decoded form does not carry (key hash, seeds, payment) are zero.
    pub fn encode(&self) -> (Vec<B256>, Vec<u8>) {
        let topic0 = self.kind().topic();
        let address_topic = |address: &Address| B256::from(AbiValue::Address(*address).to_word());
        let uint_topic = |value: &U256| B256::from(value.to_be_bytes::<32>());

        match self {
            Self::RaffleEnter { player } => (vec![topic0, address_topic(player)], vec![]),
            Self::RequestedLotteryWinner { request_id } => {
                (vec![topic0, uint_topic(request_id)], vec![])
            }
            Self::WinnerPicked { winner } => (vec![topic0, address_topic(winner)], vec![]),
            Self::RandomWordsRequested { request_id, sender } => {
                let data = codec::encode(&[
                    AbiValue::Uint(*request_id),
                    AbiValue::Uint(U256::ZERO),
                    AbiValue::Uint(U256::ZERO),
                    AbiValue::Uint(U256::ZERO),
                    AbiValue::Uint(U256::from(1)),
                ]);
                (
                    vec![topic0, B256::ZERO, B256::ZERO, address_topic(sender)],
                    data,
                )
            }
            Self::RandomWordsFulfilled { request_id, success } => {
                let data = codec::encode(&[
                    AbiValue::Uint(U256::ZERO),
                    AbiValue::Uint(U256::ZERO),
                    AbiValue::Bool(*success),
                ]);
                (vec![topic0, uint_topic(request_id)], data)
            }
        }
    }
}

/// A decoded log with its emitting contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Decoded event
    pub event: LotteryEvent,
}
