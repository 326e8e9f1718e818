//! Contract and chain-control interfaces
//!
//! Orchestration code is written against these traits so the same scenario
//! runs on the in-process dev chain and on a JSON-RPC node.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use lottery_bindings::{DecodeError, Log, LotteryEvent, LotteryState, RevertReason};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Contract interaction error
#[derive(Debug, Error)]
pub enum ContractError {
    /// The call or transaction reverted
    #[error("execution reverted: {0}")]
    Revert(RevertReason),
    /// Sender cannot cover the transaction value
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Value of the transaction
        needed: U256,
        /// Sender balance
        available: U256,
    },
    /// Transport or node error
    #[error("rpc error: {0}")]
    Rpc(String),
    /// Malformed response
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// Receipt or event did not arrive in time
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl ContractError {
    /// Revert reason, if this is a revert
    pub const fn revert_reason(&self) -> Option<&RevertReason> {
        match self {
            Self::Revert(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether this is a revert with the given error name or message
    pub fn is_revert_with(&self, expected: &str) -> bool {
        self.revert_reason().is_some_and(|reason| reason.matches(expected))
    }
}

impl From<reqwest::Error> for ContractError {
    fn from(e: reqwest::Error) -> Self {
        Self::Rpc(e.to_string())
    }
}

/// Mined transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: B256,
    /// Block the transaction was included in
    pub block_number: u64,
    /// `gasUsed * effectiveGasPrice`, in wei
    pub gas_cost: U256,
    /// Decoded logs, in emission order
    pub logs: Vec<Log>,
}

impl TxReceipt {
    /// Decoded events, in emission order
    pub fn events(&self) -> impl Iterator<Item = &LotteryEvent> {
        self.logs.iter().map(|log| &log.event)
    }

    /// Request id carried by `RequestedLotteryWinner`
    pub fn request_id(&self) -> Option<U256> {
        self.events().find_map(|event| match event {
            LotteryEvent::RequestedLotteryWinner { request_id } => Some(*request_id),
            _ => None,
        })
    }
}

/// Live stream of a contract's events.
///
/// The subscription is active as soon as it is returned; dropping it
/// unsubscribes (and stops the log poller, if any).
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<LotteryEvent>,
    poller: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Subscription fed directly by the event source
    pub const fn new(rx: mpsc::UnboundedReceiver<LotteryEvent>) -> Self {
        Self { rx, poller: None }
    }

    /// Subscription fed by a background poller owned by the subscription
    pub const fn with_poller(rx: mpsc::UnboundedReceiver<LotteryEvent>, poller: JoinHandle<()>) -> Self {
        Self {
            rx,
            poller: Some(poller),
        }
    }

    /// Next event; `None` once the source has gone away
    pub async fn recv(&mut self) -> Option<LotteryEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

/// Lottery contract interface
#[async_trait]
pub trait LotteryContract: Send + Sync {
    /// Contract address
    fn address(&self) -> Address;

    /// `enterRaffle()` paying `value`
    async fn enter_raffle(&self, from: Address, value: U256) -> Result<TxReceipt, ContractError>;

    /// `checkUpkeep("0x")`, evaluated as a call
    async fn check_upkeep(&self) -> Result<bool, ContractError>;

    /// `performUpkeep([])`
    async fn perform_upkeep(&self, from: Address) -> Result<TxReceipt, ContractError>;

    /// `getEntranceFee()`
    async fn entrance_fee(&self) -> Result<U256, ContractError>;

    /// `getInterval()`
    async fn interval(&self) -> Result<U256, ContractError>;

    /// `getLotteryState()`
    async fn lottery_state(&self) -> Result<LotteryState, ContractError>;

    /// `getPlayer(index)`; reverts when out of bounds
    async fn player(&self, index: u64) -> Result<Address, ContractError>;

    /// `getRecentWinner()`
    async fn recent_winner(&self) -> Result<Address, ContractError>;

    /// `getNumberOfPlayers()`
    async fn number_of_players(&self) -> Result<U256, ContractError>;

    /// `getLatestTimeStamp()`
    async fn latest_timestamp(&self) -> Result<U256, ContractError>;

    /// Native balance of any account
    async fn balance_of(&self, account: Address) -> Result<U256, ContractError>;

    /// Subscribe to the contract's events emitted from now on
    async fn subscribe(&self) -> Result<EventSubscription, ContractError>;
}

/// Development-chain controls: time travel, mining and the VRF coordinator mock
#[async_trait]
pub trait ChainControl: Send + Sync {
    /// `evm_increaseTime`
    async fn increase_time(&self, seconds: u64) -> Result<(), ContractError>;

    /// `evm_mine`
    async fn mine(&self) -> Result<(), ContractError>;

    /// Coordinator mock `fulfillRandomWords(requestId, consumer)` with derived words
    async fn fulfill_random_words(
        &self,
        request_id: U256,
        consumer: Address,
    ) -> Result<TxReceipt, ContractError>;

    /// Coordinator mock fulfillment with caller-chosen words
    async fn fulfill_random_words_with(
        &self,
        request_id: U256,
        consumer: Address,
        words: &[U256],
    ) -> Result<TxReceipt, ContractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_request_id() {
        let receipt = TxReceipt {
            tx_hash: B256::ZERO,
            block_number: 3,
            gas_cost: U256::ZERO,
            logs: vec![
                Log {
                    address: Address::repeat_byte(1),
                    event: LotteryEvent::RandomWordsRequested {
                        request_id: U256::from(9),
                        sender: Address::repeat_byte(2),
                    },
                },
                Log {
                    address: Address::repeat_byte(2),
                    event: LotteryEvent::RequestedLotteryWinner { request_id: U256::from(9) },
                },
            ],
        };
        assert_eq!(receipt.request_id(), Some(U256::from(9)));
        assert_eq!(receipt.events().count(), 2);
    }

    #[test]
    fn test_revert_matching() {
        let err = ContractError::Revert(RevertReason::NotOpen);
        assert!(err.is_revert_with("Lottery__NotOpen"));
        assert!(!err.is_revert_with("Lottery__NotEnoughETHEntered"));
        assert!(!ContractError::Rpc("boom".into()).is_revert_with("boom"));
    }

    #[tokio::test]
    async fn test_dropping_subscription_closes_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = EventSubscription::new(rx);
        assert!(!tx.is_closed());
        drop(subscription);
        assert!(tx.is_closed());
        assert!(tx.send(LotteryEvent::WinnerPicked { winner: Address::ZERO }).is_err());
    }
}
