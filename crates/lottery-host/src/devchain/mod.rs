//! In-process development chain
//!
//! A deterministic stand-in for a local hardhat node with the Lottery and a
//! VRF coordinator mock deployed on it:
//! - funded signer accounts, index 0 is the deployer
//! - automine: one block per transaction, timestamps +1 per block unless
//!   `increase_time` queued an offset for the next block
//! - reverted transactions leave no trace (state is committed only on success)
//! - gas is free
//!
//! Every scenario builds its own chain; nothing is shared between tests.

pub mod coordinator;
pub mod lottery;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use lottery_bindings::{keccak256, Log, LotteryEvent, LotteryState};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{NetworkConfig, DEVELOPMENT_CHAIN_ID};
use crate::contract::{ChainControl, ContractError, EventSubscription, LotteryContract, TxReceipt};
use coordinator::{VrfCoordinatorMock, NUM_WORDS};
use lottery::LotteryStorage;

/// 10,000 ETH in wei
const SIGNER_BALANCE: u128 = 10_000_000_000_000_000_000_000;

/// Dev chain parameters
#[derive(Clone, Debug)]
pub struct DevChainConfig {
    /// Chain id
    pub chain_id: u64,
    /// Number of funded signers
    pub accounts: usize,
    /// Balance of each signer, in wei
    pub initial_balance: U256,
    /// Timestamp of the genesis block
    pub genesis_timestamp: u64,
    /// Lottery entrance fee, in wei
    pub entrance_fee: U256,
    /// Lottery interval, in seconds
    pub interval: u64,
}

impl Default for DevChainConfig {
    fn default() -> Self {
        let network = NetworkConfig::for_chain(DEVELOPMENT_CHAIN_ID);
        Self {
            chain_id: DEVELOPMENT_CHAIN_ID,
            accounts: 20,
            initial_balance: U256::from(SIGNER_BALANCE),
            genesis_timestamp: 1_700_000_000,
            entrance_fee: network
                .as_ref()
                .map_or(U256::from(10_000_000_000_000_000u64), |n| n.entrance_fee),
            interval: network.map_or(30, |n| n.interval),
        }
    }
}

impl DevChainConfig {
    /// Parameters of a known network, deployed locally
    pub fn for_network(network: &NetworkConfig) -> Self {
        Self {
            chain_id: network.chain_id,
            entrance_fee: network.entrance_fee,
            interval: network.interval,
            ..Self::default()
        }
    }
}

/// Deterministic address derived from a label
fn derive_address(label: &str) -> Address {
    Address::from_slice(&keccak256(label.as_bytes())[12..])
}

/// Consensus-relevant chain state. Cloned for each transaction and
/// committed only if the transaction succeeds.
#[derive(Clone, Debug)]
struct ChainState {
    block_number: u64,
    timestamp: u64,
    pending_time: u64,
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, U256>,
    lottery_address: Address,
    coordinator_address: Address,
    lottery: LotteryStorage,
    coordinator: VrfCoordinatorMock,
}

impl ChainState {
    fn mine_block(&mut self) {
        self.block_number += 1;
        self.timestamp += self.pending_time.max(1);
        self.pending_time = 0;
    }

    fn balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), ContractError> {
        let available = self.balance(&from);
        let remaining = available
            .checked_sub(value)
            .ok_or(ContractError::InsufficientFunds { needed: value, available })?;
        self.balances.insert(from, remaining);
        *self.balances.entry(to).or_default() += value;
        Ok(())
    }

    fn lottery_log(&self, event: LotteryEvent) -> Log {
        Log {
            address: self.lottery_address,
            event,
        }
    }

    fn coordinator_log(&self, event: LotteryEvent) -> Log {
        Log {
            address: self.coordinator_address,
            event,
        }
    }
}

#[derive(Debug)]
struct Subscriber {
    address: Address,
    tx: mpsc::UnboundedSender<LotteryEvent>,
}

#[derive(Debug)]
struct ChainInner {
    state: ChainState,
    subscribers: Vec<Subscriber>,
}

/// Local dev chain handle; clones share the same chain
#[derive(Clone, Debug)]
pub struct LocalChain {
    inner: Arc<Mutex<ChainInner>>,
    config: DevChainConfig,
    signers: Vec<Address>,
    lottery_address: Address,
    coordinator_address: Address,
}

impl LocalChain {
    /// Start a chain and deploy the coordinator mock and the Lottery from signer 0
    pub fn deploy(config: DevChainConfig) -> Self {
        let signers: Vec<Address> = (0..config.accounts.max(1))
            .map(|i| derive_address(&format!("devchain/signer/{i}")))
            .collect();
        let coordinator_address = derive_address("devchain/VRFCoordinatorV2Mock");
        let lottery_address = derive_address("devchain/Lottery");

        let mut state = ChainState {
            block_number: 0,
            timestamp: config.genesis_timestamp,
            pending_time: 0,
            nonces: HashMap::new(),
            balances: signers
                .iter()
                .map(|signer| (*signer, config.initial_balance))
                .collect(),
            lottery_address,
            coordinator_address,
            lottery: LotteryStorage::new(config.entrance_fee, config.interval, config.genesis_timestamp),
            coordinator: VrfCoordinatorMock::new(),
        };

        // coordinator mock, then the Lottery
        state.mine_block();
        state.mine_block();
        state.lottery = LotteryStorage::new(config.entrance_fee, config.interval, state.timestamp);

        info!(
            "Dev chain {} ready: Lottery at {}, coordinator at {}, {} signers",
            config.chain_id,
            lottery_address,
            coordinator_address,
            signers.len()
        );

        Self {
            inner: Arc::new(Mutex::new(ChainInner {
                state,
                subscribers: Vec::new(),
            })),
            config,
            signers,
            lottery_address,
            coordinator_address,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChainInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Chain parameters
    pub const fn config(&self) -> &DevChainConfig {
        &self.config
    }

    /// Funded signer accounts; index 0 deployed the contracts
    pub fn signers(&self) -> &[Address] {
        &self.signers
    }

    /// Deployer account
    pub fn deployer(&self) -> Address {
        self.signers[0]
    }

    /// Lottery address
    pub const fn lottery_address(&self) -> Address {
        self.lottery_address
    }

    /// Coordinator mock address
    pub const fn coordinator_address(&self) -> Address {
        self.coordinator_address
    }

    /// Handle to the deployed Lottery
    pub fn lottery(&self) -> LocalLottery {
        LocalLottery { chain: self.clone() }
    }

    /// Latest block number
    pub fn block_number(&self) -> u64 {
        self.lock().state.block_number
    }

    /// Latest block timestamp
    pub fn timestamp(&self) -> u64 {
        self.lock().state.timestamp
    }

    /// Whether a randomness request is still waiting for fulfillment
    pub fn is_request_pending(&self, request_id: U256) -> bool {
        self.lock().state.coordinator.is_pending(&request_id)
    }

    fn view<T>(&self, f: impl FnOnce(&ChainState) -> T) -> T {
        f(&self.lock().state)
    }

    /// Run a transaction: mine a block, move `value` from `from` to `to`,
    /// then apply `f`. State and events are committed only on success.
    fn transact<F>(&self, from: Address, to: Address, value: U256, f: F) -> Result<TxReceipt, ContractError>
    where
        F: FnOnce(&mut ChainState) -> Result<Vec<Log>, ContractError>,
    {
        let mut inner = self.lock();
        let mut next = inner.state.clone();

        next.mine_block();
        next.transfer(from, to, value)?;
        let logs = f(&mut next)?;

        let nonce = next.nonces.entry(from).or_default();
        let mut preimage = from.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        *nonce += 1;

        let receipt = TxReceipt {
            tx_hash: B256::from(keccak256(&preimage)),
            block_number: next.block_number,
            gas_cost: U256::ZERO,
            logs,
        };
        inner.state = next;

        inner.subscribers.retain(|subscriber| !subscriber.tx.is_closed());
        for log in &receipt.logs {
            for subscriber in inner.subscribers.iter().filter(|s| s.address == log.address) {
                // a receiver dropped mid-loop is pruned on the next transaction
                let _ = subscriber.tx.send(log.event.clone());
            }
        }

        debug!(
            "Block {} mined: tx=0x{} logs={}",
            receipt.block_number,
            hex::encode(&receipt.tx_hash[..4]),
            receipt.logs.len()
        );
        Ok(receipt)
    }

    fn subscribe_to(&self, address: Address) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(Subscriber { address, tx });
        EventSubscription::new(rx)
    }

    /// Coordinator mock fulfillment: deliver words for `request_id` to `consumer`.
    ///
    /// Unknown ids revert with "nonexistent request". A consumer callback that
    /// cannot complete is reported through `RandomWordsFulfilled { success: false }`.
    pub fn fulfill(&self, request_id: U256, consumer: Address, words: &[U256]) -> Result<TxReceipt, ContractError> {
        let caller = self.deployer();
        let coordinator = self.coordinator_address;

        self.transact(caller, coordinator, U256::ZERO, |state| {
            let (request, words) = state
                .coordinator
                .fulfill(request_id, words)
                .map_err(ContractError::Revert)?;

            let mut logs = Vec::new();
            let mut success = false;
            if consumer == state.lottery_address && request.consumer == consumer {
                let now = state.timestamp;
                if let Some(winner) = state.lottery.fulfill(now, &words) {
                    let pot = state.balance(&state.lottery_address);
                    let lottery_address = state.lottery_address;
                    state.transfer(lottery_address, winner, pot)?;
                    logs.push(state.lottery_log(LotteryEvent::WinnerPicked { winner }));
                    success = true;
                }
            }
            logs.push(state.coordinator_log(LotteryEvent::RandomWordsFulfilled { request_id, success }));
            Ok(logs)
        })
    }

    /// Emulate keepers + VRF on a live network: every `poll`, perform upkeep
    /// when due and fulfill the resulting request. Stops when the handle is dropped.
    pub fn spawn_automation(&self, poll: Duration) -> AutomationHandle {
        let chain = self.clone();
        let keeper = derive_address("devchain/keeper");
        let task = tokio::spawn(async move {
            let lottery = chain.lottery();
            let mut ticker = tokio::time::interval(poll);
            loop {
                ticker.tick().await;
                match lottery.check_upkeep().await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        warn!("Automation: checkUpkeep failed: {}", e);
                        continue;
                    }
                }

                let receipt = match lottery.perform_upkeep(keeper).await {
                    Ok(receipt) => receipt,
                    Err(e) => {
                        warn!("Automation: performUpkeep failed: {}", e);
                        continue;
                    }
                };
                let Some(request_id) = receipt.request_id() else {
                    warn!("Automation: upkeep receipt carried no request id");
                    continue;
                };
                info!("Automation: upkeep performed, request {}", request_id);

                if let Err(e) = chain.fulfill(request_id, chain.lottery_address, &[]) {
                    warn!("Automation: fulfillment of request {} failed: {}", request_id, e);
                }
            }
        });
        AutomationHandle { task }
    }
}

/// Running automation task; aborted on drop
#[derive(Debug)]
pub struct AutomationHandle {
    task: JoinHandle<()>,
}

impl Drop for AutomationHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl ChainControl for LocalChain {
    async fn increase_time(&self, seconds: u64) -> Result<(), ContractError> {
        self.lock().state.pending_time += seconds;
        Ok(())
    }

    async fn mine(&self) -> Result<(), ContractError> {
        self.lock().state.mine_block();
        Ok(())
    }

    async fn fulfill_random_words(&self, request_id: U256, consumer: Address) -> Result<TxReceipt, ContractError> {
        self.fulfill(request_id, consumer, &[])
    }

    async fn fulfill_random_words_with(
        &self,
        request_id: U256,
        consumer: Address,
        words: &[U256],
    ) -> Result<TxReceipt, ContractError> {
        self.fulfill(request_id, consumer, words)
    }
}

/// The Lottery deployed on a [`LocalChain`]
#[derive(Clone, Debug)]
pub struct LocalLottery {
    chain: LocalChain,
}

impl LocalLottery {
    /// Chain the contract lives on
    pub const fn chain(&self) -> &LocalChain {
        &self.chain
    }
}

#[async_trait]
impl LotteryContract for LocalLottery {
    fn address(&self) -> Address {
        self.chain.lottery_address
    }

    async fn enter_raffle(&self, from: Address, value: U256) -> Result<TxReceipt, ContractError> {
        let lottery = self.chain.lottery_address;
        self.chain.transact(from, lottery, value, |state| {
            state.lottery.enter(from, value).map_err(ContractError::Revert)?;
            Ok(vec![state.lottery_log(LotteryEvent::RaffleEnter { player: from })])
        })
    }

    async fn check_upkeep(&self) -> Result<bool, ContractError> {
        Ok(self.chain.view(|state| {
            state
                .lottery
                .check_upkeep(state.timestamp, state.balance(&state.lottery_address))
        }))
    }

    async fn perform_upkeep(&self, from: Address) -> Result<TxReceipt, ContractError> {
        let lottery = self.chain.lottery_address;
        self.chain.transact(from, lottery, U256::ZERO, |state| {
            let balance = state.balance(&state.lottery_address);
            state
                .lottery
                .perform_upkeep(state.timestamp, balance)
                .map_err(ContractError::Revert)?;

            let request_id = state
                .coordinator
                .request_random_words(state.lottery_address, NUM_WORDS);
            Ok(vec![
                state.coordinator_log(LotteryEvent::RandomWordsRequested {
                    request_id,
                    sender: state.lottery_address,
                }),
                state.lottery_log(LotteryEvent::RequestedLotteryWinner { request_id }),
            ])
        })
    }

    async fn entrance_fee(&self) -> Result<U256, ContractError> {
        Ok(self.chain.view(|state| state.lottery.entrance_fee()))
    }

    async fn interval(&self) -> Result<U256, ContractError> {
        Ok(self.chain.view(|state| U256::from(state.lottery.interval())))
    }

    async fn lottery_state(&self) -> Result<LotteryState, ContractError> {
        Ok(self.chain.view(|state| state.lottery.state()))
    }

    async fn player(&self, index: u64) -> Result<Address, ContractError> {
        self.chain
            .view(|state| state.lottery.player(index))
            .map_err(ContractError::Revert)
    }

    async fn recent_winner(&self) -> Result<Address, ContractError> {
        Ok(self.chain.view(|state| state.lottery.recent_winner()))
    }

    async fn number_of_players(&self) -> Result<U256, ContractError> {
        Ok(self.chain.view(|state| U256::from(state.lottery.number_of_players())))
    }

    async fn latest_timestamp(&self) -> Result<U256, ContractError> {
        Ok(self.chain.view(|state| U256::from(state.lottery.last_timestamp())))
    }

    async fn balance_of(&self, account: Address) -> Result<U256, ContractError> {
        Ok(self.chain.view(|state| state.balance(&account)))
    }

    async fn subscribe(&self) -> Result<EventSubscription, ContractError> {
        Ok(self.chain.subscribe_to(self.chain.lottery_address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lottery_bindings::RevertReason;

    fn chain() -> LocalChain {
        LocalChain::deploy(DevChainConfig {
            accounts: 4,
            ..DevChainConfig::default()
        })
    }

    #[test]
    fn test_deploy_is_deterministic() {
        let a = chain();
        let b = chain();
        assert_eq!(a.signers(), b.signers());
        assert_eq!(a.lottery_address(), b.lottery_address());
        assert_eq!(a.signers().len(), 4);
        assert_eq!(a.block_number(), 2);
    }

    #[tokio::test]
    async fn test_reverted_transaction_is_not_committed() {
        let chain = chain();
        let lottery = chain.lottery();
        let player = chain.signers()[1];
        let before = lottery.balance_of(player).await.unwrap();
        let block = chain.block_number();

        let err = lottery.enter_raffle(player, U256::from(1)).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some(&RevertReason::NotEnoughEthEntered));
        assert_eq!(lottery.balance_of(player).await.unwrap(), before);
        assert_eq!(chain.block_number(), block);
    }

    #[tokio::test]
    async fn test_transfer_needs_funds() {
        let chain = chain();
        let lottery = chain.lottery();
        let broke = derive_address("nobody");
        let fee = lottery.entrance_fee().await.unwrap();
        let err = lottery.enter_raffle(broke, fee).await.unwrap_err();
        assert!(matches!(err, ContractError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn test_time_travel_applies_to_next_block() {
        let chain = chain();
        let start = chain.timestamp();
        chain.increase_time(100).await.unwrap();
        assert_eq!(chain.timestamp(), start);
        chain.mine().await.unwrap();
        assert_eq!(chain.timestamp(), start + 100);
        chain.mine().await.unwrap();
        assert_eq!(chain.timestamp(), start + 101);
    }

    #[tokio::test]
    async fn test_subscription_receives_only_lottery_events() {
        let chain = chain();
        let lottery = chain.lottery();
        let mut subscription = lottery.subscribe().await.unwrap();
        let player = chain.signers()[1];
        let fee = lottery.entrance_fee().await.unwrap();

        lottery.enter_raffle(player, fee).await.unwrap();
        chain.increase_time(chain.config().interval + 1).await.unwrap();
        chain.mine().await.unwrap();
        lottery.perform_upkeep(chain.deployer()).await.unwrap();

        assert_eq!(subscription.recv().await, Some(LotteryEvent::RaffleEnter { player }));
        assert!(matches!(
            subscription.recv().await,
            Some(LotteryEvent::RequestedLotteryWinner { .. })
        ));
    }

    #[tokio::test]
    async fn test_fulfill_for_foreign_consumer_reports_failure() {
        let chain = chain();
        let lottery = chain.lottery();
        let fee = lottery.entrance_fee().await.unwrap();
        lottery.enter_raffle(chain.signers()[1], fee).await.unwrap();
        chain.increase_time(chain.config().interval + 1).await.unwrap();
        chain.mine().await.unwrap();
        let request_id = lottery
            .perform_upkeep(chain.deployer())
            .await
            .unwrap()
            .request_id()
            .unwrap();

        let receipt = chain
            .fulfill_random_words(request_id, Address::repeat_byte(0xee))
            .await
            .unwrap();
        assert_eq!(
            receipt.events().last(),
            Some(&LotteryEvent::RandomWordsFulfilled { request_id, success: false })
        );
        assert_eq!(lottery.lottery_state().await.unwrap(), LotteryState::Calculating);
    }
}
