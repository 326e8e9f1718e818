//! Draw orchestration
//!
//! Two flows drive the Lottery through a full round:
//! - [`run_local_draw`]: a development chain where the caller plays keeper
//!   and VRF coordinator (time travel, `performUpkeep`, mock fulfillment)
//! - [`run_live_draw`]: a live network where keepers and VRF are external;
//!   the flow enters once and waits for `WinnerPicked` with a bound
//!
//! Both only gather observations; `check` on the returned report turns them
//! into pass/fail so an assertion failure stays distinct from a timeout.

use std::time::Duration;

use alloy_primitives::{Address, U256};
use lottery_bindings::{EventKind, LotteryEvent, LotteryState};
use thiserror::Error;
use tracing::{debug, info};

use crate::contract::{ChainControl, ContractError, LotteryContract};
use crate::devchain::{DevChainConfig, LocalChain, LocalLottery};
use crate::listener::{PendingEvent, WaitError};

/// Scenario failure
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// A contract call failed unexpectedly
    #[error(transparent)]
    Contract(#[from] ContractError),
    /// The terminal event never arrived
    #[error(transparent)]
    Wait(#[from] WaitError),
    /// The observed state contradicts the expected outcome
    #[error("assertion failed: {0}")]
    Assertion(String),
    /// `performUpkeep` receipt had no `RequestedLotteryWinner`
    #[error("upkeep receipt carried no request id")]
    MissingRequestId,
}

impl ScenarioError {
    /// Whether the wait for the terminal event timed out
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Wait(WaitError::Timeout { .. }))
    }
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), ScenarioError> {
    if condition {
        Ok(())
    } else {
        Err(ScenarioError::Assertion(message()))
    }
}

/// A freshly deployed Lottery on its own dev chain
#[derive(Debug)]
pub struct LocalFixture {
    /// The chain
    pub chain: LocalChain,
    /// The deployed Lottery
    pub lottery: LocalLottery,
    /// Deployer, signer 0
    pub deployer: Address,
    /// All signers, deployer first
    pub accounts: Vec<Address>,
    /// `getEntranceFee()`
    pub entrance_fee: U256,
    /// `getInterval()`
    pub interval: U256,
}

impl LocalFixture {
    /// Deploy a new chain
    pub async fn deploy(config: DevChainConfig) -> Result<Self, ContractError> {
        let chain = LocalChain::deploy(config);
        let lottery = chain.lottery();
        let entrance_fee = lottery.entrance_fee().await?;
        let interval = lottery.interval().await?;

        Ok(Self {
            deployer: chain.deployer(),
            accounts: chain.signers().to_vec(),
            chain,
            lottery,
            entrance_fee,
            interval,
        })
    }

    /// Enter the raffle from `player` paying the entrance fee
    pub async fn enter(&self, player: Address) -> Result<(), ContractError> {
        self.lottery.enter_raffle(player, self.entrance_fee).await?;
        Ok(())
    }

    /// Move time past the interval and mine
    pub async fn advance_past_interval(&self) -> Result<(), ContractError> {
        advance_past_interval(&self.chain, self.interval).await
    }
}

/// `evm_increaseTime(interval + 1)` then `evm_mine`
pub async fn advance_past_interval<C>(control: &C, interval: U256) -> Result<(), ContractError>
where
    C: ChainControl + ?Sized,
{
    control
        .increase_time(interval.saturating_to::<u64>().saturating_add(1))
        .await?;
    control.mine().await
}

/// Observations of a keeper-driven draw
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawReport {
    /// Request id from the upkeep receipt
    pub request_id: U256,
    /// Entrants, in entry order
    pub entrants: Vec<Address>,
    /// Entrance fee paid by each entrant
    pub entrance_fee: U256,
    /// Winner the fulfillment word points at, when the word was chosen
    pub expected_winner: Option<Address>,
    /// Winner carried by `WinnerPicked`
    pub event_winner: Address,
    /// `getRecentWinner()` after the draw
    pub recent_winner: Address,
    /// `getNumberOfPlayers()` after the draw
    pub players_after: U256,
    /// `getLotteryState()` after the draw
    pub state_after: LotteryState,
    /// `getLatestTimeStamp()` before upkeep
    pub starting_timestamp: U256,
    /// `getLatestTimeStamp()` after the draw
    pub ending_timestamp: U256,
    /// Winner's balance between upkeep and fulfillment
    pub winner_starting_balance: U256,
    /// Winner's balance after the draw
    pub winner_ending_balance: U256,
}

impl DrawReport {
    /// Whole pot: one fee per entrant
    pub fn pot(&self) -> U256 {
        self.entrance_fee * U256::from(self.entrants.len())
    }

    /// Check the post-draw state
    pub fn check(&self) -> Result<(), ScenarioError> {
        ensure(self.entrants.contains(&self.event_winner), || {
            format!("winner {} is not an entrant", self.event_winner)
        })?;
        ensure(self.recent_winner == self.event_winner, || {
            format!(
                "recent winner {} differs from event winner {}",
                self.recent_winner, self.event_winner
            )
        })?;
        if let Some(expected) = self.expected_winner {
            ensure(self.event_winner == expected, || {
                format!("expected winner {expected}, got {}", self.event_winner)
            })?;
        }
        ensure(self.players_after.is_zero(), || {
            format!("{} players left after the draw", self.players_after)
        })?;
        ensure(self.state_after == LotteryState::Open, || {
            format!("lottery is {} after the draw", self.state_after)
        })?;
        ensure(self.ending_timestamp > self.starting_timestamp, || {
            format!(
                "timestamp did not advance ({} -> {})",
                self.starting_timestamp, self.ending_timestamp
            )
        })?;
        let expected_balance = self.winner_starting_balance + self.pot();
        ensure(self.winner_ending_balance == expected_balance, || {
            format!(
                "winner balance {} != {} + pot {}",
                self.winner_ending_balance,
                self.winner_starting_balance,
                self.pot()
            )
        })
    }
}

/// Drive a full round on a development chain.
///
/// Every entrant pays the fee, time moves past the interval, `caller`
/// performs upkeep, and the coordinator mock fulfills the request, with
/// `random_word` when given. The `WinnerPicked` listener is registered
/// before upkeep. The account behind `control` should not be an entrant,
/// its fulfillment gas would skew the winner's balance.
pub async fn run_local_draw<L, C>(
    lottery: &L,
    control: &C,
    caller: Address,
    entrants: &[Address],
    random_word: Option<U256>,
    timeout: Duration,
) -> Result<DrawReport, ScenarioError>
where
    L: LotteryContract + ?Sized,
    C: ChainControl + ?Sized,
{
    let entrance_fee = lottery.entrance_fee().await?;
    for entrant in entrants {
        lottery.enter_raffle(*entrant, entrance_fee).await?;
    }
    advance_past_interval(control, lottery.interval().await?).await?;

    let starting_timestamp = lottery.latest_timestamp().await?;
    let pending = PendingEvent::register(lottery, EventKind::WinnerPicked).await?;

    let receipt = lottery.perform_upkeep(caller).await?;
    let request_id = receipt.request_id().ok_or(ScenarioError::MissingRequestId)?;
    info!("Upkeep performed, request {}", request_id);

    let mut starting_balances = Vec::with_capacity(entrants.len());
    for entrant in entrants {
        starting_balances.push((*entrant, lottery.balance_of(*entrant).await?));
    }

    let expected_winner = random_word.and_then(|word| {
        let count = U256::from(entrants.len());
        (!count.is_zero()).then(|| entrants[(word % count).saturating_to::<usize>()])
    });
    let fulfillment = match random_word {
        Some(word) => {
            control
                .fulfill_random_words_with(request_id, lottery.address(), &[word])
                .await?
        }
        None => control.fulfill_random_words(request_id, lottery.address()).await?,
    };
    debug!("Request {} fulfilled in block {}", request_id, fulfillment.block_number);

    let LotteryEvent::WinnerPicked { winner } = pending.wait(timeout).await? else {
        return Err(ScenarioError::Assertion("listener resolved on a foreign event".to_string()));
    };
    info!("WinnerPicked: {}", winner);

    let winner_starting_balance = starting_balances
        .iter()
        .find(|(entrant, _)| *entrant == winner)
        .map(|(_, balance)| *balance)
        .unwrap_or_default();

    let report = DrawReport {
        request_id,
        entrants: entrants.to_vec(),
        entrance_fee,
        expected_winner,
        event_winner: winner,
        recent_winner: lottery.recent_winner().await?,
        players_after: lottery.number_of_players().await?,
        state_after: lottery.lottery_state().await?,
        starting_timestamp,
        ending_timestamp: lottery.latest_timestamp().await?,
        winner_starting_balance,
        winner_ending_balance: lottery.balance_of(winner).await?,
    };
    debug!("Draw report: {:?}", report);
    Ok(report)
}

/// Observations of a draw run by live keepers and VRF
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveDrawReport {
    /// Account that entered
    pub player: Address,
    /// Fee it paid
    pub entrance_fee: U256,
    /// Winner carried by `WinnerPicked`
    pub event_winner: Address,
    /// `getRecentWinner()` after the draw
    pub recent_winner: Address,
    /// Whether `getPlayer(0)` reverted after the draw
    pub players_cleared: bool,
    /// `getLotteryState()` after the draw
    pub state_after: LotteryState,
    /// `getLatestTimeStamp()` before entering
    pub starting_timestamp: U256,
    /// `getLatestTimeStamp()` after the draw
    pub ending_timestamp: U256,
    /// Player's balance right after entering
    pub winner_starting_balance: U256,
    /// Player's balance after the draw
    pub winner_ending_balance: U256,
}

impl LiveDrawReport {
    /// Check the post-draw state: the sole entrant won back its fee
    pub fn check(&self) -> Result<(), ScenarioError> {
        ensure(self.players_cleared, || "getPlayer(0) did not revert".to_string())?;
        ensure(self.recent_winner == self.player, || {
            format!("recent winner {} is not the player {}", self.recent_winner, self.player)
        })?;
        ensure(self.state_after == LotteryState::Open, || {
            format!("lottery is {} after the draw", self.state_after)
        })?;
        let expected_balance = self.winner_starting_balance + self.entrance_fee;
        ensure(self.winner_ending_balance == expected_balance, || {
            format!(
                "winner balance {} != {} + fee {}",
                self.winner_ending_balance, self.winner_starting_balance, self.entrance_fee
            )
        })?;
        ensure(self.ending_timestamp > self.starting_timestamp, || {
            format!(
                "timestamp did not advance ({} -> {})",
                self.starting_timestamp, self.ending_timestamp
            )
        })
    }
}

/// Enter once from `player` and wait up to `timeout` for the external
/// keepers and VRF to pick a winner.
pub async fn run_live_draw<L>(lottery: &L, player: Address, timeout: Duration) -> Result<LiveDrawReport, ScenarioError>
where
    L: LotteryContract + ?Sized,
{
    let entrance_fee = lottery.entrance_fee().await?;
    let starting_timestamp = lottery.latest_timestamp().await?;
    let balance_before = lottery.balance_of(player).await?;

    // listener goes live before the entry is sent
    let pending = PendingEvent::register(lottery, EventKind::WinnerPicked).await?;
    let receipt = lottery.enter_raffle(player, entrance_fee).await?;
    info!("Entered the raffle in block {}, waiting for WinnerPicked...", receipt.block_number);

    // derived from the receipt, the draw may already have paid out
    let winner_starting_balance = balance_before
        .saturating_sub(entrance_fee)
        .saturating_sub(receipt.gas_cost);

    let LotteryEvent::WinnerPicked { winner } = pending.wait(timeout).await? else {
        return Err(ScenarioError::Assertion("listener resolved on a foreign event".to_string()));
    };
    info!("WinnerPicked event fired: {}", winner);

    let players_cleared = match lottery.player(0).await {
        Ok(_) => false,
        Err(ContractError::Revert(_)) => true,
        Err(e) => return Err(e.into()),
    };

    Ok(LiveDrawReport {
        player,
        entrance_fee,
        event_winner: winner,
        recent_winner: lottery.recent_winner().await?,
        players_cleared,
        state_after: lottery.lottery_state().await?,
        starting_timestamp,
        ending_timestamp: lottery.latest_timestamp().await?,
        winner_starting_balance,
        winner_ending_balance: lottery.balance_of(player).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> DrawReport {
        let entrants = vec![Address::repeat_byte(1), Address::repeat_byte(2)];
        DrawReport {
            request_id: U256::from(1),
            entrance_fee: U256::from(10),
            expected_winner: Some(entrants[1]),
            event_winner: entrants[1],
            recent_winner: entrants[1],
            entrants,
            players_after: U256::ZERO,
            state_after: LotteryState::Open,
            starting_timestamp: U256::from(100),
            ending_timestamp: U256::from(131),
            winner_starting_balance: U256::from(1_000),
            winner_ending_balance: U256::from(1_020),
        }
    }

    #[test]
    fn test_consistent_report_passes() {
        report().check().unwrap();
        assert_eq!(report().pot(), U256::from(20));
    }

    #[test]
    fn test_each_violation_is_an_assertion() {
        let broken = [
            DrawReport { players_after: U256::from(1), ..report() },
            DrawReport { state_after: LotteryState::Calculating, ..report() },
            DrawReport { ending_timestamp: U256::from(100), ..report() },
            DrawReport { winner_ending_balance: U256::from(1_010), ..report() },
            DrawReport { expected_winner: Some(Address::repeat_byte(1)), ..report() },
            DrawReport { recent_winner: Address::ZERO, ..report() },
        ];
        for report in broken {
            assert!(matches!(report.check(), Err(ScenarioError::Assertion(_))), "{report:?}");
        }
    }

    #[test]
    fn test_live_report_requires_cleared_players() {
        let report = LiveDrawReport {
            player: Address::repeat_byte(1),
            entrance_fee: U256::from(10),
            event_winner: Address::repeat_byte(1),
            recent_winner: Address::repeat_byte(1),
            players_cleared: true,
            state_after: LotteryState::Open,
            starting_timestamp: U256::from(1),
            ending_timestamp: U256::from(2),
            winner_starting_balance: U256::from(90),
            winner_ending_balance: U256::from(100),
        };
        report.check().unwrap();
        let stale = LiveDrawReport { players_cleared: false, ..report };
        assert!(matches!(stale.check(), Err(ScenarioError::Assertion(_))));
    }

    #[test]
    fn test_timeout_is_not_an_assertion() {
        let err = ScenarioError::from(WaitError::Timeout {
            kind: EventKind::WinnerPicked,
            timeout: Duration::from_secs(1),
        });
        assert!(err.is_timeout());
        assert!(!ScenarioError::Assertion("x".into()).is_timeout());
    }
}
