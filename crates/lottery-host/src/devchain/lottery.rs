//! Lottery contract storage and transitions on the dev chain

use alloy_primitives::{Address, U256};
use lottery_bindings::revert::PANIC_ARRAY_OUT_OF_BOUNDS;
use lottery_bindings::{LotteryState, RevertReason};

/// Storage of the deployed Lottery
#[derive(Clone, Debug)]
pub struct LotteryStorage {
    entrance_fee: U256,
    interval: u64,
    state: LotteryState,
    players: Vec<Address>,
    recent_winner: Address,
    last_timestamp: u64,
}

impl LotteryStorage {
    /// Storage right after the constructor ran at `timestamp`
    pub const fn new(entrance_fee: U256, interval: u64, timestamp: u64) -> Self {
        Self {
            entrance_fee,
            interval,
            state: LotteryState::Open,
            players: Vec::new(),
            recent_winner: Address::ZERO,
            last_timestamp: timestamp,
        }
    }

    /// Record `player` as an entrant paying `value`
    pub fn enter(&mut self, player: Address, value: U256) -> Result<(), RevertReason> {
        if value < self.entrance_fee {
            return Err(RevertReason::NotEnoughEthEntered);
        }
        if self.state != LotteryState::Open {
            return Err(RevertReason::NotOpen);
        }
        self.players.push(player);
        Ok(())
    }

    /// Upkeep is due when open, the interval has elapsed at `now`, and the
    /// contract holds both funds and players
    pub fn check_upkeep(&self, now: u64, balance: U256) -> bool {
        let is_open = self.state == LotteryState::Open;
        let time_passed = now.saturating_sub(self.last_timestamp) >= self.interval;
        let has_players = !self.players.is_empty();
        let has_balance = balance > U256::ZERO;
        is_open && time_passed && has_players && has_balance
    }

    /// Move to CALCULATING if upkeep is due
    pub fn perform_upkeep(&mut self, now: u64, balance: U256) -> Result<(), RevertReason> {
        if !self.check_upkeep(now, balance) {
            return Err(RevertReason::UpkeepNotNeeded {
                balance,
                players: U256::from(self.players.len()),
                state: U256::from(self.state.as_u8()),
            });
        }
        self.state = LotteryState::Calculating;
        Ok(())
    }

    /// Pick the winner at `random_words[0] mod players`, reset the round at
    /// `now` and return the winner. `None` leaves storage untouched (the
    /// callback would have failed on chain).
    pub fn fulfill(&mut self, now: u64, random_words: &[U256]) -> Option<Address> {
        let word = random_words.first()?;
        if self.players.is_empty() {
            return None;
        }
        let index = (*word % U256::from(self.players.len())).saturating_to::<usize>();
        let winner = self.players[index];

        self.recent_winner = winner;
        self.state = LotteryState::Open;
        self.players.clear();
        self.last_timestamp = now;
        Some(winner)
    }

    /// Entrance fee in wei
    pub const fn entrance_fee(&self) -> U256 {
        self.entrance_fee
    }

    /// Draw interval in seconds
    pub const fn interval(&self) -> u64 {
        self.interval
    }

    /// Current state
    pub const fn state(&self) -> LotteryState {
        self.state
    }

    /// Entrant at `index`
    pub fn player(&self, index: u64) -> Result<Address, RevertReason> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.players.get(i).copied())
            .ok_or(RevertReason::Panic(U256::from(PANIC_ARRAY_OUT_OF_BOUNDS)))
    }

    /// Number of entrants
    pub fn number_of_players(&self) -> usize {
        self.players.len()
    }

    /// Winner of the last draw
    pub const fn recent_winner(&self) -> Address {
        self.recent_winner
    }

    /// Timestamp of deployment or of the last draw
    pub const fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }
}
