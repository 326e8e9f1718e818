//! One-shot event listener
//!
//! Usage pattern for events triggered by a later transaction:
//!
//! ```ignore
//! let pending = PendingEvent::register(&lottery, EventKind::WinnerPicked).await?;
//! lottery.enter_raffle(player, fee).await?;
//! let event = pending.wait(timeout).await?;
//! ```
//!
//! `register` returns only once the subscription is live, so the triggering
//! transaction can never outrun the listener. `wait` consumes the listener:
//! the subscription is dropped whether the event arrived or the wait timed out.

use std::time::Duration;

use lottery_bindings::{EventKind, LotteryEvent};
use thiserror::Error;
use tracing::{debug, warn};

use crate::contract::{ContractError, EventSubscription, LotteryContract};

/// Listener failure
#[derive(Debug, Error)]
pub enum WaitError {
    /// No matching event within the bound
    #[error("no {kind:?} event within {timeout:?}")]
    Timeout {
        /// Awaited event
        kind: EventKind,
        /// Bound that elapsed
        timeout: Duration,
    },
    /// Event source went away
    #[error("event source closed before {0:?} was observed")]
    Closed(EventKind),
    /// Subscribing failed
    #[error("failed to subscribe: {0}")]
    Subscribe(#[from] ContractError),
}

/// A registered one-shot listener for a single event kind
#[derive(Debug)]
pub struct PendingEvent {
    kind: EventKind,
    subscription: EventSubscription,
}

impl PendingEvent {
    /// Register a listener on `contract` for the next `kind` event
    pub async fn register<C>(contract: &C, kind: EventKind) -> Result<Self, WaitError>
    where
        C: LotteryContract + ?Sized,
    {
        let subscription = contract.subscribe().await?;
        debug!("Listening for {:?} on {}", kind, contract.address());
        Ok(Self { kind, subscription })
    }

    /// Block until the event arrives or `timeout` elapses
    pub async fn wait(self, timeout: Duration) -> Result<LotteryEvent, WaitError> {
        once(self.subscription, self.kind, timeout).await
    }
}

/// Resolve on the first `kind` event of `subscription`, or fail after `timeout`.
/// The subscription is dropped on return.
pub async fn once(
    mut subscription: EventSubscription,
    kind: EventKind,
    timeout: Duration,
) -> Result<LotteryEvent, WaitError> {
    let next_match = async {
        while let Some(event) = subscription.recv().await {
            if event.kind() == kind {
                return Some(event);
            }
            debug!("Ignoring {:?} while waiting for {:?}", event.kind(), kind);
        }
        None
    };

    match tokio::time::timeout(timeout, next_match).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err(WaitError::Closed(kind)),
        Err(_) => {
            warn!("Gave up waiting for {:?} after {:?}", kind, timeout);
            Err(WaitError::Timeout { kind, timeout })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_once_skips_other_events() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(LotteryEvent::RaffleEnter { player: Address::repeat_byte(1) }).unwrap();
        tx.send(LotteryEvent::RequestedLotteryWinner { request_id: U256::from(1) }).unwrap();
        tx.send(LotteryEvent::WinnerPicked { winner: Address::repeat_byte(1) }).unwrap();

        let event = once(EventSubscription::new(rx), EventKind::WinnerPicked, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(event, LotteryEvent::WinnerPicked { winner: Address::repeat_byte(1) });
        // resolved listener has unsubscribed
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_once_times_out_and_unsubscribes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let err = once(EventSubscription::new(rx), EventKind::WinnerPicked, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Timeout { kind: EventKind::WinnerPicked, .. }));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_once_reports_closed_source() {
        let (tx, rx) = mpsc::unbounded_channel::<LotteryEvent>();
        drop(tx);
        let err = once(EventSubscription::new(rx), EventKind::WinnerPicked, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Closed(EventKind::WinnerPicked)));
    }
}
