//! Live-draw flow against the development chain with automation standing in
//! for keepers and VRF

use std::time::Duration;

use alloy_primitives::U256;
use lottery_bindings::EventKind;
use lottery_host::{
    run_live_draw, DevChainConfig, LocalChain, LotteryContract, PendingEvent, ScenarioError,
};

fn chain(interval: u64) -> LocalChain {
    LocalChain::deploy(DevChainConfig {
        interval,
        ..DevChainConfig::default()
    })
}

#[tokio::test]
async fn test_live_draw_with_automation() {
    let chain = chain(0);
    let _automation = chain.spawn_automation(Duration::from_millis(10));
    let lottery = chain.lottery();
    let player = chain.deployer();

    let report = run_live_draw(&lottery, player, Duration::from_secs(5))
        .await
        .unwrap();
    report.check().unwrap();
    assert_eq!(report.event_winner, player);
}

#[tokio::test]
async fn test_live_draw_times_out_without_keepers() {
    let chain = chain(0);
    let lottery = chain.lottery();

    let err = run_live_draw(&lottery, chain.deployer(), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(!matches!(err, ScenarioError::Assertion(_)));
}

#[tokio::test]
async fn test_listener_is_live_before_the_trigger() {
    let chain = chain(0);
    let lottery = chain.lottery();
    let pending = PendingEvent::register(&lottery, EventKind::RaffleEnter)
        .await
        .unwrap();

    let fee = lottery.entrance_fee().await.unwrap();
    lottery.enter_raffle(chain.deployer(), fee).await.unwrap();

    // already delivered by the time we wait
    let event = pending.wait(Duration::from_millis(1)).await.unwrap();
    assert_eq!(event.kind(), EventKind::RaffleEnter);
}

#[tokio::test]
async fn test_automation_stops_on_drop() {
    let chain = chain(0);
    let automation = chain.spawn_automation(Duration::from_millis(10));
    drop(automation);

    let lottery = chain.lottery();
    let fee = lottery.entrance_fee().await.unwrap();
    lottery.enter_raffle(chain.deployer(), fee).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(lottery.number_of_players().await.unwrap(), U256::from(1));
}
