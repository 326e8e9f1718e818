//! Lottery behavior on the development chain: one fresh fixture per test

use std::time::Duration;

use alloy_primitives::{Address, U256};
use lottery_bindings::revert::NONEXISTENT_REQUEST;
use lottery_bindings::{LotteryEvent, LotteryState};
use lottery_host::config::{NetworkConfig, DEVELOPMENT_CHAIN_ID};
use lottery_host::{
    run_local_draw, ChainControl, DevChainConfig, LocalFixture, LotteryContract, ScenarioError,
};

async fn fixture() -> LocalFixture {
    LocalFixture::deploy(DevChainConfig::default()).await.unwrap()
}

/// Entered by the deployer with time moved past the interval
async fn due_fixture() -> LocalFixture {
    let fixture = fixture().await;
    fixture.enter(fixture.deployer).await.unwrap();
    fixture.advance_past_interval().await.unwrap();
    fixture
}

#[tokio::test]
async fn test_constructor_initializes_lottery() {
    let fixture = fixture().await;
    let network = NetworkConfig::for_chain(DEVELOPMENT_CHAIN_ID).unwrap();

    assert_eq!(fixture.lottery.lottery_state().await.unwrap(), LotteryState::Open);
    assert_eq!(fixture.interval, U256::from(network.interval));
    assert_eq!(fixture.entrance_fee, network.entrance_fee);
}

#[tokio::test]
async fn test_enter_reverts_without_enough_eth() {
    let fixture = fixture().await;
    let err = fixture
        .lottery
        .enter_raffle(fixture.deployer, U256::ZERO)
        .await
        .unwrap_err();
    assert!(err.is_revert_with("Lottery__NotEnoughETHEntered"));
}

#[tokio::test]
async fn test_enter_records_player() {
    let fixture = fixture().await;
    fixture.enter(fixture.deployer).await.unwrap();

    assert_eq!(fixture.lottery.player(0).await.unwrap(), fixture.deployer);
    assert_eq!(fixture.lottery.number_of_players().await.unwrap(), U256::from(1));
}

#[tokio::test]
async fn test_enter_emits_event() {
    let fixture = fixture().await;
    let receipt = fixture
        .lottery
        .enter_raffle(fixture.deployer, fixture.entrance_fee)
        .await
        .unwrap();
    assert_eq!(
        receipt.events().collect::<Vec<_>>(),
        [&LotteryEvent::RaffleEnter { player: fixture.deployer }]
    );
}

#[tokio::test]
async fn test_enter_reverts_while_calculating() {
    let fixture = due_fixture().await;
    fixture.lottery.perform_upkeep(fixture.deployer).await.unwrap();

    let err = fixture
        .lottery
        .enter_raffle(fixture.deployer, fixture.entrance_fee)
        .await
        .unwrap_err();
    assert!(err.is_revert_with("Lottery__NotOpen"));
}

#[tokio::test]
async fn test_check_upkeep_false_without_eth() {
    let fixture = fixture().await;
    fixture.advance_past_interval().await.unwrap();
    assert!(!fixture.lottery.check_upkeep().await.unwrap());
}

#[tokio::test]
async fn test_check_upkeep_false_when_not_open() {
    let fixture = due_fixture().await;
    fixture.lottery.perform_upkeep(fixture.deployer).await.unwrap();

    assert_eq!(fixture.lottery.lottery_state().await.unwrap(), LotteryState::Calculating);
    assert!(!fixture.lottery.check_upkeep().await.unwrap());
}

#[tokio::test]
async fn test_check_upkeep_false_before_interval() {
    let fixture = fixture().await;
    fixture.enter(fixture.deployer).await.unwrap();
    let interval = fixture.interval.saturating_to::<u64>();
    fixture.chain.increase_time(interval - 5).await.unwrap();
    fixture.chain.mine().await.unwrap();

    assert!(!fixture.lottery.check_upkeep().await.unwrap());
}

#[tokio::test]
async fn test_check_upkeep_true_after_interval() {
    let fixture = due_fixture().await;
    assert!(fixture.lottery.check_upkeep().await.unwrap());
}

#[tokio::test]
async fn test_perform_upkeep_reverts_when_not_needed() {
    let fixture = fixture().await;
    let err = fixture
        .lottery
        .perform_upkeep(fixture.deployer)
        .await
        .unwrap_err();
    assert!(err.is_revert_with("Lottery__UpKeepNotNeeded"));
}

#[tokio::test]
async fn test_perform_upkeep_reverts_while_calculating() {
    let fixture = due_fixture().await;
    fixture.lottery.perform_upkeep(fixture.deployer).await.unwrap();

    let err = fixture
        .lottery
        .perform_upkeep(fixture.deployer)
        .await
        .unwrap_err();
    assert!(err.is_revert_with("Lottery__UpKeepNotNeeded"));
    assert_eq!(fixture.lottery.lottery_state().await.unwrap(), LotteryState::Calculating);
}

#[tokio::test]
async fn test_perform_upkeep_reverts_before_interval() {
    let fixture = fixture().await;
    fixture.enter(fixture.deployer).await.unwrap();
    let interval = fixture.interval.saturating_to::<u64>();
    fixture.chain.increase_time(interval - 5).await.unwrap();
    fixture.chain.mine().await.unwrap();

    let err = fixture
        .lottery
        .perform_upkeep(fixture.deployer)
        .await
        .unwrap_err();
    assert!(err.is_revert_with("Lottery__UpKeepNotNeeded"));
    assert_eq!(fixture.lottery.lottery_state().await.unwrap(), LotteryState::Open);
    assert_eq!(fixture.lottery.number_of_players().await.unwrap(), U256::from(1));
}

#[tokio::test]
async fn test_perform_upkeep_requests_randomness() {
    let fixture = due_fixture().await;
    let receipt = fixture.lottery.perform_upkeep(fixture.deployer).await.unwrap();

    // coordinator log first, the lottery's second
    assert_eq!(receipt.logs[0].address, fixture.chain.coordinator_address());
    assert_eq!(receipt.logs[1].address, fixture.lottery.address());
    let events: Vec<_> = receipt.events().collect();
    assert!(matches!(events[0], LotteryEvent::RandomWordsRequested { .. }));
    let LotteryEvent::RequestedLotteryWinner { request_id } = events[1] else {
        panic!("unexpected second log: {:?}", events[1]);
    };
    assert!(*request_id > U256::ZERO);
    assert_eq!(fixture.lottery.lottery_state().await.unwrap(), LotteryState::Calculating);
    assert!(fixture.chain.is_request_pending(*request_id));
}

#[tokio::test]
async fn test_fulfill_only_after_perform_upkeep() {
    let fixture = due_fixture().await;
    for request_id in [0u64, 1] {
        let err = fixture
            .chain
            .fulfill_random_words(U256::from(request_id), fixture.lottery.address())
            .await
            .unwrap_err();
        assert!(err.is_revert_with(NONEXISTENT_REQUEST));
    }
}

#[tokio::test]
async fn test_picks_winner_resets_and_pays() {
    let fixture = fixture().await;
    // deployer plus three more entrants
    let entrants = &fixture.accounts[..4];
    let random_word = U256::from(9);

    let report = run_local_draw(
        &fixture.lottery,
        &fixture.chain,
        fixture.deployer,
        entrants,
        Some(random_word),
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    report.check().unwrap();

    // 9 mod 4 == 1
    assert_eq!(report.event_winner, fixture.accounts[1]);
    assert_eq!(report.pot(), fixture.entrance_fee * U256::from(4));
    assert_eq!(
        report.winner_ending_balance - report.winner_starting_balance,
        fixture.entrance_fee * U256::from(4)
    );
    assert_eq!(fixture.lottery.balance_of(fixture.lottery.address()).await.unwrap(), U256::ZERO);
}

#[tokio::test]
async fn test_derived_randomness_draw() {
    let fixture = fixture().await;
    let report = run_local_draw(
        &fixture.lottery,
        &fixture.chain,
        fixture.accounts[5],
        &fixture.accounts[1..3],
        None,
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    report.check().unwrap();
    assert!(report.expected_winner.is_none());
}

#[tokio::test]
async fn test_second_round_after_draw() {
    let fixture = fixture().await;
    let entrants = &fixture.accounts[1..3];
    for word in [0u64, 1] {
        let report = run_local_draw(
            &fixture.lottery,
            &fixture.chain,
            fixture.deployer,
            entrants,
            Some(U256::from(word)),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        report.check().unwrap();
    }
    assert_eq!(fixture.lottery.recent_winner().await.unwrap(), fixture.accounts[2]);
}

#[tokio::test]
async fn test_draw_without_entrants_fails_upkeep() {
    let fixture = fixture().await;
    let err = run_local_draw(
        &fixture.lottery,
        &fixture.chain,
        fixture.deployer,
        &[],
        None,
        Duration::from_secs(1),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ScenarioError::Contract(ref e) if e.is_revert_with("Lottery__UpKeepNotNeeded")));
}

#[tokio::test]
async fn test_unfunded_entrant_is_rejected() {
    let fixture = fixture().await;
    let err = fixture
        .lottery
        .enter_raffle(Address::repeat_byte(0x42), fixture.entrance_fee)
        .await
        .unwrap_err();
    assert!(err.revert_reason().is_none());
}
