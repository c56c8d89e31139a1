//! Bootstrap fetch versus the live stream: whichever write arrives last
//! wins, and a failed fetch never takes the console down.

mod common;

use anyhow::Result;
use rust_decimal_macros::dec;

use gantry_client::{seed_store, StateStore, SyncManager};
use gantry_test_utils::{fixtures, MockBot};

use common::{bot_api, stream_settings, wait_for};

#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_seeds_an_empty_store() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![(
        "RELIANCE",
        fixtures::open_position(dec!(2850), 2),
    )]))
    .await?;
    let store = StateStore::new();

    seed_store(&bot_api(&bot), &store).await;

    let state = store.current();
    let snapshot = state.snapshot.as_deref().unwrap();
    assert!(snapshot.positions.contains_key("RELIANCE"));
    assert_eq!(store.pushes_applied(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn a_push_that_lands_first_beats_a_slow_bootstrap() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let handle = SyncManager::spawn(store.clone(), stream_settings(&bot));
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    let mut pushed = fixtures::snapshot_with_positions(vec![]);
    pushed.total_trades_today = 9;
    bot.state().publish_snapshot(pushed).await;
    wait_for(&mut reader, "the push to land", |state| {
        state
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.total_trades_today == 9)
    })
    .await;

    // The bootstrap response was prepared before the push but arrives
    // after it; the fresher data stays.
    let mut stale = fixtures::snapshot_with_positions(vec![]);
    stale.total_trades_today = 1;
    bot.state().set_snapshot(stale).await;
    seed_store(&bot_api(&bot), &store).await;

    let snapshot = store.current().snapshot.unwrap();
    assert_eq!(snapshot.total_trades_today, 9);

    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn a_failed_bootstrap_leaves_the_stream_in_charge() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let handle = SyncManager::spawn(store.clone(), stream_settings(&bot));
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    bot.state().fail_data_requests(1).await;
    seed_store(&bot_api(&bot), &store).await;
    assert!(store.current().snapshot.is_none());

    // The console stays up; the first push fills the gap.
    let mut pushed = fixtures::snapshot_with_positions(vec![]);
    pushed.total_trades_today = 4;
    bot.state().publish_snapshot(pushed).await;
    wait_for(&mut reader, "the push to land", |state| {
        state
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.total_trades_today == 4)
    })
    .await;

    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn a_later_push_replaces_bootstrap_data() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![(
        "AAA",
        fixtures::open_position(dec!(100), 10),
    )]))
    .await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let handle = SyncManager::spawn(store.clone(), stream_settings(&bot));
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    seed_store(&bot_api(&bot), &store).await;
    assert!(store.current().snapshot.is_some());

    let pushed = fixtures::snapshot_with_positions(vec![(
        "BBB",
        fixtures::open_position(dec!(50), 5),
    )]);
    bot.state().publish_snapshot(pushed).await;
    wait_for(&mut reader, "the replacement snapshot", |state| {
        state
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.positions.contains_key("BBB"))
    })
    .await;

    // Replacement is wholesale, not a merge.
    let snapshot = store.current().snapshot.unwrap();
    assert!(!snapshot.positions.contains_key("AAA"));

    handle.shutdown().await;
    Ok(())
}
