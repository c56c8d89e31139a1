//! Connection manager behaviour against a live mock bot: idempotent
//! connects, single-timer retries, visibility gating, and teardown.

mod common;

use std::time::Duration;

use anyhow::Result;
use rust_decimal_macros::dec;
use tokio::time::{sleep, Instant};

use gantry_client::{StateStore, SyncManager};
use gantry_test_utils::{fixtures, MockBot};

use common::{stream_settings, wait_for, RETRY};

#[tokio::test(flavor = "multi_thread")]
async fn redundant_connect_requests_share_one_connection() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let handle = SyncManager::spawn(store.clone(), stream_settings(&bot));

    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    handle.connect();
    handle.connect();
    handle.connect();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(bot.state().stream_accepts(), 1);
    assert_eq!(bot.state().stream_active(), 1);

    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn a_drop_arms_exactly_one_retry() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let handle = SyncManager::spawn(store.clone(), stream_settings(&bot));
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    bot.kill_stream().await;
    wait_for(&mut reader, "the drop to be noticed", |state| {
        !state.connectivity.connected
    })
    .await;
    bot.restart_stream().await?;

    // The fixed delay has not elapsed yet.
    sleep(RETRY / 2).await;
    assert_eq!(bot.state().stream_accepts(), 1);

    wait_for(&mut reader, "the retry to land", |state| {
        state.connectivity.connected
    })
    .await;
    assert_eq!(bot.state().stream_accepts(), 2);

    // Exactly one timer fired; nothing else stays armed.
    sleep(RETRY * 2).await;
    assert_eq!(bot.state().stream_accepts(), 2);

    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn hidden_console_suspends_reconnects() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let handle = SyncManager::spawn(store.clone(), stream_settings(&bot));
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    handle.set_visibility(false);
    bot.kill_stream().await;
    wait_for(&mut reader, "the drop to be noticed", |state| {
        !state.connectivity.connected
    })
    .await;
    bot.restart_stream().await?;

    // Hidden consoles schedule nothing, no matter how long they wait.
    sleep(RETRY * 3).await;
    assert_eq!(bot.state().stream_accepts(), 1);

    handle.set_visibility(true);
    wait_for(&mut reader, "the visible reconnect", |state| {
        state.connectivity.connected
    })
    .await;
    assert_eq!(bot.state().stream_accepts(), 2);

    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn a_visibility_cycle_while_open_keeps_one_stream() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let handle = SyncManager::spawn(store.clone(), stream_settings(&bot));
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    handle.set_visibility(false);
    handle.set_visibility(true);
    sleep(Duration::from_millis(200)).await;
    assert!(store.current().connectivity.connected);
    assert_eq!(bot.state().stream_accepts(), 1);
    assert_eq!(bot.state().stream_active(), 1);

    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn regained_visibility_supersedes_the_pending_timer() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let mut settings = stream_settings(&bot);
    settings.reconnect_delay = Duration::from_secs(30);
    let handle = SyncManager::spawn(store.clone(), settings);
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    bot.kill_stream().await;
    wait_for(&mut reader, "the drop to be noticed", |state| {
        !state.connectivity.connected
    })
    .await;
    bot.restart_stream().await?;

    // Hide, then show again: the stale thirty-second timer must not be
    // what brings the stream back.
    handle.set_visibility(false);
    handle.set_visibility(true);
    let regained_at = Instant::now();
    wait_for(&mut reader, "the prompt reconnect", |state| {
        state.connectivity.connected
    })
    .await;
    assert!(regained_at.elapsed() < Duration::from_secs(5));
    assert_eq!(bot.state().stream_accepts(), 2);

    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_connect_supersedes_the_pending_timer() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let mut settings = stream_settings(&bot);
    settings.reconnect_delay = Duration::from_secs(30);
    let handle = SyncManager::spawn(store.clone(), settings);
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    bot.kill_stream().await;
    wait_for(&mut reader, "the drop to be noticed", |state| {
        !state.connectivity.connected
    })
    .await;
    bot.restart_stream().await?;

    handle.connect();
    wait_for(&mut reader, "the manual reconnect", |state| {
        state.connectivity.connected
    })
    .await;
    assert_eq!(bot.state().stream_accepts(), 2);

    // The superseded timer is gone; no second attempt follows.
    sleep(Duration::from_millis(500)).await;
    assert_eq!(bot.state().stream_accepts(), 2);

    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn redundant_visibility_reports_keep_the_timer() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let mut settings = stream_settings(&bot);
    settings.reconnect_delay = Duration::from_secs(30);
    let handle = SyncManager::spawn(store.clone(), settings);
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    bot.kill_stream().await;
    wait_for(&mut reader, "the drop to be noticed", |state| {
        !state.connectivity.connected
    })
    .await;
    bot.restart_stream().await?;

    // Already visible: the report must not short-circuit the delay.
    handle.set_visibility(true);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(bot.state().stream_accepts(), 1);

    handle.connect();
    wait_for(&mut reader, "the manual reconnect", |state| {
        state.connectivity.connected
    })
    .await;

    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_payloads_are_dropped_without_clearing_state() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let handle = SyncManager::spawn(store.clone(), stream_settings(&bot));
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    bot.state()
        .publish_snapshot(fixtures::snapshot_with_positions(vec![(
            "AAA",
            fixtures::open_position(dec!(100), 10),
        )]))
        .await;
    wait_for(&mut reader, "the good snapshot", |state| {
        state.snapshot.is_some()
    })
    .await;

    bot.state().publish_raw("{\"positions\": nonsense");
    bot.state().publish_raw("42");

    // Discards do not wake the store, so poll the counter.
    let deadline = Instant::now() + Duration::from_secs(5);
    while store.discarded_payloads() < 2 {
        assert!(Instant::now() < deadline, "payloads were never discarded");
        sleep(Duration::from_millis(25)).await;
    }

    // The junk neither cleared the snapshot nor dropped the connection.
    let state = store.current();
    assert!(state.connectivity.connected);
    let snapshot = state.snapshot.as_deref().unwrap();
    assert!(snapshot.positions.contains_key("AAA"));
    assert_eq!(store.pushes_applied(), 1);

    // A well-formed push afterwards still lands.
    let mut next = fixtures::snapshot_with_positions(vec![]);
    next.total_trades_today = 7;
    bot.state().publish_snapshot(next).await;
    wait_for(&mut reader, "the follow-up snapshot", |state| {
        state
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.total_trades_today == 7)
    })
    .await;

    handle.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_closes_the_stream_and_stops_scheduling() -> Result<()> {
    let bot = MockBot::start(fixtures::snapshot_with_positions(vec![])).await?;
    let store = StateStore::new();
    let mut reader = store.subscribe();
    let handle = SyncManager::spawn(store.clone(), stream_settings(&bot));
    wait_for(&mut reader, "stream to connect", |state| {
        state.connectivity.connected
    })
    .await;

    handle.shutdown().await;
    assert!(!store.current().connectivity.connected);

    let deadline = Instant::now() + Duration::from_secs(5);
    while bot.state().stream_active() > 0 {
        assert!(Instant::now() < deadline, "stream was never closed");
        sleep(Duration::from_millis(25)).await;
    }

    // Nothing reconnects after teardown.
    sleep(RETRY * 2).await;
    assert_eq!(bot.state().stream_accepts(), 1);
    Ok(())
}
