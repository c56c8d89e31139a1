#![allow(dead_code)]

use std::time::Duration;

use gantry_client::{BotApi, BotApiConfig, StateReader, SyncSettings, SyncState};
use gantry_test_utils::MockBot;
use tokio::time::timeout;

/// Short fixed reconnect delay so drop-and-recover tests finish quickly.
pub const RETRY: Duration = Duration::from_millis(300);

pub fn stream_settings(bot: &MockBot) -> SyncSettings {
    let mut settings = SyncSettings::new(bot.ws_url());
    settings.reconnect_delay = RETRY;
    settings.connect_timeout = Duration::from_secs(5);
    settings
}

pub fn bot_api(bot: &MockBot) -> BotApi {
    BotApi::new(BotApiConfig {
        base_url: bot.rest_url(),
        ..BotApiConfig::default()
    })
}

/// Block until the store satisfies `predicate`, failing the test after five
/// seconds.
pub async fn wait_for<F>(reader: &mut StateReader, what: &str, mut predicate: F)
where
    F: FnMut(&SyncState) -> bool,
{
    let outcome = timeout(Duration::from_secs(5), async {
        loop {
            if predicate(&reader.current()) {
                return;
            }
            assert!(
                reader.changed().await,
                "store closed while waiting for {what}"
            );
        }
    })
    .await;
    assert!(outcome.is_ok(), "timed out waiting for {what}");
}
