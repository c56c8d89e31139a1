//! One-shot seeding of the state store ahead of the first live push.

use tracing::{info, warn};

use crate::rest::BotApi;
use crate::store::StateStore;

/// Fetch the current bot state once and seed `store` with it.
///
/// Losing the race against the live stream is normal: if a push landed
/// while the fetch was in flight, the fetched snapshot is discarded. A
/// failed fetch is logged and absorbed; the connection manager fills the
/// store on its own and consumers keep showing their loading state until
/// then.
pub async fn seed_store(api: &BotApi, store: &StateStore) {
    match api.fetch_snapshot().await {
        Ok(snapshot) => {
            if store.apply_bootstrap(snapshot) {
                info!("state store seeded from bootstrap fetch");
            } else {
                info!("bootstrap snapshot discarded; a live push arrived first");
            }
        }
        Err(err) => {
            warn!(error = %err, "bootstrap fetch failed; waiting on the live stream");
        }
    }
}
