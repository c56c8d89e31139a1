//! Single process-wide holder of the latest snapshot and connectivity
//! status.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use gantry_core::{ConnectivityStatus, Snapshot};

/// What the synchronization core currently knows, handed out to consumers
/// as one value so a render pass never mixes two generations of state.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    /// Latest accepted snapshot; `None` until the bootstrap fetch or the
    /// first push lands.
    pub snapshot: Option<Arc<Snapshot>>,
    pub connectivity: ConnectivityStatus,
}

/// Replace-on-write store shared between the two producers (bootstrap
/// loader, connection manager) and any number of read-only consumers.
///
/// Writes go through [`StateStore::apply_bootstrap`] and
/// [`StateStore::apply_push`] only; consumers hold [`StateReader`]
/// subscriptions and cannot mutate. The last write to arrive wins,
/// regardless of when its request was issued.
#[derive(Clone)]
pub struct StateStore {
    shared: Arc<Shared>,
}

struct Shared {
    tx: watch::Sender<SyncState>,
    pushes_applied: AtomicU64,
    discarded_payloads: AtomicU64,
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SyncState::default());
        Self {
            shared: Arc::new(Shared {
                tx,
                pushes_applied: AtomicU64::new(0),
                discarded_payloads: AtomicU64::new(0),
            }),
        }
    }

    /// Producer API (connection manager): replace the held snapshot with a
    /// freshly pushed one.
    pub fn apply_push(&self, snapshot: Snapshot) {
        self.shared.pushes_applied.fetch_add(1, Ordering::Relaxed);
        self.shared.tx.send_modify(|state| {
            state.snapshot = Some(Arc::new(snapshot));
        });
    }

    /// Producer API (bootstrap loader): seed the store, unless fresher data
    /// already arrived while the fetch was in flight. Returns whether the
    /// snapshot was accepted.
    pub fn apply_bootstrap(&self, snapshot: Snapshot) -> bool {
        self.shared.tx.send_if_modified(|state| {
            if state.snapshot.is_some() {
                return false;
            }
            state.snapshot = Some(Arc::new(snapshot));
            true
        })
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.shared.tx.send_if_modified(|state| {
            if state.connectivity.connected == connected {
                return false;
            }
            state.connectivity.connected = connected;
            true
        });
    }

    pub(crate) fn note_discarded_payload(&self) {
        self.shared.discarded_payloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Subscribe for updates. Each reader observes every accepted write
    /// that happens after it last looked, never a patched intermediate.
    #[must_use]
    pub fn subscribe(&self) -> StateReader {
        StateReader {
            rx: self.shared.tx.subscribe(),
        }
    }

    /// Latest state without subscribing.
    #[must_use]
    pub fn current(&self) -> SyncState {
        self.shared.tx.borrow().clone()
    }

    /// Number of pushed snapshots accepted since startup.
    #[must_use]
    pub fn pushes_applied(&self) -> u64 {
        self.shared.pushes_applied.load(Ordering::Relaxed)
    }

    /// Number of inbound payloads discarded as malformed.
    #[must_use]
    pub fn discarded_payloads(&self) -> u64 {
        self.shared.discarded_payloads.load(Ordering::Relaxed)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only subscription handed to consumer views.
#[derive(Clone)]
pub struct StateReader {
    rx: watch::Receiver<SyncState>,
}

impl StateReader {
    /// Latest state, returned synchronously.
    #[must_use]
    pub fn current(&self) -> SyncState {
        self.rx.borrow().clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.rx.borrow().snapshot.clone()
    }

    #[must_use]
    pub fn connected(&self) -> bool {
        self.rx.borrow().connectivity.connected
    }

    /// Wait until the store accepts another write. Returns `false` once the
    /// store has been dropped and no further updates can come.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_status(status: &str) -> Snapshot {
        Snapshot {
            status: status.into(),
            ..Snapshot::default()
        }
    }

    #[test]
    fn bootstrap_seeds_an_empty_store() {
        let store = StateStore::new();
        assert!(store.apply_bootstrap(snapshot_with_status("IDLE")));
        let state = store.current();
        assert_eq!(state.snapshot.unwrap().status, "IDLE");
    }

    #[test]
    fn bootstrap_never_clobbers_a_push_that_arrived_first() {
        let store = StateStore::new();
        store.apply_push(snapshot_with_status("RUNNING"));
        assert!(!store.apply_bootstrap(snapshot_with_status("IDLE")));
        assert_eq!(store.current().snapshot.unwrap().status, "RUNNING");
    }

    #[test]
    fn pushes_replace_wholesale_in_arrival_order() {
        let store = StateStore::new();
        store.apply_push(snapshot_with_status("FIRST"));
        store.apply_push(snapshot_with_status("SECOND"));
        assert_eq!(store.current().snapshot.unwrap().status, "SECOND");
        assert_eq!(store.pushes_applied(), 2);
    }

    #[tokio::test]
    async fn readers_are_notified_of_connectivity_flips_only() {
        let store = StateStore::new();
        let mut reader = store.subscribe();

        store.set_connected(true);
        assert!(reader.changed().await);
        assert!(reader.connected());

        // Same value again: no wakeup.
        store.set_connected(true);
        assert!(!reader
            .rx
            .has_changed()
            .expect("store alive"));

        store.set_connected(false);
        assert!(reader.changed().await);
        assert!(!reader.connected());
    }

    #[tokio::test]
    async fn discarded_bootstrap_does_not_wake_readers() {
        let store = StateStore::new();
        store.apply_push(snapshot_with_status("RUNNING"));
        let mut reader = store.subscribe();
        store.apply_bootstrap(snapshot_with_status("IDLE"));
        assert!(!reader.rx.has_changed().expect("store alive"));
        assert_eq!(reader.snapshot().unwrap().status, "RUNNING");
    }
}
