//! Concurrent session table.

use super::state::{Session, SessionView};
use crate::events::Identity;
use dashmap::DashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tracing::{debug, info};

type Slot = Arc<Mutex<Option<Session>>>;

/// Map from identity to session.
///
/// Every identity owns one slot guarded by an async mutex. Holding the slot
/// lock serializes that identity's events; other identities are unaffected.
/// A slot holding `None` means no session exists.
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    slots: Arc<DashMap<Identity, Slot>>,
}

impl SessionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the slot for `identity`, waiting for any event in progress.
    pub async fn lock(&self, identity: &Identity) -> SessionGuard {
        // Clone the slot out so no shard lock is held across the await.
        let slot = Arc::clone(self.slots.entry(identity.clone()).or_default().value());
        let guard = slot.lock_owned().await;
        SessionGuard {
            guard,
            identity: identity.clone(),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Whether `identity` currently has a session.
    pub async fn contains(&self, identity: &Identity) -> bool {
        let Some(slot) = self.slot(identity) else {
            return false;
        };
        let guard = slot.lock().await;
        guard.is_some()
    }

    /// Summaries of every session not busy handling an event.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionView> {
        let mut views: Vec<SessionView> = self
            .slots()
            .into_iter()
            .filter_map(|(_, slot)| {
                let guard = slot.try_lock().ok()?;
                guard.as_ref().map(Session::view)
            })
            .collect();
        views.sort_by(|a, b| a.identity.cmp(&b.identity));
        views
    }

    /// Number of slots, busy or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Destroy sessions idle for at least `ttl`.
    ///
    /// Slots busy with an event are skipped. Dropping a session drops its
    /// staged artifact. Returns the evicted identities.
    pub fn evict_idle(&self, ttl: Duration) -> Vec<Identity> {
        let mut evicted = Vec::new();
        for (identity, slot) in self.slots() {
            let Ok(mut guard) = slot.try_lock() else {
                continue;
            };
            if guard.as_ref().is_some_and(|s| s.is_idle(ttl)) {
                if let Some(session) = guard.take() {
                    debug!(%identity, stage = %session.stage_kind(), "evicting idle session");
                }
                evicted.push(identity);
            }
        }
        self.prune();
        evicted
    }

    /// Destroy every session not busy handling an event.
    pub fn clear(&self) -> usize {
        let mut cleared = 0;
        for (_, slot) in self.slots() {
            if let Ok(mut guard) = slot.try_lock() {
                if guard.take().is_some() {
                    cleared += 1;
                }
            }
        }
        self.prune();
        cleared
    }

    /// Remove empty slots nobody is waiting on.
    pub fn prune(&self) {
        self.slots.retain(|_, slot| !is_dead(slot));
    }

    /// Start a background task evicting idle sessions every `interval`.
    #[must_use]
    pub fn spawn_sweeper(&self, ttl: Duration, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let table = self.clone();

        tokio::spawn(async move {
            info!(?ttl, ?interval, "session sweeper started");
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        let evicted = table.evict_idle(ttl);
                        if !evicted.is_empty() {
                            info!(count = evicted.len(), "evicted idle sessions");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("session sweeper shutting down");
                        break;
                    }
                }
            }
        });

        SweeperHandle { shutdown_tx }
    }

    fn slot(&self, identity: &Identity) -> Option<Slot> {
        self.slots.get(identity).map(|entry| Arc::clone(entry.value()))
    }

    fn slots(&self) -> Vec<(Identity, Slot)> {
        self.slots
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}

/// Empty and referenced only by the table.
fn is_dead(slot: &Slot) -> bool {
    Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|guard| guard.is_none())
}

/// Exclusive access to one identity's slot.
///
/// Dereferences to `Option<Session>`; set it to `None` to destroy the
/// session. An emptied slot is removed from the table on drop.
#[derive(Debug)]
pub struct SessionGuard {
    guard: OwnedMutexGuard<Option<Session>>,
    identity: Identity,
    slots: Arc<DashMap<Identity, Slot>>,
}

impl SessionGuard {
    /// Identity this slot belongs to.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl Deref for SessionGuard {
    type Target = Option<Session>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.guard.is_some() {
            return;
        }
        // Only the table and this guard reference the slot: nobody is
        // waiting, and new lockers must pass through the shard lock.
        let held = OwnedMutexGuard::mutex(&self.guard);
        self.slots.remove_if(&self.identity, |_, slot| {
            Arc::ptr_eq(slot, held) && Arc::strong_count(slot) == 2
        });
    }
}

/// Handle for stopping the sweeper.
#[derive(Debug, Clone)]
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Locale;
    use crate::session::StageKind;

    #[tokio::test]
    async fn test_lock_create_and_destroy() {
        let table = SessionTable::new();
        let id = Identity::from(1);

        {
            let mut slot = table.lock(&id).await;
            assert!(slot.is_none());
            *slot = Some(Session::new(id.clone(), Locale::En));
        }
        assert!(table.contains(&id).await);
        assert_eq!(table.len(), 1);

        {
            let mut slot = table.lock(&id).await;
            *slot = None;
        }
        assert!(!table.contains(&id).await);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_lock_serializes_same_identity() {
        let table = SessionTable::new();
        let id = Identity::from(7);
        let first = table.lock(&id).await;

        let table2 = table.clone();
        let id2 = id.clone();
        let waiter = tokio::spawn(async move {
            let slot = table2.lock(&id2).await;
            slot.as_ref().map(Session::stage_kind)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let mut first = first;
        *first = Some(Session::new(id.clone(), Locale::En));
        drop(first);

        assert_eq!(waiter.await.unwrap(), Some(StageKind::CollectingImages));
    }

    #[tokio::test]
    async fn test_other_identities_not_blocked() {
        let table = SessionTable::new();
        let _held = table.lock(&Identity::from(1)).await;
        let other = tokio::time::timeout(Duration::from_secs(1), table.lock(&Identity::from(2))).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let table = SessionTable::new();
        for id in [1, 2] {
            let id = Identity::from(id);
            let mut slot = table.lock(&id).await;
            *slot = Some(Session::new(id.clone(), Locale::En));
        }
        assert!(table.evict_idle(Duration::from_secs(3600)).is_empty());

        let busy = table.lock(&Identity::from(2)).await;
        let evicted = table.evict_idle(Duration::ZERO);
        assert_eq!(evicted, vec![Identity::from(1)]);
        drop(busy);

        assert!(!table.contains(&Identity::from(1)).await);
        assert!(table.contains(&Identity::from(2)).await);
        assert_eq!(table.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let table = SessionTable::new();
        let id = Identity::from(3);
        *table.lock(&id).await = Some(Session::new(id.clone(), Locale::Ky));
        assert_eq!(table.clear(), 1);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_stops() {
        let table = SessionTable::new();
        let id = Identity::from(4);
        *table.lock(&id).await = Some(Session::new(id.clone(), Locale::En));

        let handle = table.spawn_sweeper(Duration::ZERO, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        assert!(!table.contains(&id).await);
    }
}
