//! In-process store used when Redis is not configured or not reachable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::{ConnectionError, Expiry, Store};

/// Writes between two sweeps of expired slots.
const SWEEP_EVERY: usize = 1024;

#[derive(Debug)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Vec<u8>, expiry: Expiry) -> Self {
        let expires_at = expiry
            .duration()
            .and_then(|ttl| Instant::now().checked_add(ttl));
        Self { value, expires_at }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// [`Store`] kept in a process-local map.
///
/// Expired entries are dropped when touched, and every [`SWEEP_EVERY`]
/// writes the whole map is swept, so keys that are never read again do not
/// pile up. Time follows the Tokio clock, so paused-time tests can step over
/// TTLs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<String, Slot>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries across all namespaces.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.read().await.values().filter(|s| s.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every expired slot now. Returns how many went.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live(now));
        before - slots.len()
    }

    // Called with the write lock held.
    fn note_write(&self, slots: &mut HashMap<String, Slot>, now: Instant) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let before = slots.len();
            slots.retain(|_, slot| slot.is_live(now));
            let purged = before - slots.len();
            if purged > 0 {
                debug!(purged, held = slots.len(), "swept expired memory slots");
            }
        }
    }

    #[cfg(test)]
    async fn held(&self) -> usize {
        self.slots.read().await.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ConnectionError> {
        let now = Instant::now();
        {
            let slots = self.slots.read().await;
            match slots.get(key) {
                Some(slot) if slot.is_live(now) => return Ok(Some(slot.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut slots = self.slots.write().await;
        if slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
            slots.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, expiry: Expiry) -> Result<(), ConnectionError> {
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        self.note_write(&mut slots, now);
        slots.insert(key.to_owned(), Slot::new(value, expiry));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        expiry: Expiry,
    ) -> Result<bool, ConnectionError> {
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        if slots.get(key).is_some_and(|slot| slot.is_live(now)) {
            return Ok(false);
        }
        self.note_write(&mut slots, now);
        slots.insert(key.to_owned(), Slot::new(value, expiry));
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<bool, ConnectionError> {
        let now = Instant::now();
        let removed = self.slots.write().await.remove(key);
        Ok(removed.is_some_and(|slot| slot.is_live(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool, ConnectionError> {
        let now = Instant::now();
        let slots = self.slots.read().await;
        Ok(slots.get(key).is_some_and(|slot| slot.is_live(now)))
    }

    async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, ConnectionError> {
        let now = Instant::now();
        let slots = self.slots.read().await;
        Ok(slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .and_then(|slot| slot.expires_at)
            .map(|at| at - now))
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<u64, ConnectionError> {
        let now = Instant::now();
        let mut removed = 0;
        self.slots.write().await.retain(|key, slot| {
            if !key.starts_with(prefix) {
                return true;
            }
            if slot.is_live(now) {
                removed += 1;
            }
            false
        });
        Ok(removed)
    }

    async fn flush_all(&self) -> Result<(), ConnectionError> {
        self.slots.write().await.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        Ok(())
    }
}
