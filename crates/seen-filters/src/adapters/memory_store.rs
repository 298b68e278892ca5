//! In-memory filter store for tests and ephemeral hosts.
//!
//! Clones share the same slot, so a test can keep a handle on the store it
//! gave to the engine.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::StoredFilterSet;
use crate::error::StoreError;
use crate::ports::outbound::FilterStore;

#[derive(Default)]
struct Slot {
    set: Mutex<Option<StoredFilterSet>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
    write_delay: Mutex<Option<Duration>>,
}

#[derive(Clone, Default)]
pub struct InMemoryFilterStore {
    slot: Arc<Slot>,
}

impl InMemoryFilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `set`.
    pub fn with_set(set: StoredFilterSet) -> Self {
        let store = Self::new();
        *store.slot.set.lock() = Some(set);
        store
    }

    /// Make subsequent writes fail with `StoreError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.slot.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.slot.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Hold every write open for `delay` before committing it.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.slot.write_delay.lock() = delay;
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.slot.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Option<StoredFilterSet> {
        self.slot.set.lock().clone()
    }
}

#[async_trait]
impl FilterStore for InMemoryFilterStore {
    async fn read(&self) -> Result<Option<StoredFilterSet>, StoreError> {
        if self.slot.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(self.slot.set.lock().clone())
    }

    async fn write(&self, set: &StoredFilterSet) -> Result<(), StoreError> {
        let delay = *self.slot.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.slot.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        *self.slot.set.lock() = Some(set.clone());
        self.slot.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self) -> Result<(), StoreError> {
        *self.slot.set.lock() = None;
        Ok(())
    }
}
