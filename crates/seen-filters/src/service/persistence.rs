//! Persistence gateway
//!
//! Moves the whole filter set to and from a [`FilterStore`]. At most one
//! write is in flight at a time; a second `store` while one is running is
//! skipped rather than queued. While a write is in flight every record is
//! flagged `storing` and answers membership tests with `false`. The flags
//! are cleared on every exit path, including a caller dropping the future
//! mid-write.

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::domain::{FilterMode, FilterSet};
use crate::error::StoreError;
use crate::ports::outbound::{BitArrayBackend, FilterStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    Written,
    /// Another write was in flight, or there was nothing to write.
    Skipped,
}

pub struct PersistenceGateway<S: FilterStore> {
    store: S,
    write_guard: Mutex<()>,
}

impl<S: FilterStore> PersistenceGateway<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_guard: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Write the current contents of `filters` to durable storage.
    ///
    /// The set lock is only held while flags are flipped and bytes are
    /// copied out, never across the storage call.
    pub async fn store<B>(
        &self,
        backend: &B,
        filters: &RwLock<FilterSet<B::Handle>>,
    ) -> Result<StoreOutcome, StoreError>
    where
        B: BitArrayBackend,
    {
        let Ok(_guard) = self.write_guard.try_lock() else {
            debug!("Store already in flight, skipping");
            return Ok(StoreOutcome::Skipped);
        };

        let stored = {
            let mut set = filters.write().await;
            if set.is_empty() {
                return Ok(StoreOutcome::Skipped);
            }
            if set.is_storing() {
                // Holding the write guard means no write is running, so
                // these flags were left by a cancelled store.
                warn!("Clearing storing flags left by an interrupted store");
                set.end_store();
            }
            set.begin_store();
            set.to_stored(backend)
        };
        let flags = StoringFlags::new(filters);

        let result = self.store.write(&stored).await;

        flags.clear().await;

        result.map(|()| {
            debug!(records = stored.records.len(), mode = %stored.mode, "Filter set stored");
            StoreOutcome::Written
        })
    }

    /// Read a previously stored set for `mode`.
    ///
    /// Returns `None` when nothing usable is stored: no entry, a record
    /// without bytes, a set written for a different mode, or duplicate
    /// thresholds. The caller then loads from the remote.
    pub async fn load<H>(&self, mode: FilterMode) -> Result<Option<FilterSet<H>>, StoreError> {
        let Some(stored) = self.store.read().await? else {
            debug!("No stored filter set");
            return Ok(None);
        };

        if !stored.is_complete() {
            warn!(records = stored.records.len(), "Stored filter set is incomplete");
            return Ok(None);
        }

        if stored.mode != mode {
            debug!(stored = %stored.mode, configured = %mode, "Stored filter set is for another mode");
            return Ok(None);
        }

        match FilterSet::from_stored(stored) {
            Ok(set) => Ok(Some(set)),
            Err(e) => {
                warn!(error = %e, "Stored filter set is invalid");
                Ok(None)
            }
        }
    }

    /// Delete the stored set. In-memory handles are the caller's to
    /// release.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store.remove().await
    }
}

/// Clears the storing flags of a set when dropped.
struct StoringFlags<'a, H> {
    filters: &'a RwLock<FilterSet<H>>,
    armed: bool,
}

impl<'a, H> StoringFlags<'a, H> {
    fn new(filters: &'a RwLock<FilterSet<H>>) -> Self {
        Self {
            filters,
            armed: true,
        }
    }

    async fn clear(mut self) {
        self.filters.write().await.end_store();
        self.armed = false;
    }
}

impl<H> Drop for StoringFlags<'_, H> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.filters.try_write() {
            Ok(mut set) => set.end_store(),
            // Picked up by the next store, which runs under the write guard.
            Err(_) => warn!("Filter set busy, storing flags cleared on next store"),
        }
    }
}
