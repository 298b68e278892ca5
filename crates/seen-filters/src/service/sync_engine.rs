//! Sync engine
//!
//! Owns the process-wide filter set and keeps it in step with the remote
//! snapshot. Each tick either:
//!
//! 1. cold-loads the whole set when any record lacks a live handle,
//! 2. does nothing while every record is ahead of its next generation,
//! 3. or walks the records in threshold order, skipping, patching with a
//!    delta, or replacing each one, then persists the set once.
//!
//! Ticks never overlap. Scheduled ticks that find one running return
//! [`SyncOutcome::Busy`]; forced syncs, resets and mode switches wait.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::domain::{
    canonicalize, delta_blob_name, full_blob_name, plan_update, FilterMode, FilterRecord,
    FilterSet, RemoteManifest, SyncConfig, UpdatePlan,
};
use crate::error::{FilterError, SourceError, SyncError};
use crate::metrics::{MetricsRecorder, NoOpMetrics};
use crate::ports::inbound::{RecordStatus, SeenFilterApi, SyncOutcome, SyncStatus};
use crate::ports::outbound::{BitArrayBackend, FilterStore, SnapshotSource, TimeSource};
use crate::service::persistence::{PersistenceGateway, StoreOutcome};

pub struct SyncEngine<B, R, S, T>
where
    B: BitArrayBackend,
    S: FilterStore,
{
    config: SyncConfig,
    backend: B,
    source: R,
    persistence: PersistenceGateway<S>,
    clock: T,
    filters: RwLock<FilterSet<B::Handle>>,
    /// Held for the duration of a tick, reset or mode switch.
    sync_lock: Mutex<()>,
    /// In-memory state has changes durable storage has not seen.
    dirty: AtomicBool,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<B, R, S, T> SyncEngine<B, R, S, T>
where
    B: BitArrayBackend,
    R: SnapshotSource,
    S: FilterStore,
    T: TimeSource,
{
    pub fn new(config: SyncConfig, backend: B, source: R, store: S, clock: T) -> Self {
        let mode = config.mode;
        Self {
            config,
            backend,
            source,
            persistence: PersistenceGateway::new(store),
            clock,
            filters: RwLock::new(FilterSet::new(mode)),
            sync_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        self.persistence.inner()
    }

    pub async fn mode(&self) -> FilterMode {
        self.filters.read().await.mode()
    }

    /// Restore the set from durable storage, or cold-load it from the
    /// remote when nothing usable is stored. A restored set is then
    /// brought up to date by a regular tick.
    ///
    /// Filters restored from storage stay usable even if that follow-up
    /// tick fails.
    pub async fn init(&self) -> Result<SyncOutcome, SyncError> {
        let _guard = self.sync_lock.lock().await;
        let mode = self.mode().await;

        if let Some(mut restored) = self.load_stored(mode).await {
            match restored.materialize_all(&self.backend) {
                Ok(()) => {
                    info!(mode = %mode, thresholds = ?restored.thresholds(), "Restored filters from storage");
                    self.swap_set(restored).await;
                    return self.run_tick(false).await;
                }
                Err(e) => {
                    warn!(error = %e, "Stored filters unusable, loading from remote");
                    restored.release_all(&self.backend);
                }
            }
        }

        self.run_tick(false).await
    }

    /// Scheduled tick. Returns `Busy` instead of waiting when another sync
    /// is running.
    pub async fn tick(&self, force: bool) -> Result<SyncOutcome, SyncError> {
        let Ok(_guard) = self.sync_lock.try_lock() else {
            debug!("Sync already running, skipping tick");
            return Ok(SyncOutcome::Busy);
        };
        self.run_tick(force).await
    }

    /// Drop every filter in memory and in storage, then load `mode` from
    /// the remote.
    ///
    /// The switch lasts for this process only. `SyncConfig::mode` is not
    /// rewritten, so the next start loads the configured mode and discards
    /// a stored set written for another one. Hosts that want the choice to
    /// stick persist it in their own configuration.
    pub async fn reconfigure(&self, mode: FilterMode) -> Result<SyncOutcome, SyncError> {
        let _guard = self.sync_lock.lock().await;
        info!(mode = %mode, "Switching filter mode");
        self.clear(mode).await?;
        self.run_tick(true).await
    }

    /// Largest threshold whose filter reports `url`, for the badge.
    pub async fn badge_threshold(&self, url: &str) -> Option<u32> {
        let key = match canonicalize(url) {
            Ok(key) => key,
            Err(e) => {
                debug!(error = %e, "Badge lookup for malformed URL");
                return None;
            }
        };
        let badge = self
            .filters
            .read()
            .await
            .max_threshold(&self.backend, key.as_bytes());
        self.metrics.record_query(badge.is_some());
        badge
    }

    /// Insert a batch and persist once. Malformed URLs are skipped.
    /// Returns how many URLs were inserted.
    pub async fn insert_batch<'a, I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, u32)> + Send,
        I::IntoIter: Send,
    {
        let mut inserted = 0;
        {
            let mut set = self.filters.write().await;
            for (url, score) in entries {
                match canonicalize(url) {
                    Ok(key) => {
                        set.insert(&self.backend, key.as_bytes(), score);
                        inserted += 1;
                    }
                    Err(e) => debug!(error = %e, "Skipping malformed URL"),
                }
            }
        }

        if inserted > 0 {
            self.dirty.store(true, Ordering::SeqCst);
            self.persist().await;
        }
        inserted
    }

    pub async fn status(&self) -> SyncStatus {
        let set = self.filters.read().await;
        SyncStatus {
            mode: set.mode(),
            records: set
                .records()
                .iter()
                .map(|r| {
                    let provenance = r.provenance();
                    RecordStatus {
                        threshold: r.threshold(),
                        size_param: r.size_param(),
                        materialized: r.is_materialized(),
                        last_downloaded: provenance.last_downloaded,
                        last_generated: provenance.last_generated,
                        next_generated: provenance.next_generated,
                    }
                })
                .collect(),
            dirty: self.dirty.load(Ordering::SeqCst),
        }
    }

    async fn query(&self, url: &str) -> BTreeSet<u32> {
        let key = match canonicalize(url) {
            Ok(key) => key,
            Err(e) => {
                debug!(error = %e, "Query for malformed URL");
                return BTreeSet::new();
            }
        };
        let present = self.filters.read().await.query(&self.backend, key.as_bytes());
        self.metrics.record_query(!present.is_empty());
        present
    }

    async fn load_stored(&self, mode: FilterMode) -> Option<FilterSet<B::Handle>> {
        match self.persistence.load(mode).await {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "Could not read stored filters");
                None
            }
        }
    }

    /// Must be called with `sync_lock` held.
    async fn run_tick(&self, force: bool) -> Result<SyncOutcome, SyncError> {
        self.metrics.record_tick();
        let result = self.tick_locked(force).await;
        if let Err(e) = &result {
            let fatal = e.is_fatal();
            self.metrics.record_sync_error(fatal);
            if fatal {
                error!(error = %e, "Sync failed on a corrupted snapshot family");
            } else {
                warn!(error = %e, "Sync tick abandoned");
            }
        }
        result
    }

    async fn tick_locked(&self, force: bool) -> Result<SyncOutcome, SyncError> {
        let (needs_cold_load, fresh) = {
            let set = self.filters.read().await;
            (set.needs_cold_load(), set.all_fresh(self.clock.now()))
        };

        if needs_cold_load {
            let manifest = self.source.fetch_manifest().await?;
            self.cold_load(&manifest).await?;
            return Ok(SyncOutcome::ColdLoaded);
        }

        if self.dirty.load(Ordering::SeqCst) {
            self.persist().await;
        }

        if fresh && !force {
            debug!("Filters fresh, nothing to do");
            return Ok(SyncOutcome::Fresh);
        }

        let manifest = self.source.fetch_manifest().await?;
        let (mode, thresholds) = {
            let set = self.filters.read().await;
            (set.mode(), set.thresholds())
        };

        if mode.thresholds(&manifest.thresholds) != thresholds {
            info!(
                held = ?thresholds,
                published = ?manifest.thresholds,
                "Published thresholds changed, reloading"
            );
            self.cold_load(&manifest).await?;
            return Ok(SyncOutcome::ColdLoaded);
        }

        let (mut replaced, mut patched, mut skipped) = (0, 0, 0);
        for threshold in thresholds {
            let result = self.update_record(threshold, &manifest, force).await;
            match result {
                Ok(UpdatePlan::Skip) => skipped += 1,
                Ok(UpdatePlan::Replace) => replaced += 1,
                Ok(UpdatePlan::Patch { .. }) => patched += 1,
                Err(e) => {
                    if replaced + patched + skipped > 0 {
                        self.dirty.store(true, Ordering::SeqCst);
                    }
                    return Err(e);
                }
            }
        }

        self.dirty.store(true, Ordering::SeqCst);
        self.persist().await;

        info!(replaced, patched, skipped, "Sync tick complete");
        Ok(SyncOutcome::Updated {
            replaced,
            patched,
            skipped,
        })
    }

    /// Bring one record up to date, returning the plan that was carried
    /// out. A delta that is missing or will not decompress falls back to a
    /// full replacement.
    async fn update_record(
        &self,
        threshold: u32,
        manifest: &RemoteManifest,
        force: bool,
    ) -> Result<UpdatePlan, SyncError> {
        let provenance = {
            let set = self.filters.read().await;
            match set.record(threshold) {
                Some(record) => record.provenance(),
                None => return Err(FilterError::NotMaterialized(threshold).into()),
            }
        };

        let plan = plan_update(
            &provenance,
            manifest,
            self.config.staleness_window_secs,
            force,
        );

        match &plan {
            UpdatePlan::Skip => {
                debug!(threshold, next_generated = manifest.next_generated, "Manifest not newer");
                if let Some(record) = self.filters.write().await.record_mut(threshold) {
                    record.set_next_generated(manifest.next_generated);
                }
            }
            UpdatePlan::Replace => {
                self.replace_record(threshold, manifest).await?;
            }
            UpdatePlan::Patch { date, .. } => {
                match self.patch_record(threshold, date, manifest).await {
                    Ok(()) => {}
                    Err(SyncError::Filter(FilterError::DecompressionFailed(reason)))
                    | Err(SyncError::NetworkUnavailable(SourceError::NotFound(reason))) => {
                        warn!(threshold, date = %date, reason = %reason, "Delta unusable, replacing filter");
                        self.replace_record(threshold, manifest).await?;
                        return Ok(UpdatePlan::Replace);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(plan)
    }

    async fn download(
        &self,
        threshold: u32,
        name: String,
        manifest: &RemoteManifest,
    ) -> Result<(FilterRecord<B::Handle>, usize), SyncError> {
        let bytes = self.source.fetch_blob(&name).await?;
        let len = bytes.len();
        let mut record = FilterRecord::downloaded(
            threshold,
            name,
            manifest.compressed,
            bytes,
            manifest.provenance_at(self.clock.now()),
        )?;
        record.materialize(&self.backend)?;
        Ok((record, len))
    }

    async fn replace_record(&self, threshold: u32, manifest: &RemoteManifest) -> Result<(), SyncError> {
        let name = full_blob_name(&self.config.blob_prefix, threshold);
        let (record, len) = self.download(threshold, name, manifest).await?;
        info!(
            threshold,
            size_param = record.size_param(),
            filename = %record.filename(),
            "Replacing filter"
        );

        if let Some(mut old) = self.filters.write().await.replace(record) {
            old.release(&self.backend);
        }
        self.metrics.record_full_download(len);
        Ok(())
    }

    async fn patch_record(
        &self,
        threshold: u32,
        date: &str,
        manifest: &RemoteManifest,
    ) -> Result<(), SyncError> {
        let name = delta_blob_name(&self.config.blob_prefix, date, threshold);
        let (mut delta, len) = self.download(threshold, name, manifest).await?;

        let result = {
            let mut set = self.filters.write().await;
            match set.record_mut(threshold) {
                Some(record) => record.combine(&self.backend, &delta).map(|()| {
                    record.adopt_provenance(delta.provenance());
                }),
                None => Err(FilterError::NotMaterialized(threshold)),
            }
        };
        delta.release(&self.backend);
        result?;

        debug!(threshold, date = %date, filename = %delta.filename(), "Delta merged");
        self.metrics.record_delta_merged(len);
        Ok(())
    }

    /// Fetch every threshold's full filter for the current mode and swap
    /// the new set in. Nothing changes unless every download succeeds.
    async fn cold_load(&self, manifest: &RemoteManifest) -> Result<(), SyncError> {
        let mode = self.mode().await;
        let thresholds = manifest.thresholds_for(mode)?;

        let mut records = Vec::with_capacity(thresholds.len());
        let mut total = 0;
        for threshold in &thresholds {
            let name = full_blob_name(&self.config.blob_prefix, *threshold);
            match self.download(*threshold, name, manifest).await {
                Ok((record, len)) => {
                    total += len;
                    records.push(record);
                }
                Err(e) => {
                    for record in &mut records {
                        record.release(&self.backend);
                    }
                    return Err(e);
                }
            }
        }

        let set = FilterSet::from_records(mode, records)?;
        info!(mode = %mode, thresholds = ?thresholds, bytes = total, "Cold load complete");
        self.swap_set(set).await;
        self.metrics.record_cold_load();

        self.dirty.store(true, Ordering::SeqCst);
        self.persist().await;
        Ok(())
    }

    async fn swap_set(&self, set: FilterSet<B::Handle>) {
        let mut old = std::mem::replace(&mut *self.filters.write().await, set);
        old.release_all(&self.backend);
    }

    /// Release every handle, delete stored state and start over empty in
    /// `mode`. Must be called with `sync_lock` held.
    async fn clear(&self, mode: FilterMode) -> Result<(), SyncError> {
        self.swap_set(FilterSet::new(mode)).await;
        self.dirty.store(false, Ordering::SeqCst);
        self.persistence.reset().await?;
        Ok(())
    }

    /// Write the set if it has unsaved changes. Storage failures keep the
    /// set dirty so the next tick retries.
    async fn persist(&self) -> bool {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return false;
        }

        match self.persistence.store(&self.backend, &self.filters).await {
            Ok(StoreOutcome::Written) => {
                self.metrics.record_store(false);
                true
            }
            Ok(StoreOutcome::Skipped) => {
                self.metrics.record_store(true);
                self.dirty.store(true, Ordering::SeqCst);
                false
            }
            Err(e) => {
                warn!(error = %e, "Could not persist filters, will retry next tick");
                self.dirty.store(true, Ordering::SeqCst);
                false
            }
        }
    }
}

#[async_trait]
impl<B, R, S, T> SeenFilterApi for SyncEngine<B, R, S, T>
where
    B: BitArrayBackend + 'static,
    R: SnapshotSource + 'static,
    S: FilterStore + 'static,
    T: TimeSource + 'static,
{
    async fn query_set(&self, url: &str) -> BTreeSet<u32> {
        self.query(url).await
    }

    async fn insert_set(&self, url: &str, score: u32) -> Result<(), SyncError> {
        let key = canonicalize(url)?;
        let written = self
            .filters
            .write()
            .await
            .insert(&self.backend, key.as_bytes(), score);
        debug!(key = %key, score, records = written, "Inserted");

        if written > 0 {
            self.dirty.store(true, Ordering::SeqCst);
            self.persist().await;
        }
        Ok(())
    }

    async fn force_sync(&self) -> Result<SyncOutcome, SyncError> {
        let _guard = self.sync_lock.lock().await;
        self.run_tick(true).await
    }

    async fn reset_all(&self) -> Result<(), SyncError> {
        let _guard = self.sync_lock.lock().await;
        let mode = self.mode().await;
        info!(mode = %mode, "Resetting all filters");
        self.clear(mode).await
    }
}
