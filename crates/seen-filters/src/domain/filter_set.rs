//! Threshold-partitioned filter set
//!
//! One record per score threshold, kept sorted by threshold. A set is built
//! for one [`FilterMode`] and never changes mode in place; switching modes
//! means discarding the set and loading a new one.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::record::{FilterRecord, StoredFilter, Timestamp};
use crate::error::FilterError;
use crate::ports::outbound::BitArrayBackend;

/// Name of the single durable entry holding the whole set.
pub const STORE_ENTRY: &str = "bloom_filters";

/// How many thresholds a set tracks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// One record at threshold 0.
    #[default]
    Single,
    /// One record per threshold published by the remote.
    Multiple,
}

impl FilterMode {
    /// Thresholds this mode tracks given what the remote publishes.
    pub fn thresholds(&self, published: &[u32]) -> Vec<u32> {
        match self {
            FilterMode::Single => vec![0],
            FilterMode::Multiple => {
                let unique: BTreeSet<u32> = published.iter().copied().collect();
                unique.into_iter().collect()
            }
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::Single => f.write_str("single"),
            FilterMode::Multiple => f.write_str("multiple"),
        }
    }
}

impl FromStr for FilterMode {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(FilterMode::Single),
            "multiple" | "multi" => Ok(FilterMode::Multiple),
            other => Err(FilterError::InvalidParameters(format!(
                "unknown filter mode {:?}",
                other
            ))),
        }
    }
}

/// Durable form of a whole set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFilterSet {
    pub entry: String,
    pub mode: FilterMode,
    pub records: Vec<StoredFilter>,
}

impl StoredFilterSet {
    pub fn new(mode: FilterMode, records: Vec<StoredFilter>) -> Self {
        Self {
            entry: STORE_ENTRY.to_string(),
            mode,
            records,
        }
    }

    /// A set with no records, or any record without bytes, cannot be
    /// restored and must be refetched.
    pub fn is_complete(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| !r.bytes.is_empty())
    }
}

#[derive(Debug)]
pub struct FilterSet<H> {
    mode: FilterMode,
    records: Vec<FilterRecord<H>>,
}

impl<H> FilterSet<H> {
    pub fn new(mode: FilterMode) -> Self {
        Self {
            mode,
            records: Vec::new(),
        }
    }

    /// Build a set from records, rejecting duplicate thresholds.
    pub fn from_records(
        mode: FilterMode,
        mut records: Vec<FilterRecord<H>>,
    ) -> Result<Self, FilterError> {
        records.sort_by_key(|r| r.threshold());
        if let Some(pair) = records
            .windows(2)
            .find(|pair| pair[0].threshold() == pair[1].threshold())
        {
            return Err(FilterError::InvalidParameters(format!(
                "duplicate threshold {}",
                pair[0].threshold()
            )));
        }
        Ok(Self { mode, records })
    }

    pub fn from_stored(stored: StoredFilterSet) -> Result<Self, FilterError> {
        let records = stored
            .records
            .into_iter()
            .map(FilterRecord::from_stored)
            .collect();
        Self::from_records(stored.mode, records)
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[FilterRecord<H>] {
        &self.records
    }

    pub fn thresholds(&self) -> Vec<u32> {
        self.records.iter().map(|r| r.threshold()).collect()
    }

    pub fn record(&self, threshold: u32) -> Option<&FilterRecord<H>> {
        self.records.iter().find(|r| r.threshold() == threshold)
    }

    pub fn record_mut(&mut self, threshold: u32) -> Option<&mut FilterRecord<H>> {
        self.records.iter_mut().find(|r| r.threshold() == threshold)
    }

    /// Put `record` in place of the one with the same threshold, returning
    /// the displaced record so the caller can release it.
    pub fn replace(&mut self, record: FilterRecord<H>) -> Option<FilterRecord<H>> {
        match self
            .records
            .binary_search_by_key(&record.threshold(), |r| r.threshold())
        {
            Ok(index) => Some(std::mem::replace(&mut self.records[index], record)),
            Err(index) => {
                self.records.insert(index, record);
                None
            }
        }
    }

    /// Thresholds whose record reports `key` as present.
    pub fn query<B>(&self, backend: &B, key: &[u8]) -> BTreeSet<u32>
    where
        B: BitArrayBackend<Handle = H>,
    {
        self.records
            .iter()
            .filter(|r| r.test(backend, key))
            .map(|r| r.threshold())
            .collect()
    }

    /// Largest threshold reporting `key`, used for the badge.
    pub fn max_threshold<B>(&self, backend: &B, key: &[u8]) -> Option<u32>
    where
        B: BitArrayBackend<Handle = H>,
    {
        self.records
            .iter()
            .rev()
            .find(|r| r.test(backend, key))
            .map(|r| r.threshold())
    }

    /// Insert `key` into every record whose threshold `score` meets.
    /// Returns the number of records written.
    pub fn insert<B>(&mut self, backend: &B, key: &[u8], score: u32) -> usize
    where
        B: BitArrayBackend<Handle = H>,
    {
        self.records
            .iter_mut()
            .filter(|r| r.threshold() <= score)
            .map(|r| r.insert(backend, key, score))
            .filter(|written| *written)
            .count()
    }

    /// An empty set, or one with any record lacking a live handle, has to
    /// be loaded from scratch.
    pub fn needs_cold_load(&self) -> bool {
        self.records.is_empty() || self.records.iter().any(|r| !r.is_materialized())
    }

    /// Every record is still ahead of its next scheduled generation.
    pub fn all_fresh(&self, now: Timestamp) -> bool {
        !self.records.is_empty()
            && self
                .records
                .iter()
                .all(|r| now < r.provenance().next_generated)
    }

    pub fn is_storing(&self) -> bool {
        self.records.iter().any(|r| r.is_storing())
    }

    pub fn begin_store(&mut self) {
        self.records.iter_mut().for_each(|r| r.begin_store());
    }

    pub fn end_store(&mut self) {
        self.records.iter_mut().for_each(|r| r.end_store());
    }

    pub fn materialize_all<B>(&mut self, backend: &B) -> Result<(), FilterError>
    where
        B: BitArrayBackend<Handle = H>,
    {
        self.records
            .iter_mut()
            .try_for_each(|r| r.materialize(backend))
    }

    pub fn release_all<B>(&mut self, backend: &B)
    where
        B: BitArrayBackend<Handle = H>,
    {
        self.records.iter_mut().for_each(|r| r.release(backend));
    }

    pub fn to_stored<B>(&self, backend: &B) -> StoredFilterSet
    where
        B: BitArrayBackend<Handle = H>,
    {
        StoredFilterSet::new(
            self.mode,
            self.records.iter().map(|r| r.to_stored(backend)).collect(),
        )
    }
}
