//! Remote manifest and update planning
//!
//! The manifest is fetched on every stale tick and never stored. It lists
//! the published thresholds and the dates for which delta blobs exist.
//!
//! Blob naming:
//! - full filter: `<prefix>-<threshold>.blob`
//! - delta: `<prefix>-<date>-<threshold>.blob`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::filter_set::FilterMode;
use crate::domain::record::{FilterProvenance, Timestamp};
use crate::error::SyncError;

/// A record whose data is older than this, relative to the oldest
/// published delta, is replaced instead of patched.
pub const DEFAULT_STALENESS_WINDOW_SECS: u64 = 7 * 86_400;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteManifest {
    pub date_generated: Timestamp,
    pub next_generated: Timestamp,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub thresholds: Vec<u32>,
    /// Delta generation time -> date string used in the blob name.
    #[serde(default)]
    pub dates: BTreeMap<Timestamp, String>,
}

impl RemoteManifest {
    pub fn from_json(bytes: &[u8]) -> Result<Self, SyncError> {
        let manifest: Self = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::InvalidManifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Date strings end up in blob URLs, so they are restricted to a safe
    /// character set.
    pub fn validate(&self) -> Result<(), SyncError> {
        for (timestamp, date) in &self.dates {
            let safe = !date.is_empty()
                && date
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
            if !safe {
                return Err(SyncError::InvalidManifest(format!(
                    "bad date string {:?} for timestamp {}",
                    date, timestamp
                )));
            }
        }
        Ok(())
    }

    /// Thresholds to track in `mode`. Empty means nothing usable was
    /// published.
    pub fn thresholds_for(&self, mode: FilterMode) -> Result<Vec<u32>, SyncError> {
        let thresholds = mode.thresholds(&self.thresholds);
        if thresholds.is_empty() {
            return Err(SyncError::EmptyManifest);
        }
        Ok(thresholds)
    }

    pub fn oldest_delta(&self) -> Option<(Timestamp, &str)> {
        self.dates
            .iter()
            .next()
            .map(|(timestamp, date)| (*timestamp, date.as_str()))
    }

    /// Delta whose timestamp is closest to `target`; the earlier one wins a
    /// tie.
    pub fn closest_delta(&self, target: Timestamp) -> Option<(Timestamp, &str)> {
        self.dates
            .iter()
            .min_by_key(|(timestamp, _)| timestamp.abs_diff(target))
            .map(|(timestamp, date)| (*timestamp, date.as_str()))
    }

    /// Provenance for data downloaded at `now` under this manifest.
    pub fn provenance_at(&self, now: Timestamp) -> FilterProvenance {
        FilterProvenance {
            last_downloaded: now,
            last_generated: self.date_generated,
            next_generated: self.next_generated,
        }
    }
}

pub fn full_blob_name(prefix: &str, threshold: u32) -> String {
    format!("{}-{}.blob", prefix, threshold)
}

pub fn delta_blob_name(prefix: &str, date: &str, threshold: u32) -> String {
    format!("{}-{}-{}.blob", prefix, date, threshold)
}

/// What to do with one record on a stale tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdatePlan {
    /// Nothing newer was published; only adopt `next_generated`.
    Skip,
    /// Fetch a full filter and swap it in.
    Replace,
    /// OR the delta published at `timestamp` into the record.
    Patch { timestamp: Timestamp, date: String },
}

/// Decide how to bring a record up to date with `manifest`.
pub fn plan_update(
    provenance: &FilterProvenance,
    manifest: &RemoteManifest,
    staleness_window: u64,
    force: bool,
) -> UpdatePlan {
    if !force && manifest.date_generated <= provenance.last_generated {
        return UpdatePlan::Skip;
    }

    let Some((oldest, _)) = manifest.oldest_delta() else {
        return UpdatePlan::Replace;
    };
    if oldest.saturating_sub(provenance.last_downloaded) > staleness_window {
        return UpdatePlan::Replace;
    }

    match manifest.closest_delta(provenance.last_generated) {
        Some((timestamp, date)) => UpdatePlan::Patch {
            timestamp,
            date: date.to_string(),
        },
        None => UpdatePlan::Replace,
    }
}
