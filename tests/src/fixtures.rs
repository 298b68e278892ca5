//! Builders for a published snapshot family.

use std::collections::BTreeMap;

use seen_filters::domain::{delta_blob_name, full_blob_name};
use seen_filters::{canonicalize, BitArray, RemoteManifest, StaticSnapshotSource, Timestamp};

pub const DAY: u64 = 86_400;
pub const PREFIX: &str = "hn";
pub const SIZE_PARAM: u8 = 16;

/// Compressed filter containing `urls`.
pub fn filter_blob(urls: &[&str]) -> Vec<u8> {
    let mut array = BitArray::new(SIZE_PARAM).expect("valid size");
    for url in urls {
        array.insert(canonicalize(url).expect("web url").as_bytes());
    }
    array.compress(3).expect("compress")
}

/// A remote that publishes one generation per day.
pub struct Publisher {
    pub source: StaticSnapshotSource,
    pub thresholds: Vec<u32>,
    dates: BTreeMap<Timestamp, String>,
}

impl Publisher {
    pub fn new(thresholds: &[u32]) -> Self {
        Self {
            source: StaticSnapshotSource::new(),
            thresholds: thresholds.to_vec(),
            dates: BTreeMap::new(),
        }
    }

    /// Publish full filters generated at `generated`, each holding the
    /// stories whose score meets its threshold.
    pub fn publish_full(&self, generated: Timestamp, stories: &[(&str, u32)]) {
        for threshold in &self.thresholds {
            let urls: Vec<&str> = stories
                .iter()
                .filter(|(_, score)| score >= threshold)
                .map(|(url, _)| *url)
                .collect();
            self.source
                .publish_blob(full_blob_name(PREFIX, *threshold), filter_blob(&urls));
        }
        self.publish_manifest(generated);
    }

    /// Publish a generation at `generated` together with a delta holding
    /// `stories` added since the generation at `since`.
    pub fn publish_delta(
        &mut self,
        since: Timestamp,
        generated: Timestamp,
        date: &str,
        stories: &[(&str, u32)],
    ) {
        for threshold in &self.thresholds {
            let urls: Vec<&str> = stories
                .iter()
                .filter(|(_, score)| score >= threshold)
                .map(|(url, _)| *url)
                .collect();
            self.source.publish_blob(
                delta_blob_name(PREFIX, date, *threshold),
                filter_blob(&urls),
            );
        }
        self.dates.insert(since, date.to_string());
        self.publish_manifest(generated);
    }

    fn publish_manifest(&self, generated: Timestamp) {
        self.source.publish_manifest(RemoteManifest {
            date_generated: generated,
            next_generated: generated + DAY,
            compressed: true,
            thresholds: self.thresholds.clone(),
            dates: self.dates.clone(),
        });
    }
}
