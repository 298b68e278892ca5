//! Filter record lifecycle
//!
//! A `FilterRecord` owns one bit-array handle for one score threshold plus
//! the provenance of the data it holds. The handle is either absent
//! (`Unmaterialized`, bytes held in wire or raw form) or live
//! (`Materialized`, bytes moved into the handle).
//!
//! INVARIANTS:
//! - A materialized record is never `compressed`.
//! - Only records with equal `size_param` can be combined.
//! - `test` answers `false` while a persistence write is in flight.

use serde::{Deserialize, Serialize};

use crate::domain::bit_array::size_param_for_len;
use crate::error::FilterError;
use crate::ports::outbound::BitArrayBackend;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Where the data currently held by a record came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterProvenance {
    pub last_downloaded: Timestamp,
    pub last_generated: Timestamp,
    pub next_generated: Timestamp,
}

/// Handle state of a record.
#[derive(Debug)]
pub enum Materialization<H> {
    Unmaterialized,
    Materialized(H),
}

impl<H> Materialization<H> {
    pub fn is_materialized(&self) -> bool {
        matches!(self, Materialization::Materialized(_))
    }

    fn handle(&self) -> Option<&H> {
        match self {
            Materialization::Materialized(h) => Some(h),
            Materialization::Unmaterialized => None,
        }
    }

    fn handle_mut(&mut self) -> Option<&mut H> {
        match self {
            Materialization::Materialized(h) => Some(h),
            Materialization::Unmaterialized => None,
        }
    }

    fn take(&mut self) -> Option<H> {
        match std::mem::replace(self, Materialization::Unmaterialized) {
            Materialization::Materialized(h) => Some(h),
            Materialization::Unmaterialized => None,
        }
    }
}

/// Durable form of a record. Never carries a handle or the storing flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFilter {
    pub threshold: u32,
    pub size_param: u8,
    pub compressed: bool,
    pub bytes: Vec<u8>,
    pub last_downloaded: Timestamp,
    pub last_generated: Timestamp,
    pub next_generated: Timestamp,
    pub filename: String,
}

#[derive(Debug)]
pub struct FilterRecord<H> {
    threshold: u32,
    size_param: u8,
    compressed: bool,
    bytes: Vec<u8>,
    filename: String,
    provenance: FilterProvenance,
    handle: Materialization<H>,
    storing: bool,
}

impl<H> FilterRecord<H> {
    /// Record for a freshly downloaded blob, not yet materialized.
    ///
    /// Raw (uncompressed) blobs must have a power-of-two length; the size
    /// parameter of a compressed blob is only known after decompression.
    pub fn downloaded(
        threshold: u32,
        filename: impl Into<String>,
        compressed: bool,
        bytes: Vec<u8>,
        provenance: FilterProvenance,
    ) -> Result<Self, FilterError> {
        let size_param = if compressed {
            0
        } else {
            size_param_for_len(bytes.len()).ok_or_else(|| {
                FilterError::InvalidParameters(format!(
                    "raw filter of {} bytes is not a power of two",
                    bytes.len()
                ))
            })?
        };

        Ok(Self {
            threshold,
            size_param,
            compressed,
            bytes,
            filename: filename.into(),
            provenance,
            handle: Materialization::Unmaterialized,
            storing: false,
        })
    }

    pub fn from_stored(stored: StoredFilter) -> Self {
        Self {
            threshold: stored.threshold,
            size_param: stored.size_param,
            compressed: stored.compressed,
            bytes: stored.bytes,
            filename: stored.filename,
            provenance: FilterProvenance {
                last_downloaded: stored.last_downloaded,
                last_generated: stored.last_generated,
                next_generated: stored.next_generated,
            },
            handle: Materialization::Unmaterialized,
            storing: false,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn size_param(&self) -> u8 {
        self.size_param
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn provenance(&self) -> FilterProvenance {
        self.provenance
    }

    pub fn is_materialized(&self) -> bool {
        self.handle.is_materialized()
    }

    pub fn is_storing(&self) -> bool {
        self.storing
    }

    /// Held bytes of an unmaterialized record; empty once materialized.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn set_next_generated(&mut self, next_generated: Timestamp) {
        self.provenance.next_generated = next_generated;
    }

    pub fn adopt_provenance(&mut self, provenance: FilterProvenance) {
        self.provenance = provenance;
    }

    pub fn begin_store(&mut self) {
        self.storing = true;
    }

    pub fn end_store(&mut self) {
        self.storing = false;
    }

    /// Move the held bytes into a live handle.
    ///
    /// Compressed bytes are decompressed and the size parameter is taken
    /// from the decompressed length. A failure leaves the record
    /// unmaterialized with its bytes intact; the caller refetches instead
    /// of retrying.
    pub fn materialize<B>(&mut self, backend: &B) -> Result<(), FilterError>
    where
        B: BitArrayBackend<Handle = H>,
    {
        if self.is_materialized() {
            return Ok(());
        }

        let handle = if self.compressed {
            let (handle, size_param) = backend.decompress(&self.bytes)?;
            self.size_param = size_param;
            handle
        } else {
            backend.load(self.size_param, &self.bytes)?
        };

        self.compressed = false;
        self.bytes = Vec::new();
        self.handle = Materialization::Materialized(handle);
        Ok(())
    }

    /// Destroy the live handle, if any. Idempotent.
    pub fn release<B>(&mut self, backend: &B)
    where
        B: BitArrayBackend<Handle = H>,
    {
        if let Some(handle) = self.handle.take() {
            backend.destroy(handle);
        }
    }

    /// Insert `key` if `score` meets the threshold. Returns whether the key
    /// was written.
    pub fn insert<B>(&mut self, backend: &B, key: &[u8], score: u32) -> bool
    where
        B: BitArrayBackend<Handle = H>,
    {
        if score < self.threshold {
            return false;
        }
        let size_param = self.size_param;
        match self.handle.handle_mut() {
            Some(handle) => {
                backend.insert(handle, size_param, key);
                true
            }
            None => false,
        }
    }

    pub fn test<B>(&self, backend: &B, key: &[u8]) -> bool
    where
        B: BitArrayBackend<Handle = H>,
    {
        if self.storing {
            return false;
        }
        self.handle
            .handle()
            .map(|handle| backend.test(handle, self.size_param, key))
            .unwrap_or(false)
    }

    /// OR `other` into this record. `other` stays alive; the caller
    /// releases it.
    pub fn combine<B>(&mut self, backend: &B, other: &FilterRecord<H>) -> Result<(), FilterError>
    where
        B: BitArrayBackend<Handle = H>,
    {
        if self.size_param != other.size_param {
            return Err(FilterError::IncompatibleFilters {
                left: self.size_param,
                right: other.size_param,
            });
        }
        let source = other
            .handle
            .handle()
            .ok_or(FilterError::NotMaterialized(other.threshold))?;
        let size_param = self.size_param;
        let target = self
            .handle
            .handle_mut()
            .ok_or(FilterError::NotMaterialized(self.threshold))?;
        backend.combine(target, source, size_param)
    }

    /// Durable form, reading the live bits out of the handle when there is
    /// one.
    pub fn to_stored<B>(&self, backend: &B) -> StoredFilter
    where
        B: BitArrayBackend<Handle = H>,
    {
        let (compressed, bytes) = match self.handle.handle() {
            Some(handle) => (false, backend.snapshot(handle)),
            None => (self.compressed, self.bytes.clone()),
        };
        StoredFilter {
            threshold: self.threshold,
            size_param: self.size_param,
            compressed,
            bytes,
            last_downloaded: self.provenance.last_downloaded,
            last_generated: self.provenance.last_generated,
            next_generated: self.provenance.next_generated,
            filename: self.filename.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MurmurBackend;
    use crate::domain::bit_array::BitArray;

    type Record = FilterRecord<BitArray>;

    fn provenance(generated: Timestamp) -> FilterProvenance {
        FilterProvenance {
            last_downloaded: generated,
            last_generated: generated,
            next_generated: generated + 86_400,
        }
    }

    fn raw_record(threshold: u32, size_param: u8) -> Record {
        let bytes = vec![0u8; 1 << (size_param - 3)];
        Record::downloaded(threshold, "hn-0.blob", false, bytes, provenance(100)).unwrap()
    }

    fn live_record(threshold: u32, size_param: u8) -> Record {
        let mut record = raw_record(threshold, size_param);
        record.materialize(&MurmurBackend).unwrap();
        record
    }

    #[test]
    fn test_materialize_raw_bytes() {
        let record = live_record(0, 16);

        assert!(record.is_materialized());
        assert!(!record.is_compressed());
        assert_eq!(record.size_param(), 16);
        assert!(record.bytes().is_empty(), "bytes move into the handle");
    }

    #[test]
    fn test_materialize_compressed_derives_size_param() {
        let mut array = BitArray::new(14).unwrap();
        array.insert(b"//example.com");
        let wire = array.compress(3).unwrap();

        let mut record = Record::downloaded(10, "hn-10.blob", true, wire, provenance(5)).unwrap();
        assert_eq!(record.size_param(), 0);

        record.materialize(&MurmurBackend).unwrap();

        assert_eq!(record.size_param(), 14);
        assert!(!record.is_compressed());
        assert!(record.test(&MurmurBackend, b"//example.com"));
    }

    #[test]
    fn test_materialize_failure_keeps_record_unmaterialized() {
        let mut record =
            Record::downloaded(0, "hn-0.blob", true, b"junk".to_vec(), provenance(5)).unwrap();

        let result = record.materialize(&MurmurBackend);

        assert!(matches!(result, Err(FilterError::DecompressionFailed(_))));
        assert!(!record.is_materialized());
        assert_eq!(record.bytes(), b"junk");
    }

    #[test]
    fn test_raw_download_must_be_power_of_two() {
        let result = Record::downloaded(0, "hn-0.blob", false, vec![0u8; 100], provenance(5));
        assert!(matches!(result, Err(FilterError::InvalidParameters(_))));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut record = live_record(0, 12);

        record.release(&MurmurBackend);
        record.release(&MurmurBackend);

        assert!(!record.is_materialized());
    }

    #[test]
    fn test_insert_respects_threshold() {
        let mut record = live_record(10, 16);

        assert!(!record.insert(&MurmurBackend, b"//low.example", 9));
        assert!(record.insert(&MurmurBackend, b"//high.example", 10));

        assert!(record.test(&MurmurBackend, b"//high.example"));
    }

    #[test]
    fn test_unmaterialized_record_ignores_insert_and_tests_false() {
        let mut record = raw_record(0, 12);

        assert!(!record.insert(&MurmurBackend, b"//a.example", 100));
        assert!(!record.test(&MurmurBackend, b"//a.example"));
    }

    #[test]
    fn test_storing_reads_as_absent() {
        let mut record = live_record(0, 16);
        record.insert(&MurmurBackend, b"//busy.example", 1);

        record.begin_store();
        assert!(!record.test(&MurmurBackend, b"//busy.example"));

        record.end_store();
        assert!(record.test(&MurmurBackend, b"//busy.example"));
    }

    #[test]
    fn test_combine_is_monotonic() {
        let mut a = live_record(0, 16);
        let mut b = live_record(0, 16);
        a.insert(&MurmurBackend, b"//a.example", 0);
        b.insert(&MurmurBackend, b"//b.example", 0);

        a.combine(&MurmurBackend, &b).unwrap();

        assert!(a.test(&MurmurBackend, b"//a.example"));
        assert!(a.test(&MurmurBackend, b"//b.example"));
        assert!(b.is_materialized(), "combine does not release the delta");
    }

    #[test]
    fn test_combine_rejects_size_mismatch() {
        let mut a = live_record(0, 16);
        let b = live_record(0, 15);

        assert_eq!(
            a.combine(&MurmurBackend, &b),
            Err(FilterError::IncompatibleFilters { left: 16, right: 15 })
        );
    }

    #[test]
    fn test_combine_requires_live_handles() {
        let mut a = live_record(0, 12);
        let b = raw_record(3, 12);

        assert_eq!(a.combine(&MurmurBackend, &b), Err(FilterError::NotMaterialized(3)));
    }

    #[test]
    fn test_stored_form_round_trip() {
        let mut record = live_record(10, 13);
        record.insert(&MurmurBackend, b"//kept.example", 50);

        let stored = record.to_stored(&MurmurBackend);
        assert!(!stored.compressed);
        assert_eq!(stored.bytes.len(), 1024);

        let mut restored = Record::from_stored(stored.clone());
        restored.materialize(&MurmurBackend).unwrap();

        assert_eq!(restored.to_stored(&MurmurBackend), stored);
        assert!(restored.test(&MurmurBackend, b"//kept.example"));
    }
}
