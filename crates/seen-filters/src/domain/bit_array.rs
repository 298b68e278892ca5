//! Bit-array membership primitive
//!
//! Reproduces the layout of the published snapshot files exactly, so a
//! filter downloaded from the remote and a filter built locally agree on
//! every bit:
//!
//! - `2^size_param` bits stored as `2^(size_param - 3)` bytes
//! - `NUM_HASHES` MurmurHash3 (x86, 32-bit) hashes seeded `0..NUM_HASHES`
//! - index = `hash >> (32 - size_param)`, most-significant bit first
//!
//! INVARIANTS:
//! - No false negatives: after `insert(key)`, `contains(key)` is true until
//!   the array is dropped, regardless of later inserts or unions.
//! - `union` is only defined for arrays with the same `size_param`.

use std::io::{Cursor, Read, Write};

use bitvec::prelude::*;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::FilterError;

/// Number of hash functions used by the snapshot format.
pub const NUM_HASHES: u32 = 23;

/// Smallest accepted size parameter (one byte).
pub const MIN_SIZE_PARAM: u8 = 3;

/// Largest accepted size parameter (2^31 bits, 256 MiB).
pub const MAX_SIZE_PARAM: u8 = 31;

/// Byte length of a bit array with the given size parameter.
pub fn byte_len_for(size_param: u8) -> usize {
    1usize << (size_param - 3)
}

/// Size parameter for a buffer of `len` bytes, if `len` is a power of two.
pub fn size_param_for_len(len: usize) -> Option<u8> {
    if len == 0 || !len.is_power_of_two() {
        return None;
    }
    let size_param = len.trailing_zeros() as u8 + 3;
    (size_param <= MAX_SIZE_PARAM).then_some(size_param)
}

/// Validate a size parameter against the supported range.
pub fn check_size_param(size_param: u8) -> Result<(), FilterError> {
    if (MIN_SIZE_PARAM..=MAX_SIZE_PARAM).contains(&size_param) {
        Ok(())
    } else {
        Err(FilterError::InvalidSizeParam(size_param))
    }
}

/// Hash a key with MurmurHash3 x86_32 using a seed.
pub fn murmur_hash(key: &[u8], seed: u32) -> u32 {
    let mut cursor = Cursor::new(key);
    murmur3::murmur3_32(&mut cursor, seed).unwrap_or(0)
}

/// Bit indices touched by `key` in an array of `2^size_param` bits.
pub fn hash_indices(key: &[u8], size_param: u8) -> impl Iterator<Item = usize> + '_ {
    let shift = 32 - u32::from(size_param);
    (0..NUM_HASHES).map(move |seed| (murmur_hash(key, seed) >> shift) as usize)
}

/// Fixed-size bit array in snapshot layout
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitArray {
    bits: BitVec<u8, Msb0>,
    size_param: u8,
}

impl BitArray {
    /// Allocate a zeroed array of `2^size_param` bits.
    pub fn new(size_param: u8) -> Result<Self, FilterError> {
        check_size_param(size_param)?;
        Ok(Self {
            bits: BitVec::from_vec(vec![0u8; byte_len_for(size_param)]),
            size_param,
        })
    }

    /// Load an uncompressed buffer declared to have `size_param`.
    pub fn from_bytes(size_param: u8, bytes: &[u8]) -> Result<Self, FilterError> {
        check_size_param(size_param)?;
        let expected = byte_len_for(size_param);
        if bytes.len() != expected {
            return Err(FilterError::BufferSizeMismatch {
                size_param,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bits: BitVec::from_vec(bytes.to_vec()),
            size_param,
        })
    }

    /// Expand a gzip-compressed buffer, deriving the size parameter from
    /// the decompressed length.
    pub fn decompress(wire: &[u8]) -> Result<Self, FilterError> {
        let mut raw = Vec::new();
        GzDecoder::new(wire)
            .read_to_end(&mut raw)
            .map_err(|e| FilterError::DecompressionFailed(e.to_string()))?;
        let size_param = size_param_for_len(raw.len()).ok_or_else(|| {
            FilterError::DecompressionFailed(format!(
                "decompressed size {} is not a usable filter size",
                raw.len()
            ))
        })?;
        Ok(Self {
            bits: BitVec::from_vec(raw),
            size_param,
        })
    }

    /// Compress the array into the gzip wire form. `level` is 0..=9.
    pub fn compress(&self, level: u32) -> Result<Vec<u8>, FilterError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
        encoder
            .write_all(self.as_bytes())
            .and_then(|()| encoder.finish())
            .map_err(|e| FilterError::InvalidParameters(format!("compression failed: {}", e)))
    }

    /// Set the bits for `key`. Inserting an existing key is harmless.
    pub fn insert(&mut self, key: &[u8]) {
        for index in hash_indices(key, self.size_param) {
            self.bits.set(index, true);
        }
    }

    /// Test whether `key` might be present. Never a false negative.
    pub fn contains(&self, key: &[u8]) -> bool {
        hash_indices(key, self.size_param).all(|index| self.bits[index])
    }

    /// OR `other` into this array.
    pub fn union(&mut self, other: &BitArray) -> Result<(), FilterError> {
        if self.size_param != other.size_param {
            return Err(FilterError::IncompatibleFilters {
                left: self.size_param,
                right: other.size_param,
            });
        }

        let self_raw = self.bits.as_raw_mut_slice();
        let other_raw = other.bits.as_raw_slice();
        for (s, o) in self_raw.iter_mut().zip(other_raw.iter()) {
            *s |= *o;
        }
        Ok(())
    }

    /// Raw bytes in snapshot layout.
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }

    pub fn size_param(&self) -> u8 {
        self.size_param
    }

    pub fn byte_len(&self) -> usize {
        byte_len_for(self.size_param)
    }

    /// Number of bits currently set.
    pub fn bits_set(&self) -> usize {
        self.bits.count_ones()
    }
}
