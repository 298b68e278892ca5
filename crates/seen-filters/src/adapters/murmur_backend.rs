//! Default bit-array backend
//!
//! Handles are plain [`BitArray`] values, so destroying one is a drop.

use crate::domain::bit_array::BitArray;
use crate::error::FilterError;
use crate::ports::outbound::BitArrayBackend;

#[derive(Clone, Copy, Debug, Default)]
pub struct MurmurBackend;

impl BitArrayBackend for MurmurBackend {
    type Handle = BitArray;

    fn create(&self, size_param: u8) -> Result<BitArray, FilterError> {
        BitArray::new(size_param)
    }

    fn load(&self, size_param: u8, bytes: &[u8]) -> Result<BitArray, FilterError> {
        BitArray::from_bytes(size_param, bytes)
    }

    fn destroy(&self, handle: BitArray) {
        drop(handle);
    }

    fn insert(&self, handle: &mut BitArray, size_param: u8, key: &[u8]) {
        debug_assert_eq!(handle.size_param(), size_param);
        handle.insert(key);
    }

    fn test(&self, handle: &BitArray, size_param: u8, key: &[u8]) -> bool {
        debug_assert_eq!(handle.size_param(), size_param);
        handle.contains(key)
    }

    fn combine(
        &self,
        target: &mut BitArray,
        other: &BitArray,
        size_param: u8,
    ) -> Result<(), FilterError> {
        if target.size_param() != size_param {
            return Err(FilterError::IncompatibleFilters {
                left: target.size_param(),
                right: size_param,
            });
        }
        target.union(other)
    }

    fn decompress(&self, bytes: &[u8]) -> Result<(BitArray, u8), FilterError> {
        let array = BitArray::decompress(bytes)?;
        let size_param = array.size_param();
        Ok((array, size_param))
    }

    fn snapshot(&self, handle: &BitArray) -> Vec<u8> {
        handle.as_bytes().to_vec()
    }
}
