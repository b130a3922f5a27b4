use std::ops::RangeInclusive;

use bytes::Bytes;
use memscope_range::{ContiguousRange, RangeContainment};

use crate::memory::{Address, RegionId};

pub use cache::{CachePolicy, SnapshotCache};

mod cache;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable copy of a byte range taken at a single tick
pub struct Snapshot {
    region: RegionId,
    address: Address,
    start_offset: u32,
    bytes: Bytes,
    capture_tick: u64,
    /// Address space write generation observed when capturing
    generation: u64,
    stale: bool,
}

impl Snapshot {
    pub fn region(&self) -> RegionId {
        self.region
    }

    /// Absolute address of the first byte
    pub fn address(&self) -> Address {
        self.address
    }

    /// Offset of the first byte within its region
    pub fn start_offset(&self) -> u32 {
        self.start_offset
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn capture_tick(&self) -> u64 {
        self.capture_tick
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Set when this data is known to lag behind the address space
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn range(&self) -> RangeInclusive<Address> {
        // Snapshots are never empty and never leave their region
        self.address..=self.address + (self.bytes.len() as u32 - 1)
    }

    pub fn covers(&self, range: &RangeInclusive<Address>) -> bool {
        self.range().contains_range(range)
    }

    /// Narrow down to a sub range, sharing the same buffer
    pub(crate) fn slice(&self, range: &RangeInclusive<Address>) -> Self {
        debug_assert!(self.covers(range));

        let start = (range.start() - self.address) as usize;
        let length = ContiguousRange::len(range);

        Self {
            address: *range.start(),
            start_offset: self.start_offset + start as u32,
            bytes: self.bytes.slice(start..start + length),
            ..self.clone()
        }
    }

    pub(crate) fn into_stale(self) -> Self {
        Self {
            stale: true,
            ..self
        }
    }
}
