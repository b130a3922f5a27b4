use std::{
    fmt::Display,
    ops::RangeInclusive,
    sync::{
        PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use crossbeam::utils::CachePadded;
use memscope_config::{InitialContents, RegionConfig};
use memscope_range::{ContiguousRange, RangeIntersection};
use rand::RngCore;
use rangemap::RangeInclusiveMap;
use thiserror::Error;

use crate::InspectorError;

mod read;
mod write;

pub type Address = u32;

#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
/// Identifier for a region, stable for the lifetime of the address space
pub struct RegionId(pub(crate) u16);

impl Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A named, bounded, permissioned span of the address space
pub struct MemoryRegion {
    id: RegionId,
    name: String,
    range: RangeInclusive<Address>,
    readable: bool,
    writable: bool,
}

impl MemoryRegion {
    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Address {
        *self.range.start()
    }

    pub fn length(&self) -> u32 {
        self.range.end() - self.range.start() + 1
    }

    pub fn range(&self) -> RangeInclusive<Address> {
        self.range.clone()
    }

    pub fn readable(&self) -> bool {
        self.readable
    }

    pub fn writable(&self) -> bool {
        self.writable
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
/// Why a set of regions could not form an address space
pub enum LayoutError {
    #[error("Region {0:?} has no length")]
    Empty(String),
    #[error("Region {name:?} at {base:#010x} runs past the end of the address space")]
    AddressOverflow { name: String, base: Address },
    #[error("Region {name:?} overlaps {other:?}")]
    Overlapping { name: String, other: String },
    #[error("Region name {0:?} is used more than once")]
    DuplicateName(String),
    #[error("Too many regions")]
    TooManyRegions,
}

#[derive(Debug, Clone, Default)]
/// Sorted, non overlapping region descriptions with address lookup
pub struct RegionTable {
    regions: Vec<MemoryRegion>,
    lookup: RangeInclusiveMap<Address, RegionId>,
}

impl RegionTable {
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, id: RegionId) -> Result<&MemoryRegion, InspectorError> {
        self.regions
            .get(usize::from(id.0))
            .ok_or(InspectorError::UnknownRegion(id))
    }

    pub fn by_name(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|region| region.name == name)
    }

    /// Region holding a given address
    pub fn containing(&self, address: Address) -> Result<&MemoryRegion, InspectorError> {
        match self.lookup.get(&address) {
            Some(id) => self.get(*id),
            None => Err(self.unmapped_error(address, 1)),
        }
    }

    /// Split an access into the per region pieces it touches
    ///
    /// Every byte of the access must be mapped
    pub(crate) fn resolve(
        &self,
        address: Address,
        length: usize,
    ) -> Result<Vec<(RegionId, RangeInclusive<Address>)>, InspectorError> {
        let access_range = u32::try_from(length)
            .ok()
            .and_then(|length| RangeInclusive::from_start_and_length(address, length))
            .ok_or(InspectorError::OutOfRange {
                address,
                length: length as u64,
            })?;

        let mut segments = Vec::new();
        let mut expected = address;

        for (region_range, id) in self.lookup.overlapping(&access_range) {
            if *region_range.start() > expected {
                break;
            }

            let segment = region_range.intersection(&access_range);
            let end = *segment.end();
            segments.push((*id, segment));

            match end.checked_add(1) {
                Some(next) => expected = next,
                None => break,
            }
        }

        let covered_end = segments.last().map(|(_, segment)| *segment.end());

        match covered_end {
            Some(end) if end == *access_range.end() => Ok(segments),
            Some(_) => Err(InspectorError::OutOfRange {
                address,
                length: length as u64,
            }),
            None => Err(self.unmapped_error(address, length)),
        }
    }

    fn unmapped_error(&self, address: Address, length: usize) -> InspectorError {
        let highest = self.regions.last().map(|region| *region.range.end());

        match highest {
            Some(highest) if address <= highest => InspectorError::Unmapped { address },
            _ => InspectorError::OutOfRange {
                address,
                length: length as u64,
            },
        }
    }
}

/// The emulated machine's memory as seen by the inspector
///
/// Each region's bytes sit behind their own lock which is only ever held for a
/// single bounded copy, so the core is never blocked for longer than that
#[derive(Debug)]
pub struct AddressSpace {
    table: RegionTable,
    buffers: Vec<RwLock<Vec<u8>>>,
    /// Frame counter advanced by the core
    tick: CachePadded<AtomicU64>,
    /// Bumped after every committed write
    generation: CachePadded<AtomicU64>,
}

impl AddressSpace {
    pub fn new(layout: impl IntoIterator<Item = RegionConfig>) -> Result<Self, LayoutError> {
        let mut layout: Vec<_> = layout.into_iter().collect();
        layout.sort_by_key(|config| config.base);

        if u16::try_from(layout.len()).is_err() {
            return Err(LayoutError::TooManyRegions);
        }

        let mut table = RegionTable::default();
        let mut buffers = Vec::with_capacity(layout.len());

        for (index, config) in layout.into_iter().enumerate() {
            if config.length == 0 {
                return Err(LayoutError::Empty(config.name));
            }

            let range = RangeInclusive::from_start_and_length(config.base, config.length).ok_or(
                LayoutError::AddressOverflow {
                    name: config.name.clone(),
                    base: config.base,
                },
            )?;

            if let Some((_, other)) = table.lookup.overlapping(&range).next() {
                return Err(LayoutError::Overlapping {
                    name: config.name,
                    other: table.regions[usize::from(other.0)].name.clone(),
                });
            }

            if table.by_name(&config.name).is_some() {
                return Err(LayoutError::DuplicateName(config.name));
            }

            let mut buffer = vec![0; config.length as usize];
            match config.initial_contents {
                InitialContents::Value(0) => {}
                InitialContents::Value(value) => buffer.fill(value),
                InitialContents::Random => rand::rng().fill_bytes(&mut buffer),
            }

            // Bounded by the region count check above
            let id = RegionId(index as u16);

            tracing::debug!(
                "Mapped region {:?} at {:#010x?} (readable: {}, writable: {})",
                config.name,
                range,
                config.readable,
                config.writable
            );

            table.lookup.insert(range.clone(), id);
            table.regions.push(MemoryRegion {
                id,
                name: config.name,
                range,
                readable: config.readable,
                writable: config.writable,
            });
            buffers.push(RwLock::new(buffer));
        }

        Ok(Self {
            table,
            buffers,
            tick: CachePadded::new(AtomicU64::new(0)),
            generation: CachePadded::new(AtomicU64::new(0)),
        })
    }

    pub fn regions(&self) -> &RegionTable {
        &self.table
    }

    /// Current emulation tick
    #[inline]
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Called by the core at every frame boundary
    #[inline]
    pub fn advance_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count of committed writes so far
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    fn buffer_read(&self, id: RegionId) -> RwLockReadGuard<'_, Vec<u8>> {
        // Region buffers are plain bytes, a panicking writer cannot leave them inconsistent
        self.buffers[usize::from(id.0)]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn buffer_write(&self, id: RegionId) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.buffers[usize::from(id.0)]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
