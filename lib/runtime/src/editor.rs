use std::{
    ops::RangeInclusive,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use memscope_config::CellWidth;
use memscope_range::ContiguousRange;

use crate::{
    InspectorError,
    memory::{Address, AddressSpace},
    snapshot::SnapshotCache,
};

/// Applies user edits to the address space
///
/// Edits are committed one at a time and reach the core immediately, the last one committed
/// wins. Every attached cache drops snapshots overlapping an edit
#[derive(Debug)]
pub struct MemoryEditor {
    address_space: Arc<AddressSpace>,
    caches: Mutex<Vec<Weak<SnapshotCache>>>,
    commit: Mutex<()>,
}

impl MemoryEditor {
    pub fn new(address_space: Arc<AddressSpace>) -> Self {
        Self {
            address_space,
            caches: Mutex::default(),
            commit: Mutex::default(),
        }
    }

    /// Keep a cache coherent with edits for as long as it lives
    pub fn attach(&self, cache: &Arc<SnapshotCache>) {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);

        caches.retain(|cache| cache.strong_count() > 0);
        caches.push(Arc::downgrade(cache));
    }

    /// Store a single byte
    pub fn apply_byte(&self, address: Address, value: u8) -> Result<(), InspectorError> {
        self.apply_bytes(address, &[value])
    }

    /// Store a value as a little endian cell of the given width
    pub fn apply_edit(
        &self,
        address: Address,
        value: u64,
        width: CellWidth,
    ) -> Result<(), InspectorError> {
        if value > width.max_value() {
            return Err(InspectorError::InvalidValue {
                value: format!("{value:#x}"),
                width,
            });
        }

        if address % width.bytes() != 0 {
            return Err(InspectorError::Misaligned { address, width });
        }

        let bytes = value.to_le_bytes();
        self.apply_bytes(address, &bytes[..width.bytes() as usize])
    }

    /// Parse hexadecimal text typed into a cell and store it
    pub fn apply_text(
        &self,
        address: Address,
        text: &str,
        width: CellWidth,
    ) -> Result<(), InspectorError> {
        let value = parse_cell_value(text, width)?;

        self.apply_edit(address, value, width)
    }

    /// Store a run of bytes as a single edit
    pub fn apply_bytes(&self, address: Address, bytes: &[u8]) -> Result<(), InspectorError> {
        let Some(range) = u32::try_from(bytes.len())
            .ok()
            .and_then(|length| RangeInclusive::from_start_and_length(address, length))
        else {
            if bytes.is_empty() {
                return Ok(());
            }

            return Err(InspectorError::OutOfRange {
                address,
                length: bytes.len() as u64,
            });
        };

        let _guard = self.commit.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(error) = self.address_space.write(address, bytes) {
            tracing::warn!("Rejected edit at {:#010x}: {}", address, error);
            return Err(error);
        }

        self.invalidate(range);
        tracing::info!("Committed {} byte edit at {:#010x}", bytes.len(), address);

        Ok(())
    }

    fn invalidate(&self, range: RangeInclusive<Address>) {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);

        caches.retain(|cache| match cache.upgrade() {
            Some(cache) => {
                cache.invalidate(range.clone());
                true
            }
            None => false,
        });
    }
}

/// Accepts plain hex, or hex prefixed with `0x` or `$`
pub fn parse_cell_value(text: &str, width: CellWidth) -> Result<u64, InspectorError> {
    let invalid = || InspectorError::InvalidValue {
        value: text.to_string(),
        width,
    };

    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .or_else(|| trimmed.strip_prefix('$'))
        .unwrap_or(trimmed);

    if digits.is_empty() || digits.len() > width.hex_digits() {
        return Err(invalid());
    }

    u64::from_str_radix(digits, 16).map_err(|_| invalid())
}
