use num::traits::FromBytes;

use super::AddressSpace;
use crate::{InspectorError, memory::Address};

impl AddressSpace {
    /// Copy bytes out of the address space
    ///
    /// Every region touched is locked before the first byte is copied, so the
    /// result never shows a half applied write
    pub fn read_into(&self, address: Address, buffer: &mut [u8]) -> Result<(), InspectorError> {
        if buffer.is_empty() {
            return Ok(());
        }

        let segments = self.table.resolve(address, buffer.len())?;

        for (id, segment) in &segments {
            let region = self.table.get(*id)?;

            if !region.readable() {
                return Err(InspectorError::Denied {
                    address: *segment.start(),
                    region: region.name().to_string(),
                });
            }
        }

        let guards: Vec<_> = segments
            .iter()
            .map(|(id, _)| self.buffer_read(*id))
            .collect();

        for ((id, segment), guard) in segments.iter().zip(guards.iter()) {
            let region = self.table.get(*id)?;
            let region_offset = (segment.start() - region.base()) as usize;
            let buffer_offset = (segment.start() - address) as usize;
            let length = (segment.end() - segment.start()) as usize + 1;

            buffer[buffer_offset..buffer_offset + length]
                .copy_from_slice(&guard[region_offset..region_offset + length]);
        }

        Ok(())
    }

    /// Read `length` bytes starting at `address`
    pub fn read(&self, address: Address, length: u32) -> Result<Vec<u8>, InspectorError> {
        let mut buffer = vec![0; length as usize];
        self.read_into(address, &mut buffer)?;

        Ok(buffer)
    }

    /// Given a location, read a little endian value
    #[inline]
    pub fn read_le_value<T: FromBytes>(&self, address: Address) -> Result<T, InspectorError>
    where
        T::Bytes: Default,
    {
        let mut buffer = T::Bytes::default();
        self.read_into(address, buffer.as_mut())?;

        Ok(T::from_le_bytes(&buffer))
    }
}
