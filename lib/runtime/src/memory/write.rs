use std::sync::atomic::Ordering;

use num::traits::ToBytes;

use super::AddressSpace;
use crate::{InspectorError, memory::Address};

impl AddressSpace {
    /// Copy bytes into the address space
    ///
    /// The whole access is validated before anything is modified, a failed write leaves memory
    /// untouched
    pub fn write(&self, address: Address, buffer: &[u8]) -> Result<(), InspectorError> {
        self.write_internal(address, buffer, true)
    }

    /// Write as the machine itself would, ignoring region permissions
    ///
    /// Used for loading images into regions the inspector may not edit, like a cartridge ROM
    pub fn load(&self, address: Address, buffer: &[u8]) -> Result<(), InspectorError> {
        self.write_internal(address, buffer, false)
    }

    fn write_internal(
        &self,
        address: Address,
        buffer: &[u8],
        check_permissions: bool,
    ) -> Result<(), InspectorError> {
        if buffer.is_empty() {
            return Ok(());
        }

        let segments = self.table.resolve(address, buffer.len())?;

        for (id, segment) in &segments {
            let region = self.table.get(*id)?;

            if check_permissions && !region.writable() {
                return Err(InspectorError::ReadOnly {
                    address: *segment.start(),
                    region: region.name().to_string(),
                });
            }
        }

        let mut guards: Vec<_> = segments
            .iter()
            .map(|(id, _)| self.buffer_write(*id))
            .collect();

        for ((id, segment), guard) in segments.iter().zip(guards.iter_mut()) {
            let region = self.table.get(*id)?;
            let region_offset = (segment.start() - region.base()) as usize;
            let buffer_offset = (segment.start() - address) as usize;
            let length = (segment.end() - segment.start()) as usize + 1;

            guard[region_offset..region_offset + length]
                .copy_from_slice(&buffer[buffer_offset..buffer_offset + length]);
        }

        drop(guards);
        self.generation.fetch_add(1, Ordering::AcqRel);

        Ok(())
    }

    #[inline]
    /// Helper function to write with a little endian value
    pub fn write_le_value<T: ToBytes>(
        &self,
        address: Address,
        value: T,
    ) -> Result<(), InspectorError> {
        self.write(address, value.to_le_bytes().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use memscope_config::{InitialContents, RegionConfig};

    use crate::{InspectorError, memory::AddressSpace};

    fn address_space() -> AddressSpace {
        let mut bios = RegionConfig::new("BIOS", 0xffff_0000, 0x8000, false);
        bios.initial_contents = InitialContents::Value(0xea);

        AddressSpace::new([
            RegionConfig::new("Main RAM", 0x0200_0000, 0x40_0000, true),
            RegionConfig::new("Shared WRAM", 0x0300_0000, 0x8000, true),
            bios,
        ])
        .unwrap()
    }

    #[test]
    fn read_write() {
        let address_space = address_space();

        for (address, value) in [
            (0x0200_0000, 0x01),
            (0x0200_0010, 0xff),
            (0x023f_ffff, 0x7f),
            (0x0300_7fff, 0x80),
        ] {
            address_space.write(address, &[value]).unwrap();
            assert_eq!(address_space.read(address, 1).unwrap(), [value]);
        }
    }

    #[test]
    fn read_only() {
        let address_space = address_space();

        assert_eq!(
            address_space.write(0xffff_0004, &[0x00]),
            Err(InspectorError::ReadOnly {
                address: 0xffff_0004,
                region: "BIOS".into()
            })
        );
        assert_eq!(address_space.read(0xffff_0004, 1).unwrap(), [0xea]);
        assert_eq!(address_space.generation(), 0);
    }

    #[test]
    fn one_past_the_end() {
        let address_space =
            AddressSpace::new([RegionConfig::new("Main RAM", 0x0200_0000, 0x40_0000, true)])
                .unwrap();

        assert_eq!(
            address_space.write(0x0200_0010 + 0x40_0000, &[0xff]),
            Err(InspectorError::OutOfRange {
                address: 0x0240_0010,
                length: 1
            })
        );
    }

    #[test]
    fn gap_between_regions() {
        let address_space = address_space();

        assert_eq!(
            address_space.write(0x0240_0010, &[0xff]),
            Err(InspectorError::Unmapped {
                address: 0x0240_0010
            })
        );
    }

    #[test]
    fn partial_overrun_leaves_memory_untouched() {
        let address_space = address_space();

        assert!(address_space.write(0x023f_fffe, &[1, 2, 3, 4]).is_err());
        assert_eq!(address_space.read(0x023f_fffe, 2).unwrap(), [0, 0]);
    }

    #[test]
    fn load_ignores_permissions() {
        let address_space = address_space();

        address_space.load(0xffff_0000, &[0x01, 0x02]).unwrap();

        assert_eq!(address_space.read(0xffff_0000, 3).unwrap(), [0x01, 0x02, 0xea]);
        assert_eq!(
            address_space.load(0xffff_7fff, &[0x01, 0x02]),
            Err(InspectorError::OutOfRange {
                address: 0xffff_7fff,
                length: 2
            })
        );
    }

    #[test]
    fn writes_bump_generation() {
        let address_space = address_space();

        address_space.write_le_value(0x0200_0000, 0xdead_beefu32).unwrap();
        address_space.write(0x0200_0000, &[]).unwrap();

        assert_eq!(address_space.generation(), 1);
        assert_eq!(
            address_space.read(0x0200_0000, 4).unwrap(),
            [0xef, 0xbe, 0xad, 0xde]
        );
    }
}
