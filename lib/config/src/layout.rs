use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// What a region holds before anything touches it
pub enum InitialContents {
    Value(u8),
    Random,
}

impl Default for InitialContents {
    fn default() -> Self {
        Self::Value(0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegionConfig {
    pub name: String,
    pub base: u32,
    pub length: u32,
    pub readable: bool,
    pub writable: bool,
    #[serde(default)]
    pub initial_contents: InitialContents,
}

impl RegionConfig {
    pub fn new(name: impl Into<String>, base: u32, length: u32, writable: bool) -> Self {
        Self {
            name: name.into(),
            base,
            length,
            readable: true,
            writable,
            initial_contents: InitialContents::default(),
        }
    }
}

/// ARM9 bus of the dual screen handheld
pub fn default_layout() -> Vec<RegionConfig> {
    vec![
        RegionConfig::new("Main RAM", 0x0200_0000, 0x40_0000, true),
        RegionConfig::new("Shared WRAM", 0x0300_0000, 0x8000, true),
        RegionConfig::new("I/O", 0x0400_0000, 0x1_0000, true),
        RegionConfig::new("Palette", 0x0500_0000, 0x800, true),
        RegionConfig::new("VRAM", 0x0600_0000, 0xa_4000, true),
        RegionConfig::new("OAM", 0x0700_0000, 0x800, true),
        RegionConfig::new("Cartridge ROM", 0x0800_0000, 0x200_0000, false),
        RegionConfig::new("BIOS", 0xffff_0000, 0x8000, false),
    ]
}
