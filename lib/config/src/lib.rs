use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;
use std::{
    io::{Read, Write},
    path::PathBuf,
    sync::LazyLock,
};
use strum::{Display, EnumIter};
use thiserror::Error;

pub use layout::{InitialContents, RegionConfig, default_layout};

mod layout;

cfg_if::cfg_if! {
    if #[cfg(miri)] {
        pub static STORAGE_DIRECTORY: LazyLock<PathBuf> = LazyLock::new(PathBuf::default);
    } else if #[cfg(any(target_family = "unix", target_os = "windows"))] {
        pub static STORAGE_DIRECTORY: LazyLock<PathBuf> = LazyLock::new(|| {
            dirs::config_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("memscope")
        });
    } else {
        compile_error!("Unsupported target");
    }
}

/// Widest row the viewer will lay out, in cells
pub const MAX_COLUMNS: u32 = 0x1_0000;

/// Config location
pub static CONFIG_LOCATION: LazyLock<PathBuf> =
    LazyLock::new(|| STORAGE_DIRECTORY.join("inspector.ron"));

#[derive(Serialize, Deserialize, Debug, Clone, Copy, EnumIter, Display, PartialEq, Eq, Default)]
/// How far a cached snapshot may lag behind the address space
pub enum Staleness {
    /// Snapshots are reused until they are older than the configured age, and a
    /// previous snapshot is served while another refresh is running
    #[default]
    Frame,
    /// Snapshots are only reused if nothing was written since they were captured
    Exact,
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, EnumIter, Display, PartialEq, Eq, Hash, Default,
)]
/// Width of a single table cell
pub enum CellWidth {
    #[default]
    Byte,
    Halfword,
    Word,
}

impl CellWidth {
    /// Bytes covered by one cell
    pub const fn bytes(self) -> u32 {
        match self {
            CellWidth::Byte => 1,
            CellWidth::Halfword => 2,
            CellWidth::Word => 4,
        }
    }

    /// Largest value a cell of this width can hold
    pub const fn max_value(self) -> u64 {
        match self {
            CellWidth::Byte => u8::MAX as u64,
            CellWidth::Halfword => u16::MAX as u64,
            CellWidth::Word => u32::MAX as u64,
        }
    }

    /// Hex digits needed to print a cell
    pub const fn hex_digits(self) -> usize {
        self.bytes() as usize * 2
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not access config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("Could not serialize config: {0}")]
    Serialize(#[from] ron::Error),
    #[error("Viewport must have at least one row and one column")]
    EmptyViewport,
    #[error("Viewport cannot have more than {MAX_COLUMNS} columns (got {0})")]
    TooManyColumns(u32),
}

#[serde_inline_default]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
/// Settings the memory inspector must obey
pub struct InspectorConfig {
    #[serde(default)]
    /// Snapshot consistency policy
    pub staleness: Staleness,
    #[serde_inline_default(0)]
    /// Ticks a snapshot may lag behind the core under [Staleness::Frame]
    pub max_snapshot_age: u64,
    #[serde_inline_default(3)]
    /// Capture attempts before giving up when the core keeps crossing a tick boundary
    pub refresh_retries: u8,
    #[serde_inline_default(16)]
    /// Visible rows
    pub rows: u32,
    #[serde_inline_default(16)]
    /// Cells per row
    pub columns: u32,
    #[serde(default)]
    pub cell_width: CellWidth,
    #[serde_inline_default(true)]
    /// Render the printable ASCII gutter next to each row
    pub show_ascii: bool,
    #[serde_inline_default(default_layout())]
    /// Memory regions of the inspected bus
    pub layout: Vec<RegionConfig>,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            staleness: Staleness::default(),
            max_snapshot_age: 0,
            refresh_retries: 3,
            rows: 16,
            columns: 16,
            cell_width: CellWidth::default(),
            show_ascii: true,
            layout: default_layout(),
        }
    }
}

impl InspectorConfig {
    pub fn save(&self, writer: impl Write) -> Result<(), ConfigError> {
        ron::Options::default().to_io_writer_pretty(
            writer,
            self,
            PrettyConfig::new().struct_names(false),
        )?;

        Ok(())
    }

    pub fn load(reader: impl Read) -> Result<Self, ConfigError> {
        let config: Self = ron::de::from_reader(reader)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.columns == 0 {
            return Err(ConfigError::EmptyViewport);
        }

        if self.columns > MAX_COLUMNS {
            return Err(ConfigError::TooManyColumns(self.columns));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn cell_width_limits() {
        assert_eq!(CellWidth::Byte.max_value(), 0xff);
        assert_eq!(CellWidth::Halfword.max_value(), 0xffff);
        assert_eq!(CellWidth::Word.max_value(), 0xffff_ffff);
        assert_eq!(CellWidth::Word.hex_digits(), 8);
    }

    #[test]
    fn save_and_load_on_disk() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("inspector.ron");

        let config = InspectorConfig {
            staleness: Staleness::Exact,
            cell_width: CellWidth::Halfword,
            rows: 8,
            ..Default::default()
        };

        config.save(File::create(&path).unwrap()).unwrap();
        let loaded = InspectorConfig::load(File::open(&path).unwrap()).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let loaded = InspectorConfig::load("(staleness: Exact, columns: 8)".as_bytes()).unwrap();

        assert_eq!(loaded.staleness, Staleness::Exact);
        assert_eq!(loaded.columns, 8);
        assert_eq!(loaded.rows, 16);
        assert_eq!(loaded.refresh_retries, 3);
        assert!(loaded.show_ascii);
        assert_eq!(loaded.layout, default_layout());
    }

    #[test]
    fn empty_viewport_is_rejected() {
        assert!(matches!(
            InspectorConfig::load("(rows: 0)".as_bytes()),
            Err(ConfigError::EmptyViewport)
        ));
    }

    #[test]
    fn oversized_viewport_is_rejected() {
        let config = InspectorConfig {
            rows: u32::MAX,
            columns: u32::MAX,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooManyColumns(u32::MAX))
        ));
    }
}
