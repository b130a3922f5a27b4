use memscope_config::CellWidth;
use thiserror::Error;

use crate::{
    memory::{Address, RegionId},
    session::SessionState,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Everything that can go wrong while inspecting memory
///
/// None of these are fatal to the core or to the session, they are meant to be shown to the
/// user
pub enum InspectorError {
    #[error("Nothing is mapped at {address:#010x}")]
    Unmapped { address: Address },
    #[error("Access of {length:#x} bytes at {address:#010x} runs past the end of mapped memory")]
    OutOfRange { address: Address, length: u64 },
    #[error("{region} is read only (write at {address:#010x})")]
    ReadOnly { address: Address, region: String },
    #[error("{region} cannot be read (read at {address:#010x})")]
    Denied { address: Address, region: String },
    #[error("{value:?} is not a valid {width} value")]
    InvalidValue { value: String, width: CellWidth },
    #[error("{address:#010x} is not aligned to a {width} cell")]
    Misaligned { address: Address, width: CellWidth },
    #[error("Snapshot captured at tick {captured} could not be brought up to date (now {current})")]
    StaleSnapshot { captured: u64, current: u64 },
    #[error("Refresh was cancelled before it completed")]
    RefreshCancelled,
    #[error("Unknown region {0}")]
    UnknownRegion(RegionId),
    #[error("Cell ({row}, {column}) is outside the viewport")]
    CellOutOfView { row: u32, column: u32 },
    #[error("Cannot {operation} while the session is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },
    #[error("Inspector session is closed")]
    Closed,
}

impl InspectorError {
    /// Notices that do not mean an operation was rejected
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            InspectorError::StaleSnapshot { .. } | InspectorError::RefreshCancelled
        )
    }
}
