//! Memscope Runtime
//!
//! Live memory inspection and editing over an emulated address space, meant to sit behind a
//! memory viewer window

use std::sync::Arc;

use memscope_config::{ConfigError, InspectorConfig};
use thiserror::Error;

pub use error::InspectorError;

/// Applying user edits
pub mod editor;
mod error;
/// Turning snapshots into table rows
pub mod format;
/// Address space and its regions
pub mod memory;
/// Inspector session state machine
pub mod session;
/// Snapshot capture and caching
pub mod snapshot;
/// Visible window and cursor
pub mod viewport;


use editor::MemoryEditor;
use memory::{AddressSpace, LayoutError};
use session::{InspectorSession, SessionSettings};
use snapshot::{CachePolicy, SnapshotCache};

#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Everything needed to open inspector sessions over one address space
///
/// Each session gets a cache of its own, [Inspector::cache] serves callers that want byte ranges
/// without a session
#[derive(Debug, Clone)]
pub struct Inspector {
    pub address_space: Arc<AddressSpace>,
    pub cache: Arc<SnapshotCache>,
    pub editor: Arc<MemoryEditor>,
    policy: CachePolicy,
    settings: SessionSettings,
}

impl Inspector {
    pub fn new(address_space: Arc<AddressSpace>, config: &InspectorConfig) -> Self {
        let policy = CachePolicy::from(config);
        let editor = Arc::new(MemoryEditor::new(address_space.clone()));
        let cache = Arc::new(SnapshotCache::new(address_space.clone(), policy));
        editor.attach(&cache);

        Self {
            address_space,
            cache,
            editor,
            policy,
            settings: SessionSettings::from(config),
        }
    }

    /// Build the address space described by the config's layout
    pub fn from_config(config: &InspectorConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let address_space = Arc::new(AddressSpace::new(config.layout.clone())?);

        Ok(Self::new(address_space, config))
    }

    pub fn open_session(&self) -> InspectorSession {
        let cache = Arc::new(SnapshotCache::new(self.address_space.clone(), self.policy));
        self.editor.attach(&cache);

        InspectorSession::new(cache, self.editor.clone(), self.settings)
    }
}
