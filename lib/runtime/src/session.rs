use std::{ops::RangeInclusive, sync::Arc};

use memscope_config::{CellWidth, InspectorConfig, MAX_COLUMNS};
use memscope_range::{ContiguousRange, RangeIntersection};
use strum::Display;

use crate::{
    InspectorError,
    editor::MemoryEditor,
    format::{Row, column_headers, format_rows},
    memory::{Address, RegionId},
    snapshot::{Snapshot, SnapshotCache},
    viewport::ViewportState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Uninitialized,
    RegionSelected,
    Browsing,
    Editing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub rows: u32,
    pub columns: u32,
    pub cell_width: CellWidth,
    pub show_ascii: bool,
}

impl From<&InspectorConfig> for SessionSettings {
    fn from(config: &InspectorConfig) -> Self {
        Self {
            rows: config.rows.max(1),
            columns: config.columns.clamp(1, MAX_COLUMNS),
            cell_width: config.cell_width,
            show_ascii: config.show_ascii,
        }
    }
}

/// One memory viewer window
///
/// Every navigation callback of the table maps to one method here. Bytes are only fetched when
/// the viewport moved, the cache dropped what we were showing, or a refresh tick finds the shown
/// snapshot out of date
#[derive(Debug)]
pub struct InspectorSession {
    state: SessionState,
    cache: Arc<SnapshotCache>,
    editor: Arc<MemoryEditor>,
    settings: SessionSettings,
    viewport: Option<ViewportState>,
    shown: Option<Snapshot>,
    needs_fetch: bool,
    seen_invalidations: u64,
}

impl InspectorSession {
    pub fn new(
        cache: Arc<SnapshotCache>,
        editor: Arc<MemoryEditor>,
        settings: SessionSettings,
    ) -> Self {
        let seen_invalidations = cache.invalidations();

        Self {
            state: SessionState::Uninitialized,
            cache,
            editor,
            settings,
            viewport: None,
            shown: None,
            needs_fetch: false,
            seen_invalidations,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn viewport(&self) -> Option<&ViewportState> {
        self.viewport.as_ref()
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Cache owned by this session, edits made anywhere through the editor reach it
    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Show a region from its start
    pub fn set_region(&mut self, region: RegionId) -> Result<(), InspectorError> {
        self.ensure_open()?;

        let region = self.cache.regions().get(region)?;
        let viewport = ViewportState::new(
            region,
            self.settings.rows,
            self.settings.columns,
            self.settings.cell_width,
        );

        tracing::info!("Inspecting {} at {:#010x}", region.name(), region.base());

        self.cache.cancel_refresh();
        self.viewport = Some(viewport);
        self.shown = None;
        self.needs_fetch = true;
        self.state = SessionState::RegionSelected;

        Ok(())
    }

    pub fn scroll_to(&mut self, offset: u32) -> Result<(), InspectorError> {
        self.leave_editing("scroll")?;
        let viewport = self.viewport_mut("scroll")?;

        if viewport.scroll_to(offset) {
            self.viewport_moved();
        }

        Ok(())
    }

    pub fn select_cell(&mut self, row: u32, column: u32) -> Result<(), InspectorError> {
        self.leave_editing("select a cell")?;
        self.viewport_mut("select a cell")?
            .select_cell(row, column)?;
        self.state = SessionState::Browsing;

        Ok(())
    }

    pub fn extend_selection(&mut self, row: u32, column: u32) -> Result<(), InspectorError> {
        self.leave_editing("extend the selection")?;
        self.viewport_mut("extend the selection")?
            .extend_selection(row, column)?;
        self.state = SessionState::Browsing;

        Ok(())
    }

    pub fn move_cursor(&mut self, rows: i64, columns: i64) -> Result<(), InspectorError> {
        self.leave_editing("move the cursor")?;
        let viewport = self.viewport_mut("move the cursor")?;
        let top = viewport.top_offset;

        viewport.move_cursor(rows, columns);

        if viewport.top_offset != top {
            self.viewport_moved();
        }
        self.state = SessionState::Browsing;

        Ok(())
    }

    /// Jump to an absolute address, switching regions if needed
    pub fn goto(&mut self, address: Address) -> Result<(), InspectorError> {
        self.ensure_open()?;
        let region = self.cache.regions().containing(address)?;
        let (id, base) = (region.id(), region.base());

        if self.viewport.as_ref().map(|viewport| viewport.region) != Some(id) {
            self.set_region(id)?;
        } else {
            self.leave_editing("go to an address")?;
        }

        let viewport = self.viewport_mut("go to an address")?;
        let top = viewport.top_offset;

        viewport.jump_to(address - base);

        if viewport.top_offset != top {
            self.viewport_moved();
        }
        self.state = SessionState::Browsing;

        Ok(())
    }

    /// Show a different number of rows
    pub fn set_rows(&mut self, rows: u32) -> Result<(), InspectorError> {
        self.ensure_open()?;
        self.abandon_edit("resize the view");
        self.settings.rows = rows.max(1);

        if let Some(viewport) = self.viewport.as_mut() {
            viewport.set_rows(rows);
            self.viewport_moved();
        }

        Ok(())
    }

    pub fn set_cell_width(&mut self, cell_width: CellWidth) -> Result<(), InspectorError> {
        self.ensure_open()?;
        self.abandon_edit("change the cell width");
        self.settings.cell_width = cell_width;

        if let Some(viewport) = self.viewport.as_mut() {
            viewport.set_cell_width(cell_width);
            self.viewport_moved();
        }

        Ok(())
    }

    /// Start editing the cell under the cursor
    pub fn begin_edit(&mut self) -> Result<(), InspectorError> {
        match self.state {
            SessionState::Browsing => {
                self.state = SessionState::Editing;
                Ok(())
            }
            SessionState::Closed => Err(InspectorError::Closed),
            state => Err(InspectorError::InvalidTransition {
                operation: "begin an edit",
                state,
            }),
        }
    }

    /// Commit the text typed into the cell under the cursor
    ///
    /// On failure the session stays in editing so the user can correct the input
    pub fn commit_edit(&mut self, text: &str) -> Result<(), InspectorError> {
        match self.state {
            SessionState::Editing => {}
            SessionState::Closed => return Err(InspectorError::Closed),
            state => {
                return Err(InspectorError::InvalidTransition {
                    operation: "commit an edit",
                    state,
                });
            }
        }

        let viewport = self.viewport_mut("commit an edit")?;
        let (address, width) = (viewport.cursor_address(), viewport.cell_width);
        let visible = viewport.visible_range();

        self.editor.apply_text(address, text, width)?;
        self.state = SessionState::Browsing;

        if RangeInclusive::from_start_and_length(address, width.bytes())
            .is_some_and(|edited| edited.intersects(&visible))
        {
            self.needs_fetch = true;
        }

        Ok(())
    }

    pub fn cancel_edit(&mut self) -> Result<(), InspectorError> {
        self.leave_editing("cancel an edit")
    }

    /// Periodic refresh, called once per displayed frame
    pub fn on_tick(&mut self) -> Result<(), InspectorError> {
        self.ensure_open()?;

        if let Some(shown) = &self.shown {
            if shown.is_stale() || !self.cache.is_fresh(shown) {
                self.needs_fetch = true;
            }
        }

        if self.viewport.is_some() {
            self.fetch()?;
        }

        Ok(())
    }

    /// Snapshot of the bytes on screen, fetched only if something changed
    pub fn snapshot(&mut self) -> Result<&Snapshot, InspectorError> {
        self.fetch()?;

        self.shown.as_ref().ok_or(InspectorError::InvalidTransition {
            operation: "show memory",
            state: self.state,
        })
    }

    /// Formatted rows for the table
    pub fn rows(&mut self) -> Result<Vec<Row>, InspectorError> {
        let show_ascii = self.settings.show_ascii;
        self.fetch()?;

        match (&self.viewport, &self.shown) {
            (Some(viewport), Some(snapshot)) => Ok(format_rows(
                snapshot,
                viewport.columns,
                viewport.cell_width,
                show_ascii,
            )),
            _ => Err(InspectorError::InvalidTransition {
                operation: "show memory",
                state: self.state,
            }),
        }
    }

    pub fn column_headers(&self) -> Vec<String> {
        match &self.viewport {
            Some(viewport) => column_headers(viewport.columns, viewport.cell_width),
            None => column_headers(self.settings.columns, self.settings.cell_width),
        }
    }

    /// Release every snapshot, no memory is touched after this
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        tracing::info!("Closing inspector session");

        self.cache.release();
        self.shown = None;
        self.viewport = None;
        self.needs_fetch = false;
        self.state = SessionState::Closed;
    }

    fn fetch(&mut self) -> Result<(), InspectorError> {
        self.ensure_open()?;

        let Some(viewport) = self.viewport.as_ref() else {
            return Err(InspectorError::InvalidTransition {
                operation: "show memory",
                state: self.state,
            });
        };

        let invalidations = self.cache.invalidations();
        if invalidations != self.seen_invalidations {
            self.seen_invalidations = invalidations;
            self.needs_fetch = true;
        }

        if !self.needs_fetch && self.shown.is_some() {
            return Ok(());
        }

        let range = viewport.visible_range();

        match self.cache.get_range(*range.start(), viewport.visible_length()) {
            Ok(snapshot) => {
                // A stale snapshot was served while someone else refreshes, try again next tick
                self.needs_fetch = snapshot.is_stale();
                self.shown = Some(snapshot);

                if self.state == SessionState::RegionSelected {
                    self.state = SessionState::Browsing;
                }

                Ok(())
            }
            Err(error) if error.is_informational() && self.shown.is_some() => {
                tracing::debug!("Keeping previous rows: {}", error);

                if let Some(shown) = self.shown.take() {
                    self.shown = Some(shown.into_stale());
                }

                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    fn viewport_moved(&mut self) {
        // Whatever was being fetched for the old position is useless now
        self.cache.cancel_refresh();
        self.needs_fetch = true;
    }

    fn viewport_mut(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut ViewportState, InspectorError> {
        let state = self.state;

        self.viewport
            .as_mut()
            .ok_or(InspectorError::InvalidTransition { operation, state })
    }

    fn leave_editing(&mut self, operation: &'static str) -> Result<(), InspectorError> {
        match self.state {
            SessionState::Closed => Err(InspectorError::Closed),
            SessionState::Uninitialized => Err(InspectorError::InvalidTransition {
                operation,
                state: self.state,
            }),
            _ => {
                self.abandon_edit(operation);
                Ok(())
            }
        }
    }

    fn abandon_edit(&mut self, operation: &'static str) {
        if self.state == SessionState::Editing {
            tracing::debug!("Abandoning edit to {}", operation);
            self.state = SessionState::Browsing;
        }
    }

    fn ensure_open(&self) -> Result<(), InspectorError> {
        if self.state == SessionState::Closed {
            return Err(InspectorError::Closed);
        }

        Ok(())
    }
}

impl Drop for InspectorSession {
    fn drop(&mut self) {
        self.close();
    }
}
