use std::ops::RangeInclusive;

use memscope_config::{CellWidth, MAX_COLUMNS};

use crate::{
    InspectorError,
    memory::{Address, MemoryRegion, RegionId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Which part of a region the table shows, and where the cursor is
///
/// Offsets are relative to the start of the region
pub struct ViewportState {
    pub region: RegionId,
    pub region_base: Address,
    pub region_length: u32,
    pub top_offset: u32,
    pub rows: u32,
    pub columns: u32,
    pub cell_width: CellWidth,
    pub cursor_offset: u32,
    pub selection: RangeInclusive<u32>,
    /// Where a shift selection grows from
    pub anchor_offset: u32,
}

impl ViewportState {
    pub fn new(region: &MemoryRegion, rows: u32, columns: u32, cell_width: CellWidth) -> Self {
        Self {
            region: region.id(),
            region_base: region.base(),
            region_length: region.length(),
            top_offset: 0,
            rows: rows.max(1),
            columns: columns.clamp(1, MAX_COLUMNS),
            cell_width,
            cursor_offset: 0,
            selection: 0..=(cell_width.bytes() - 1).min(region.length() - 1),
            anchor_offset: 0,
        }
    }

    /// Bytes shown per row
    pub fn row_bytes(&self) -> u64 {
        u64::from(self.columns) * u64::from(self.cell_width.bytes())
    }

    /// Absolute addresses currently on screen
    pub fn visible_range(&self) -> RangeInclusive<Address> {
        let page = u64::from(self.rows) * self.row_bytes();
        let end = (u64::from(self.top_offset) + page).min(u64::from(self.region_length)) - 1;

        (self.region_base + self.top_offset)..=(self.region_base + end as u32)
    }

    pub fn visible_length(&self) -> u32 {
        let range = self.visible_range();
        range.end() - range.start() + 1
    }

    pub fn cursor_address(&self) -> Address {
        self.region_base + self.cursor_offset
    }

    fn last_cell_offset(&self) -> u32 {
        let width = self.cell_width.bytes();
        (self.region_length - 1) / width * width
    }

    fn max_top_offset(&self) -> u32 {
        let row_bytes = self.row_bytes();
        let last_row = u64::from(self.region_length - 1) / row_bytes * row_bytes;

        last_row.saturating_sub(u64::from(self.rows - 1) * row_bytes) as u32
    }

    /// Scroll so the row holding `offset` is on top, returns whether anything moved
    pub fn scroll_to(&mut self, offset: u32) -> bool {
        let row_bytes = self.row_bytes();
        let aligned = (u64::from(offset) / row_bytes * row_bytes) as u32;
        let top = aligned.min(self.max_top_offset());

        let moved = top != self.top_offset;
        self.top_offset = top;

        moved
    }

    /// Region offset of a visible cell
    pub fn cell_offset(&self, row: u32, column: u32) -> Result<u32, InspectorError> {
        if row >= self.rows || column >= self.columns {
            return Err(InspectorError::CellOutOfView { row, column });
        }

        let offset = u64::from(self.top_offset)
            + u64::from(row) * self.row_bytes()
            + u64::from(column) * u64::from(self.cell_width.bytes());

        if offset >= u64::from(self.region_length) {
            return Err(InspectorError::CellOutOfView { row, column });
        }

        Ok(offset as u32)
    }

    /// Move the cursor to a cell and collapse the selection onto it
    pub fn select_cell(&mut self, row: u32, column: u32) -> Result<(), InspectorError> {
        let offset = self.cell_offset(row, column)?;

        self.place_cursor(offset);

        Ok(())
    }

    /// Grow the selection from the anchor up to a cell
    pub fn extend_selection(&mut self, row: u32, column: u32) -> Result<(), InspectorError> {
        let offset = self.cell_offset(row, column)?;

        let start = self.anchor_offset.min(offset);
        let end = self.anchor_offset.max(offset);

        self.cursor_offset = offset;
        self.selection = start..=self.cell_end(end);

        Ok(())
    }

    /// Move the cursor by whole rows and cells, scrolling to keep it visible
    pub fn move_cursor(&mut self, rows: i64, columns: i64) -> bool {
        let target = i128::from(self.cursor_offset)
            + i128::from(rows) * i128::from(self.row_bytes())
            + i128::from(columns) * i128::from(self.cell_width.bytes());
        let target = target.clamp(0, i128::from(self.last_cell_offset())) as u32;

        if target == self.cursor_offset {
            return false;
        }

        self.place_cursor(target);
        self.reveal(target);

        true
    }

    /// Place the cursor on an offset, scrolling only if it is not already visible
    pub fn jump_to(&mut self, offset: u32) {
        let width = self.cell_width.bytes();
        let offset = (offset / width * width).min(self.last_cell_offset());

        self.place_cursor(offset);
        self.reveal(offset);
    }

    /// Change how many rows are visible, keeping the cursor on screen
    pub fn set_rows(&mut self, rows: u32) {
        self.rows = rows.max(1);

        let top_offset = self.top_offset;
        self.top_offset = 0;
        self.scroll_to(top_offset);
        self.reveal(self.cursor_offset);
    }

    /// Change the cell width, realigning cursor and scroll position
    pub fn set_cell_width(&mut self, cell_width: CellWidth) {
        let width = cell_width.bytes();
        self.cell_width = cell_width;

        let top_offset = self.top_offset;
        self.top_offset = 0;
        self.scroll_to(top_offset);

        let cursor = (self.cursor_offset / width * width).min(self.last_cell_offset());
        self.place_cursor(cursor);
    }

    fn place_cursor(&mut self, offset: u32) {
        self.cursor_offset = offset;
        self.anchor_offset = offset;
        self.selection = offset..=self.cell_end(offset);
    }

    fn cell_end(&self, offset: u32) -> u32 {
        (offset + self.cell_width.bytes() - 1).min(self.region_length - 1)
    }

    fn reveal(&mut self, offset: u32) {
        let page = u64::from(self.rows) * self.row_bytes();

        if offset < self.top_offset {
            self.scroll_to(offset);
        } else if u64::from(offset) >= u64::from(self.top_offset) + page {
            let row_bytes = self.row_bytes();
            let row_start = u64::from(offset) / row_bytes * row_bytes;
            let top = row_start.saturating_sub(u64::from(self.rows - 1) * row_bytes);

            self.scroll_to(top as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use memscope_config::RegionConfig;

    use super::*;
    use crate::memory::AddressSpace;

    fn viewport(length: u32, cell_width: CellWidth) -> ViewportState {
        let address_space =
            AddressSpace::new([RegionConfig::new("Palette", 0x0500_0000, length, true)]).unwrap();
        let region = address_space.regions().containing(0x0500_0000).unwrap();

        ViewportState::new(region, 4, 8, cell_width)
    }

    #[test]
    fn visible_range() {
        let mut viewport = viewport(0x800, CellWidth::Byte);

        assert_eq!(viewport.visible_range(), 0x0500_0000..=0x0500_001f);
        assert_eq!(viewport.visible_length(), 0x20);

        viewport.cell_width = CellWidth::Word;
        assert_eq!(viewport.visible_range(), 0x0500_0000..=0x0500_007f);
    }

    #[test]
    fn scroll_aligns_and_clamps() {
        let mut viewport = viewport(0x800, CellWidth::Byte);

        assert!(viewport.scroll_to(0x123));
        assert_eq!(viewport.top_offset, 0x120);

        assert!(viewport.scroll_to(0xffff));
        assert_eq!(viewport.top_offset, 0x7e0);
        assert_eq!(viewport.visible_range(), 0x0500_07e0..=0x0500_07ff);

        assert!(!viewport.scroll_to(0x7ff));
    }

    #[test]
    fn short_region() {
        let mut viewport = viewport(0x0c, CellWidth::Byte);

        assert!(!viewport.scroll_to(0x08));
        assert_eq!(viewport.visible_range(), 0x0500_0000..=0x0500_000b);
        assert_eq!(
            viewport.select_cell(1, 4),
            Err(InspectorError::CellOutOfView { row: 1, column: 4 })
        );
    }

    #[test]
    fn select_cell() {
        let mut viewport = viewport(0x800, CellWidth::Halfword);
        viewport.scroll_to(0x40);

        viewport.select_cell(2, 3).unwrap();

        assert_eq!(viewport.cursor_offset, 0x40 + 2 * 16 + 3 * 2);
        assert_eq!(viewport.cursor_address(), 0x0500_0066);
        assert_eq!(viewport.selection, 0x66..=0x67);
        assert_eq!(
            viewport.select_cell(4, 0),
            Err(InspectorError::CellOutOfView { row: 4, column: 0 })
        );
    }

    #[test]
    fn extend_selection() {
        let mut viewport = viewport(0x800, CellWidth::Byte);

        viewport.select_cell(1, 2).unwrap();
        viewport.extend_selection(0, 5).unwrap();
        assert_eq!(viewport.selection, 0x05..=0x0a);

        viewport.extend_selection(3, 7).unwrap();
        assert_eq!(viewport.selection, 0x0a..=0x1f);
        assert_eq!(viewport.cursor_offset, 0x1f);
    }

    #[test]
    fn move_cursor_scrolls() {
        let mut viewport = viewport(0x800, CellWidth::Byte);

        assert!(viewport.move_cursor(4, 0));
        assert_eq!(viewport.cursor_offset, 0x20);
        assert_eq!(viewport.top_offset, 0x08);

        assert!(viewport.move_cursor(-5, 0));
        assert_eq!(viewport.cursor_offset, 0);
        assert_eq!(viewport.top_offset, 0);

        assert!(!viewport.move_cursor(0, -1));
    }

    #[test]
    fn huge_cursor_moves_clamp() {
        let mut viewport = viewport(0x800, CellWidth::Word);

        assert!(viewport.move_cursor(i64::MAX / 2, 0));
        assert_eq!(viewport.cursor_offset, 0x7fc);
        assert_eq!(viewport.top_offset, 0x780);

        assert!(viewport.move_cursor(i64::MIN, i64::MIN));
        assert_eq!(viewport.cursor_offset, 0);
        assert_eq!(viewport.top_offset, 0);

        assert!(viewport.move_cursor(0, i64::MAX));
        assert_eq!(viewport.cursor_offset, 0x7fc);
    }

    #[test]
    fn set_rows() {
        let mut viewport = viewport(0x800, CellWidth::Byte);

        viewport.jump_to(0x1f);
        viewport.set_rows(1);
        assert_eq!(viewport.visible_range(), 0x0500_0018..=0x0500_001f);

        viewport.set_rows(0x100);
        assert_eq!(viewport.top_offset, 0);
        assert_eq!(viewport.visible_length(), 0x800);
    }

    #[test]
    fn jump_to() {
        let mut viewport = viewport(0x800, CellWidth::Word);

        viewport.jump_to(0x403);

        assert_eq!(viewport.cursor_offset, 0x400);
        assert!(viewport.visible_range().contains(&0x0500_0400));
    }

    #[test]
    fn set_cell_width() {
        let mut viewport = viewport(0x800, CellWidth::Byte);

        viewport.scroll_to(0x18);
        viewport.select_cell(0, 3).unwrap();
        viewport.set_cell_width(CellWidth::Word);

        assert_eq!(viewport.top_offset, 0);
        assert_eq!(viewport.cursor_offset, 0x18);
        assert_eq!(viewport.selection, 0x18..=0x1b);
    }
}
