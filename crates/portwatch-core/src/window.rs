//! Maps a scroll position onto the slice of rows that has to be drawn.

pub const DEFAULT_OVERSCAN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibleRange {
    pub start_index: usize,
    /// Exclusive.
    pub end_index: usize,
    /// Distance from the top of the content to the first materialized row.
    pub top_offset: u64,
    pub total_height: u64,
}

impl VisibleRange {
    pub fn is_empty(&self) -> bool {
        self.start_index == self.end_index
    }
}

/// Minimal contiguous index range covering the viewport plus `overscan` rows
/// on either side. Never fails; degenerate inputs produce an empty range.
pub fn compute_visible_range(
    total_rows: usize,
    row_height: u32,
    scroll_offset: u64,
    container_height: u64,
    overscan: usize,
) -> VisibleRange {
    let row_height = u64::from(row_height);
    let total_height = (total_rows as u64).saturating_mul(row_height);
    if total_rows == 0 || row_height == 0 || container_height == 0 {
        return VisibleRange {
            total_height,
            ..VisibleRange::default()
        };
    }

    let raw_start = scroll_offset / row_height;
    let raw_end = scroll_offset
        .saturating_add(container_height)
        .div_ceil(row_height);

    let end_index = raw_end
        .saturating_add(overscan as u64)
        .min(total_rows as u64) as usize;
    let start_index = (raw_start.saturating_sub(overscan as u64) as usize).min(end_index);

    VisibleRange {
        start_index,
        end_index,
        top_offset: start_index as u64 * row_height,
        total_height,
    }
}

/// Scroll state owned by the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub scroll_offset: u64,
    pub container_height: u64,
}

impl Viewport {
    pub fn max_offset(&self, total_height: u64) -> u64 {
        total_height.saturating_sub(self.container_height)
    }

    pub fn scroll_by(&mut self, delta: i64, total_height: u64) {
        let next = if delta.is_negative() {
            self.scroll_offset.saturating_sub(delta.unsigned_abs())
        } else {
            self.scroll_offset.saturating_add(delta as u64)
        };
        self.scroll_offset = next.min(self.max_offset(total_height));
    }

    pub fn clamp(&mut self, total_height: u64) {
        self.scroll_offset = self.scroll_offset.min(self.max_offset(total_height));
    }

    /// Moves the viewport the least amount needed for row `index` to be fully
    /// visible.
    pub fn ensure_visible(&mut self, index: usize, row_height: u32) {
        let row_height = u64::from(row_height);
        let top = (index as u64).saturating_mul(row_height);
        let bottom = top.saturating_add(row_height);
        if top < self.scroll_offset {
            self.scroll_offset = top;
        } else if bottom > self.scroll_offset.saturating_add(self.container_height) {
            self.scroll_offset = bottom.saturating_sub(self.container_height);
        }
    }

    /// Index of the first row at least partly inside the viewport.
    pub fn first_row(&self, row_height: u32) -> usize {
        if row_height == 0 {
            return 0;
        }
        (self.scroll_offset / u64::from(row_height)) as usize
    }
}
