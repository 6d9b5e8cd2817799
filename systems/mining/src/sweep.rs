//! Boustrophedon raster order over the interior footprint.

use serde::{Deserialize, Serialize};

use quarry_rig_core::{Bounds, ColumnCoord, Facing};

/// Deterministic per-layer visiting order.
///
/// Rows run along the axis perpendicular to the facing and alternate their
/// traversal direction. The first layer starts in the row closest to the rig.
/// Every following layer starts in the corner where the previous one ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPlanner {
    facing: Facing,
    rows_reversed: bool,
    cols_reversed: bool,
}

impl SweepPlanner {
    /// Creates the order for the first layer of a rig facing `facing`.
    #[must_use]
    pub const fn new(facing: Facing) -> Self {
        Self {
            facing,
            rows_reversed: matches!(facing, Facing::South | Facing::East),
            cols_reversed: false,
        }
    }

    /// Reports whether rows are visited from the far end of the envelope.
    #[must_use]
    pub const fn rows_reversed(&self) -> bool {
        self.rows_reversed
    }

    /// Reports whether the first row is traversed toward decreasing
    /// coordinates.
    #[must_use]
    pub const fn cols_reversed(&self) -> bool {
        self.cols_reversed
    }

    /// Number of cells in a layer.
    #[must_use]
    pub fn len(&self, bounds: &Bounds) -> usize {
        Layout::of(self.facing, bounds).len()
    }

    /// Reports whether the layer has no cells.
    #[must_use]
    pub fn is_empty(&self, bounds: &Bounds) -> bool {
        self.len(bounds) == 0
    }

    /// Column visited at `index` in the current layer.
    #[must_use]
    pub fn column_at(&self, bounds: &Bounds, index: usize) -> Option<ColumnCoord> {
        let layout = Layout::of(self.facing, bounds);
        if index >= layout.len() {
            return None;
        }
        let row = index / layout.row_len;
        let within = index % layout.row_len;
        let forward = (row % 2 == 0) != self.cols_reversed;
        let col = if forward {
            within
        } else {
            layout.row_len - 1 - within
        };
        let row = if self.rows_reversed {
            layout.rows - 1 - row
        } else {
            row
        };
        Some(layout.column(row, col))
    }

    /// Position of `column` in the current layer's order.
    #[must_use]
    pub fn index_of(&self, bounds: &Bounds, column: ColumnCoord) -> Option<usize> {
        let layout = Layout::of(self.facing, bounds);
        let (row, col) = layout.offsets(column)?;
        let row = if self.rows_reversed {
            layout.rows - 1 - row
        } else {
            row
        };
        let forward = (row % 2 == 0) != self.cols_reversed;
        let within = if forward {
            col
        } else {
            layout.row_len - 1 - col
        };
        Some(row * layout.row_len + within)
    }

    /// First column of the current layer.
    #[must_use]
    pub fn first(&self, bounds: &Bounds) -> Option<ColumnCoord> {
        self.column_at(bounds, 0)
    }

    /// Strictly-next column after `after` accepted by `accept`.
    ///
    /// `None` as `after` starts from the beginning of the layer. Returns
    /// `None` once the last row has been passed.
    pub fn next<F>(
        &self,
        bounds: &Bounds,
        after: Option<ColumnCoord>,
        mut accept: F,
    ) -> Option<ColumnCoord>
    where
        F: FnMut(ColumnCoord) -> bool,
    {
        let start = after
            .and_then(|column| self.index_of(bounds, column))
            .map_or(0, |index| index + 1);
        (start..self.len(bounds))
            .filter_map(|index| self.column_at(bounds, index))
            .find(|column| accept(*column))
    }

    /// Every column of the current layer in visiting order.
    pub fn order<'a>(&'a self, bounds: &'a Bounds) -> impl Iterator<Item = ColumnCoord> + 'a {
        (0..self.len(bounds)).filter_map(move |index| self.column_at(bounds, index))
    }

    /// Switches to the order of the next layer down.
    ///
    /// The row order flips so the next layer starts in the row the current
    /// one ended in, and the first row starts on the side the last row
    /// finished on.
    pub fn descend(&mut self, bounds: &Bounds) {
        let layout = Layout::of(self.facing, bounds);
        let last_row = layout.rows.saturating_sub(1);
        let last_forward = (last_row % 2 == 0) != self.cols_reversed;
        self.rows_reversed = !self.rows_reversed;
        self.cols_reversed = last_forward;
    }
}

/// Maps row/column offsets onto world columns for a given facing.
struct Layout {
    along_z: bool,
    row_origin: i32,
    col_origin: i32,
    rows: usize,
    row_len: usize,
}

impl Layout {
    fn of(facing: Facing, bounds: &Bounds) -> Self {
        let width = usize::try_from(bounds.interior_width()).unwrap_or(0);
        let depth = usize::try_from(bounds.interior_depth()).unwrap_or(0);
        let x0 = *bounds.interior_x().start();
        let z0 = *bounds.interior_z().start();
        if facing.is_along_z() {
            Self {
                along_z: true,
                row_origin: z0,
                col_origin: x0,
                rows: depth,
                row_len: width,
            }
        } else {
            Self {
                along_z: false,
                row_origin: x0,
                col_origin: z0,
                rows: width,
                row_len: depth,
            }
        }
    }

    fn len(&self) -> usize {
        self.rows * self.row_len
    }

    fn column(&self, row: usize, col: usize) -> ColumnCoord {
        let row = self.row_origin + i32::try_from(row).unwrap_or(0);
        let col = self.col_origin + i32::try_from(col).unwrap_or(0);
        if self.along_z {
            ColumnCoord::new(col, row)
        } else {
            ColumnCoord::new(row, col)
        }
    }

    fn offsets(&self, column: ColumnCoord) -> Option<(usize, usize)> {
        let (row, col) = if self.along_z {
            (column.z, column.x)
        } else {
            (column.x, column.z)
        };
        let row = usize::try_from(row.checked_sub(self.row_origin)?).ok()?;
        let col = usize::try_from(col.checked_sub(self.col_origin)?).ok()?;
        (row < self.rows && col < self.row_len).then_some((row, col))
    }
}
