//! Work envelope geometry: bounds derived from an anchor and a facing.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::{BlockPos, ColumnCoord, Facing};

/// Smallest horizontal extent that still leaves an interior column.
const MIN_HORIZONTAL_EXTENT: u32 = 3;

/// Requested dimensions of a work envelope measured in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvelopeSize {
    width: u32,
    length: u32,
    height: u32,
}

impl EnvelopeSize {
    /// Creates a new size descriptor.
    ///
    /// `width` spans the axis perpendicular to the facing, `length` extends
    /// away from the anchor opposite to the facing, and `height` rises from
    /// the anchor's floor.
    #[must_use]
    pub const fn new(width: u32, length: u32, height: u32) -> Self {
        Self {
            width,
            length,
            height,
        }
    }

    /// Extent perpendicular to the facing.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Extent along the facing axis.
    #[must_use]
    pub const fn length(&self) -> u32 {
        self.length
    }

    /// Vertical extent including floor and ceiling.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }
}

/// Reasons an envelope cannot be derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum EnvelopeError {
    /// The envelope would not contain a single interior column.
    #[error("envelope footprint {width}x{length} leaves no interior column")]
    FootprintTooSmall {
        /// Requested width.
        width: u32,
        /// Requested length.
        length: u32,
    },
    /// The envelope is too low to fit the ceiling guard band above the floor.
    #[error("envelope height {height} cannot fit a guard band of {guard} cells")]
    TooShallow {
        /// Requested height.
        height: u32,
        /// Configured ceiling guard band.
        guard: u32,
    },
    /// The envelope does not fit into the coordinate space.
    #[error("envelope exceeds the addressable coordinate range")]
    OutOfRange,
}

/// Axis-aligned bounds of a work envelope, inclusive on every axis.
///
/// `y0` is the floor (the tool head's working plane) and `y1` the ceiling.
/// The interior footprint excludes the outermost ring of columns, which the
/// boundary structure occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    x0: i32,
    y0: i32,
    z0: i32,
    x1: i32,
    y1: i32,
    z1: i32,
}

impl Bounds {
    /// Creates bounds spanning the two corners in any order.
    #[must_use]
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            x0: a.x.min(b.x),
            y0: a.y.min(b.y),
            z0: a.z.min(b.z),
            x1: a.x.max(b.x),
            y1: a.y.max(b.y),
            z1: a.z.max(b.z),
        }
    }

    /// Lowest corner of the bounds.
    #[must_use]
    pub const fn min(&self) -> BlockPos {
        BlockPos::new(self.x0, self.y0, self.z0)
    }

    /// Highest corner of the bounds.
    #[must_use]
    pub const fn max(&self) -> BlockPos {
        BlockPos::new(self.x1, self.y1, self.z1)
    }

    /// Working plane of the tool head.
    #[must_use]
    pub const fn floor(&self) -> i32 {
        self.y0
    }

    /// Top boundary of the envelope.
    #[must_use]
    pub const fn ceiling(&self) -> i32 {
        self.y1
    }

    /// Interior `x` coordinates.
    #[must_use]
    pub fn interior_x(&self) -> RangeInclusive<i32> {
        (self.x0 + 1)..=(self.x1 - 1)
    }

    /// Interior `z` coordinates.
    #[must_use]
    pub fn interior_z(&self) -> RangeInclusive<i32> {
        (self.z0 + 1)..=(self.z1 - 1)
    }

    /// Number of interior columns along `x`.
    #[must_use]
    pub fn interior_width(&self) -> u32 {
        u32::try_from(self.x1 - self.x0 - 1).unwrap_or(0)
    }

    /// Number of interior columns along `z`.
    #[must_use]
    pub fn interior_depth(&self) -> u32 {
        u32::try_from(self.z1 - self.z0 - 1).unwrap_or(0)
    }

    /// Reports whether the column lies strictly inside the horizontal bounds.
    #[must_use]
    pub fn interior_contains(&self, column: ColumnCoord) -> bool {
        column.x > self.x0 && column.x < self.x1 && column.z > self.z0 && column.z < self.z1
    }

    /// Reports whether the cell lies within the bounds, boundary included.
    #[must_use]
    pub fn contains(&self, pos: BlockPos) -> bool {
        (self.x0..=self.x1).contains(&pos.x)
            && (self.y0..=self.y1).contains(&pos.y)
            && (self.z0..=self.z1).contains(&pos.z)
    }

    /// Interior columns ordered by `x`, then `z`.
    pub fn interior_columns(&self) -> impl Iterator<Item = ColumnCoord> {
        let zs = self.interior_z();
        self.interior_x()
            .flat_map(move |x| zs.clone().map(move |z| ColumnCoord::new(x, z)))
    }

    /// Largest lift the tool head may take without entering the guard band.
    #[must_use]
    pub fn max_lift(&self, guard: u32) -> u32 {
        let span = i64::from(self.y1) - i64::from(self.y0) - i64::from(guard);
        u32::try_from(span.max(0)).unwrap_or(0)
    }
}

/// Derives the envelope bounds for a rig anchored at `anchor`.
///
/// The envelope lies behind the rig (opposite to `facing`), starts one cell
/// away from the anchor and is centred laterally on it. The floor is the
/// anchor's height. The `guard` band must leave at least one cell of lift.
pub fn envelope_bounds(
    anchor: BlockPos,
    facing: Facing,
    size: EnvelopeSize,
    guard: u32,
) -> Result<Bounds, EnvelopeError> {
    if size.width < MIN_HORIZONTAL_EXTENT || size.length < MIN_HORIZONTAL_EXTENT {
        return Err(EnvelopeError::FootprintTooSmall {
            width: size.width,
            length: size.length,
        });
    }
    if size.height < guard.saturating_add(2) {
        return Err(EnvelopeError::TooShallow {
            height: size.height,
            guard,
        });
    }

    let width = i32::try_from(size.width).map_err(|_| EnvelopeError::OutOfRange)?;
    let length = i32::try_from(size.length).map_err(|_| EnvelopeError::OutOfRange)?;
    let height = i32::try_from(size.height).map_err(|_| EnvelopeError::OutOfRange)?;

    let lateral = |centre: i32| -> Option<(i32, i32)> {
        let low = centre.checked_sub((width - 1) / 2)?;
        Some((low, low.checked_add(width - 1)?))
    };
    let behind = |origin: i32, step: i32| -> Option<(i32, i32)> {
        let near = origin.checked_sub(step)?;
        let far = origin.checked_sub(step.checked_mul(length)?)?;
        Some((near.min(far), near.max(far)))
    };

    let (dx, dz) = facing.forward();
    let (x_range, z_range) = if facing.is_along_z() {
        (lateral(anchor.x), behind(anchor.z, dz))
    } else {
        (behind(anchor.x, dx), lateral(anchor.z))
    };
    let ((x0, x1), (z0, z1)) = x_range.zip(z_range).ok_or(EnvelopeError::OutOfRange)?;

    let y1 = anchor
        .y
        .checked_add(height - 1)
        .ok_or(EnvelopeError::OutOfRange)?;

    Ok(Bounds {
        x0,
        y0: anchor.y,
        z0,
        x1,
        y1,
        z1,
    })
}

/// Enumerates the cells of the envelope's frame: the twelve edges of the box.
///
/// Cells are listed once each, ordered by `y`, then `z`, then `x`.
#[must_use]
pub fn boundary_shell(bounds: &Bounds) -> Vec<BlockPos> {
    let mut cells = Vec::new();
    for y in bounds.y0..=bounds.y1 {
        for z in bounds.z0..=bounds.z1 {
            for x in bounds.x0..=bounds.x1 {
                let extremes = u8::from(x == bounds.x0 || x == bounds.x1)
                    + u8::from(y == bounds.y0 || y == bounds.y1)
                    + u8::from(z == bounds.z0 || z == bounds.z1);
                if extremes >= 2 {
                    cells.push(BlockPos::new(x, y, z));
                }
            }
        }
    }
    cells
}
