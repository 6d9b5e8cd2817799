#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Obstacle scanner that answers clearance questions about envelope columns.
//!
//! All queries are pure: they read the environment through the
//! [`Environment`] capability and never mutate it. A cell counts as an
//! obstacle when it lies inside the interior footprint, holds solid material
//! (not empty, not boundary structure, not a material source) and has
//! collision geometry.

use quarry_rig_core::{BlockPos, Bounds, CellState, ColumnCoord, Environment, ObstacleTuning};

/// Reports whether the provided cell blocks the tool head.
pub fn is_obstacle<E>(env: &E, bounds: &Bounds, pos: BlockPos) -> bool
where
    E: Environment + ?Sized,
{
    bounds.interior_contains(pos.column())
        && env.cell_state(pos) == CellState::Solid
        && !env.collision_geometry_empty(pos)
}

/// Finds the highest obstacle in a column between `min_y` and the bottom of
/// the ceiling guard band.
pub fn find_highest_obstacle<E>(
    env: &E,
    bounds: &Bounds,
    column: ColumnCoord,
    min_y: i32,
    guard: u32,
) -> Option<i32>
where
    E: Environment + ?Sized,
{
    let top = guard_band_bottom(bounds, guard).saturating_sub(1);
    (min_y..=top)
        .rev()
        .find(|&y| is_obstacle(env, bounds, column.at(y)))
}

/// Reports whether any cell of the ceiling guard band in the column is an
/// obstacle. Sealed columns can never be crossed or worked in the current
/// configuration.
pub fn is_column_sealed_at_ceiling<E>(
    env: &E,
    bounds: &Bounds,
    column: ColumnCoord,
    guard: u32,
) -> bool
where
    E: Environment + ?Sized,
{
    (guard_band_bottom(bounds, guard)..bounds.ceiling())
        .any(|y| is_obstacle(env, bounds, column.at(y)))
}

/// Computes the lift needed to travel in a straight line between two columns.
///
/// Every column on the Bresenham line between `from` and `to` (both
/// included) is scanned from `base` upward. The result is the height of the
/// highest obstacle above `base` plus the clearance margin, clamped to the
/// largest lift the envelope allows. A line without obstacles needs no lift.
pub fn required_lift<E>(
    env: &E,
    bounds: &Bounds,
    from: ColumnCoord,
    to: ColumnCoord,
    base: i32,
    tuning: &ObstacleTuning,
) -> u32
where
    E: Environment + ?Sized,
{
    let highest = ColumnLine::new(from, to)
        .filter_map(|column| {
            find_highest_obstacle(env, bounds, column, base, tuning.guard_height)
        })
        .max();

    let Some(highest) = highest else {
        return 0;
    };

    let above_base = u32::try_from(highest.saturating_sub(base)).unwrap_or(0);
    above_base
        .saturating_add(tuning.clearance_margin)
        .min(bounds.max_lift(tuning.guard_height))
}

/// Highest cell in the column between `min_y` and `max_y` (inclusive) that
/// is non-empty, not a material source and has collision geometry.
pub fn column_top<E>(env: &E, column: ColumnCoord, min_y: i32, max_y: i32) -> Option<i32>
where
    E: Environment + ?Sized,
{
    (min_y..=max_y).rev().find(|&y| {
        let pos = column.at(y);
        !matches!(env.cell_state(pos), CellState::Empty | CellState::Source)
            && !env.collision_geometry_empty(pos)
    })
}

fn guard_band_bottom(bounds: &Bounds, guard: u32) -> i32 {
    let guard = i32::try_from(guard).unwrap_or(i32::MAX);
    bounds.ceiling().saturating_sub(guard)
}

/// Bresenham line over horizontal columns, endpoints included.
#[derive(Clone, Debug)]
pub struct ColumnLine {
    x: i32,
    z: i32,
    end_x: i32,
    end_z: i32,
    dx: i32,
    dz: i32,
    step_x: i32,
    step_z: i32,
    error: i32,
    done: bool,
}

impl ColumnLine {
    /// Creates a new line iterator from `start` to `end`.
    #[must_use]
    pub fn new(start: ColumnCoord, end: ColumnCoord) -> Self {
        let dx = (end.x - start.x).abs();
        let dz = -(end.z - start.z).abs();
        Self {
            x: start.x,
            z: start.z,
            end_x: end.x,
            end_z: end.z,
            dx,
            dz,
            step_x: if end.x >= start.x { 1 } else { -1 },
            step_z: if end.z >= start.z { 1 } else { -1 },
            error: dx + dz,
            done: false,
        }
    }
}

impl Iterator for ColumnLine {
    type Item = ColumnCoord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let current = ColumnCoord::new(self.x, self.z);
        if self.x == self.end_x && self.z == self.end_z {
            self.done = true;
            return Some(current);
        }

        let doubled = self.error * 2;
        if doubled >= self.dz {
            self.error += self.dz;
            self.x += self.step_x;
        }
        if doubled <= self.dx {
            self.error += self.dx;
            self.z += self.step_z;
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use quarry_rig_core::MaterialRecord;

    use super::*;

    #[derive(Default)]
    struct SparseEnvironment {
        cells: HashMap<BlockPos, CellState>,
        ghosts: Vec<BlockPos>,
    }

    impl SparseEnvironment {
        fn set(&mut self, pos: BlockPos, state: CellState) {
            let _ = self.cells.insert(pos, state);
        }
    }

    impl Environment for SparseEnvironment {
        fn cell_state(&self, pos: BlockPos) -> CellState {
            self.cells.get(&pos).copied().unwrap_or(CellState::Empty)
        }

        fn collision_geometry_empty(&self, pos: BlockPos) -> bool {
            self.cell_state(pos) == CellState::Empty || self.ghosts.contains(&pos)
        }

        fn remove_cell(&mut self, pos: BlockPos) -> Vec<MaterialRecord> {
            let _ = self.cells.remove(&pos);
            Vec::new()
        }

        fn eject(&mut self, _pos: BlockPos, _record: MaterialRecord) {}
    }

    fn bounds() -> Bounds {
        // Floor 0, ceiling 9, interior x/z in 1..=8.
        Bounds::from_corners(BlockPos::new(0, 0, 0), BlockPos::new(9, 9, 9))
    }

    #[test]
    fn clear_line_needs_no_lift() {
        let env = SparseEnvironment::default();
        let lift = required_lift(
            &env,
            &bounds(),
            ColumnCoord::new(1, 1),
            ColumnCoord::new(8, 5),
            0,
            &ObstacleTuning::default(),
        );
        assert_eq!(lift, 0);
    }

    #[test]
    fn lift_is_obstacle_height_plus_margin() {
        let tuning = ObstacleTuning::default();
        for height in 0..=4 {
            let mut env = SparseEnvironment::default();
            env.set(BlockPos::new(4, height, 1), CellState::Solid);
            let lift = required_lift(
                &env,
                &bounds(),
                ColumnCoord::new(1, 1),
                ColumnCoord::new(8, 1),
                0,
                &tuning,
            );
            let expected = (u32::try_from(height).expect("height") + 3).min(7);
            assert_eq!(lift, expected, "obstacle at height {height}");
        }
    }

    #[test]
    fn lift_is_clamped_below_guard_band() {
        let mut env = SparseEnvironment::default();
        env.set(BlockPos::new(3, 6, 2), CellState::Solid);
        let lift = required_lift(
            &env,
            &bounds(),
            ColumnCoord::new(3, 2),
            ColumnCoord::new(4, 2),
            0,
            &ObstacleTuning::default(),
        );
        assert_eq!(lift, bounds().max_lift(2));
    }

    #[test]
    fn non_obstacles_are_ignored() {
        let mut env = SparseEnvironment::default();
        env.set(BlockPos::new(2, 1, 2), CellState::Boundary);
        env.set(BlockPos::new(2, 2, 2), CellState::Source);
        env.set(BlockPos::new(2, 3, 2), CellState::Solid);
        env.ghosts.push(BlockPos::new(2, 3, 2));
        env.set(BlockPos::new(0, 4, 2), CellState::Solid);

        assert_eq!(
            find_highest_obstacle(&env, &bounds(), ColumnCoord::new(2, 2), 0, 2),
            None
        );
        assert_eq!(
            find_highest_obstacle(&env, &bounds(), ColumnCoord::new(0, 2), 0, 2),
            None
        );
    }

    #[test]
    fn scan_stops_below_guard_band() {
        let mut env = SparseEnvironment::default();
        env.set(BlockPos::new(5, 7, 5), CellState::Solid);
        env.set(BlockPos::new(5, 3, 5), CellState::Solid);

        let column = ColumnCoord::new(5, 5);
        assert_eq!(find_highest_obstacle(&env, &bounds(), column, 0, 2), Some(3));
        assert!(is_column_sealed_at_ceiling(&env, &bounds(), column, 2));
        assert!(!is_column_sealed_at_ceiling(
            &env,
            &bounds(),
            ColumnCoord::new(5, 6),
            2
        ));
    }

    #[test]
    fn column_top_counts_boundary_but_not_sources() {
        let mut env = SparseEnvironment::default();
        let column = ColumnCoord::new(1, 1);
        env.set(column.at(2), CellState::Boundary);
        env.set(column.at(5), CellState::Source);

        assert_eq!(column_top(&env, column, 0, 9), Some(2));
        assert_eq!(column_top(&env, column, 3, 9), None);
    }

    #[test]
    fn column_line_visits_endpoints_once() {
        let cells: Vec<_> =
            ColumnLine::new(ColumnCoord::new(0, 0), ColumnCoord::new(4, 2)).collect();
        assert_eq!(cells.first(), Some(&ColumnCoord::new(0, 0)));
        assert_eq!(cells.last(), Some(&ColumnCoord::new(4, 2)));
        assert_eq!(cells.len(), 5);

        let single: Vec<_> =
            ColumnLine::new(ColumnCoord::new(3, 3), ColumnCoord::new(3, 3)).collect();
        assert_eq!(single, vec![ColumnCoord::new(3, 3)]);

        let backwards: Vec<_> =
            ColumnLine::new(ColumnCoord::new(2, 5), ColumnCoord::new(2, 1)).collect();
        assert_eq!(backwards.len(), 5);
        assert!(backwards.iter().all(|cell| cell.x == 2));
    }
}
