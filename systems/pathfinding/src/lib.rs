#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic grid pathfinding over the interior footprint of an envelope.
//!
//! The planner runs A* on the 4-connected column grid with a Manhattan
//! heuristic. Ties are broken by heuristic and then by column coordinates, so
//! identical inputs always produce identical waypoint sequences.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
};

use quarry_rig_core::{Bounds, ColumnCoord};

const UNVISITED: u32 = u32::MAX;

/// A* planner that reuses its scratch buffers between searches.
#[derive(Clone, Debug, Default)]
pub struct GridPathfinder {
    g_scores: Vec<u32>,
    parents: Vec<Option<usize>>,
    closed: Vec<bool>,
    open: BinaryHeap<Reverse<(u32, u32, ColumnCoord)>>,
}

impl GridPathfinder {
    /// Creates a planner with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds a path from `start` to `goal` across the interior footprint.
    ///
    /// The returned waypoints exclude `start` and end with `goal`; a start
    /// equal to the goal yields an empty path. Columns for which `is_blocked`
    /// returns `true` are never entered. `None` means the goal cannot be
    /// reached.
    pub fn find_path<F>(
        &mut self,
        bounds: &Bounds,
        start: ColumnCoord,
        goal: ColumnCoord,
        mut is_blocked: F,
    ) -> Option<Vec<ColumnCoord>>
    where
        F: FnMut(ColumnCoord) -> bool,
    {
        let grid = FootprintGrid::of(bounds)?;
        let start_index = grid.index(start)?;
        let goal_index = grid.index(goal)?;
        if start == goal {
            return Some(Vec::new());
        }
        if is_blocked(goal) {
            return None;
        }

        self.prepare(grid.len());
        self.g_scores[start_index] = 0;
        self.open
            .push(Reverse((start.manhattan_distance(goal), 0, start)));

        while let Some(Reverse((_, _, current))) = self.open.pop() {
            let Some(current_index) = grid.index(current) else {
                continue;
            };
            if self.closed[current_index] {
                continue;
            }
            self.closed[current_index] = true;

            if current_index == goal_index {
                return Some(self.reconstruct(&grid, goal_index));
            }

            let next_g = self.g_scores[current_index].saturating_add(1);
            for neighbor in neighbors(current) {
                let Some(neighbor_index) = grid.index(neighbor) else {
                    continue;
                };
                if self.closed[neighbor_index] || next_g >= self.g_scores[neighbor_index] {
                    continue;
                }
                if is_blocked(neighbor) {
                    self.closed[neighbor_index] = true;
                    continue;
                }

                self.g_scores[neighbor_index] = next_g;
                self.parents[neighbor_index] = Some(current_index);
                let heuristic = neighbor.manhattan_distance(goal);
                self.open
                    .push(Reverse((next_g.saturating_add(heuristic), heuristic, neighbor)));
            }
        }

        None
    }

    fn prepare(&mut self, cells: usize) {
        self.g_scores.clear();
        self.g_scores.resize(cells, UNVISITED);
        self.parents.clear();
        self.parents.resize(cells, None);
        self.closed.clear();
        self.closed.resize(cells, false);
        self.open.clear();
    }

    fn reconstruct(&self, grid: &FootprintGrid, goal_index: usize) -> Vec<ColumnCoord> {
        let mut path = Vec::new();
        let mut cursor = Some(goal_index);
        while let Some(index) = cursor {
            let Some(parent) = self.parents[index] else {
                break;
            };
            path.push(grid.column(index));
            cursor = Some(parent);
        }
        path.reverse();
        path
    }
}

/// Searches Manhattan rings of growing radius around `origin` and returns the
/// first interior column accepted by `accept`.
///
/// Radius zero (the origin itself) is tried first. Within a ring, columns are
/// visited in a fixed order so the search is deterministic.
pub fn nearest_on_rings<F>(
    bounds: &Bounds,
    origin: ColumnCoord,
    max_radius: u32,
    mut accept: F,
) -> Option<ColumnCoord>
where
    F: FnMut(ColumnCoord) -> bool,
{
    (0..=max_radius).find_map(|radius| {
        manhattan_ring(origin, radius)
            .filter(|column| bounds.interior_contains(*column))
            .find(|column| accept(*column))
    })
}

/// Columns at exactly `radius` Manhattan distance from `origin`.
pub fn manhattan_ring(origin: ColumnCoord, radius: u32) -> impl Iterator<Item = ColumnCoord> {
    let radius = i32::try_from(radius).unwrap_or(i32::MAX);
    (-radius..=radius).flat_map(move |dx| {
        let remaining = radius - dx.abs();
        let north = ColumnCoord::new(origin.x + dx, origin.z - remaining);
        let south = (remaining != 0).then(|| ColumnCoord::new(origin.x + dx, origin.z + remaining));
        std::iter::once(north).chain(south)
    })
}

fn neighbors(cell: ColumnCoord) -> [ColumnCoord; 4] {
    [
        ColumnCoord::new(cell.x, cell.z - 1),
        ColumnCoord::new(cell.x + 1, cell.z),
        ColumnCoord::new(cell.x, cell.z + 1),
        ColumnCoord::new(cell.x - 1, cell.z),
    ]
}

/// Dense row-major indexing of the interior footprint.
struct FootprintGrid {
    origin: ColumnCoord,
    width: usize,
    depth: usize,
}

impl FootprintGrid {
    fn of(bounds: &Bounds) -> Option<Self> {
        let width = usize::try_from(bounds.interior_width()).ok()?;
        let depth = usize::try_from(bounds.interior_depth()).ok()?;
        if width == 0 || depth == 0 {
            return None;
        }
        Some(Self {
            origin: ColumnCoord::new(*bounds.interior_x().start(), *bounds.interior_z().start()),
            width,
            depth,
        })
    }

    fn len(&self) -> usize {
        self.width * self.depth
    }

    fn index(&self, column: ColumnCoord) -> Option<usize> {
        let x = usize::try_from(column.x.checked_sub(self.origin.x)?).ok()?;
        let z = usize::try_from(column.z.checked_sub(self.origin.z)?).ok()?;
        if x >= self.width || z >= self.depth {
            return None;
        }
        Some(z * self.width + x)
    }

    fn column(&self, index: usize) -> ColumnCoord {
        let x = i32::try_from(index % self.width).unwrap_or(0);
        let z = i32::try_from(index / self.width).unwrap_or(0);
        ColumnCoord::new(self.origin.x + x, self.origin.z + z)
    }
}

#[cfg(test)]
mod tests {
    use quarry_rig_core::BlockPos;

    use super::*;

    fn bounds() -> Bounds {
        // Interior columns x in 1..=6, z in 1..=5.
        Bounds::from_corners(BlockPos::new(0, 0, 0), BlockPos::new(7, 6, 6))
    }

    fn assert_connected(start: ColumnCoord, path: &[ColumnCoord]) {
        let mut previous = start;
        for waypoint in path {
            assert!(previous.is_adjacent(*waypoint), "{previous:?} -> {waypoint:?}");
            previous = *waypoint;
        }
    }

    #[test]
    fn straight_path_has_manhattan_length() {
        let mut planner = GridPathfinder::new();
        let start = ColumnCoord::new(1, 1);
        let goal = ColumnCoord::new(5, 4);

        let path = planner
            .find_path(&bounds(), start, goal, |_| false)
            .expect("path");

        assert_eq!(path.len(), 7);
        assert_eq!(path.last(), Some(&goal));
        assert_connected(start, &path);
    }

    #[test]
    fn start_equal_to_goal_yields_empty_path() {
        let mut planner = GridPathfinder::new();
        let cell = ColumnCoord::new(3, 3);
        assert_eq!(
            planner.find_path(&bounds(), cell, cell, |_| true),
            Some(Vec::new())
        );
    }

    #[test]
    fn detours_around_blocked_wall() {
        let mut planner = GridPathfinder::new();
        let start = ColumnCoord::new(1, 3);
        let goal = ColumnCoord::new(5, 3);
        let wall = |column: ColumnCoord| column.x == 3 && column.z != 5;

        let path = planner.find_path(&bounds(), start, goal, wall).expect("path");

        assert!(path.iter().all(|cell| !wall(*cell)));
        assert!(path.contains(&ColumnCoord::new(3, 5)));
        assert_connected(start, &path);
        assert_eq!(path.len(), 8);
    }

    #[test]
    fn sealed_off_goal_is_unreachable() {
        let mut planner = GridPathfinder::new();
        let wall = |column: ColumnCoord| column.x == 3;
        assert!(planner
            .find_path(&bounds(), ColumnCoord::new(1, 1), ColumnCoord::new(6, 1), wall)
            .is_none());
        assert!(planner
            .find_path(
                &bounds(),
                ColumnCoord::new(1, 1),
                ColumnCoord::new(9, 1),
                |_| false
            )
            .is_none());
    }

    #[test]
    fn repeated_searches_are_identical() {
        let mut planner = GridPathfinder::new();
        let start = ColumnCoord::new(6, 5);
        let goal = ColumnCoord::new(1, 1);
        let blocked = |column: ColumnCoord| column == ColumnCoord::new(4, 3);

        let first = planner.find_path(&bounds(), start, goal, blocked);
        let second = planner.find_path(&bounds(), start, goal, blocked);
        let fresh = GridPathfinder::new().find_path(&bounds(), start, goal, blocked);

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(first, fresh);
    }

    #[test]
    fn ring_search_prefers_closest_column() {
        let origin = ColumnCoord::new(3, 3);
        let found = nearest_on_rings(&bounds(), origin, 10, |column| {
            column == ColumnCoord::new(6, 5) || column == ColumnCoord::new(3, 1)
        });
        assert_eq!(found, Some(ColumnCoord::new(3, 1)));

        assert_eq!(
            nearest_on_rings(&bounds(), origin, 10, |column| column == origin),
            Some(origin)
        );
        assert_eq!(nearest_on_rings(&bounds(), origin, 10, |_| false), None);
    }

    #[test]
    fn manhattan_ring_has_expected_size() {
        let origin = ColumnCoord::new(0, 0);
        assert_eq!(manhattan_ring(origin, 0).count(), 1);
        for radius in 1..5 {
            let ring: Vec<_> = manhattan_ring(origin, radius).collect();
            assert_eq!(ring.len(), usize::try_from(radius * 4).expect("len"));
            assert!(ring
                .iter()
                .all(|cell| cell.manhattan_distance(origin) == radius));
        }
    }
}
