//! Dense in-memory host used by the command-line adapter and the scenario
//! tests.

use std::collections::BTreeMap;

use quarry_rig_core::{
    boundary_shell, Acceptance, BlockPos, Bounds, CellState, DownstreamAcceptor, Environment,
    MaterialId, MaterialRecord, PowerSource, RigId,
};

use crate::{Host, RigPorts};

/// Contents of a single grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Voxel {
    /// Classification reported to rigs.
    pub state: CellState,
    /// Material yielded when the cell is removed.
    pub material: MaterialId,
}

impl Voxel {
    /// Unoccupied cell.
    pub const EMPTY: Self = Self {
        state: CellState::Empty,
        material: MaterialId::new(0),
    };

    /// Boundary structure cell.
    pub const BOUNDARY: Self = Self {
        state: CellState::Boundary,
        material: MaterialId::new(0),
    };

    /// Solid cell made of `material`.
    #[must_use]
    pub const fn solid(material: MaterialId) -> Self {
        Self {
            state: CellState::Solid,
            material,
        }
    }
}

/// Axis-aligned block of voxels. Cells outside the block read as empty.
#[derive(Clone, Debug)]
pub struct VoxelGrid {
    origin: BlockPos,
    size: [usize; 3],
    cells: Vec<Voxel>,
    ejected: Vec<(BlockPos, MaterialRecord)>,
}

impl VoxelGrid {
    /// Creates an empty grid spanning both corners inclusively.
    #[must_use]
    pub fn new(a: BlockPos, b: BlockPos) -> Self {
        let bounds = Bounds::from_corners(a, b);
        let (min, max) = (bounds.min(), bounds.max());
        let extent =
            |low: i32, high: i32| usize::try_from(i64::from(high) - i64::from(low) + 1).unwrap_or(0);
        let size = [
            extent(min.x, max.x),
            extent(min.y, max.y),
            extent(min.z, max.z),
        ];
        Self {
            origin: min,
            size,
            cells: vec![Voxel::EMPTY; size[0] * size[1] * size[2]],
            ejected: Vec::new(),
        }
    }

    /// Voxel stored at `pos`.
    #[must_use]
    pub fn get(&self, pos: BlockPos) -> Voxel {
        self.index(pos)
            .and_then(|index| self.cells.get(index).copied())
            .unwrap_or(Voxel::EMPTY)
    }

    /// Overwrites the voxel at `pos`. Returns `false` outside the grid.
    pub fn set(&mut self, pos: BlockPos, voxel: Voxel) -> bool {
        match self.index(pos).and_then(|index| self.cells.get_mut(index)) {
            Some(cell) => {
                *cell = voxel;
                true
            }
            None => false,
        }
    }

    /// Overwrites every voxel in the box spanned by both corners.
    pub fn fill_box(&mut self, a: BlockPos, b: BlockPos, voxel: Voxel) {
        let bounds = Bounds::from_corners(a, b);
        let (min, max) = (bounds.min(), bounds.max());
        for y in min.y..=max.y {
            for z in min.z..=max.z {
                for x in min.x..=max.x {
                    let _ = self.set(BlockPos::new(x, y, z), voxel);
                }
            }
        }
    }

    /// Records ejected into the grid so far, in ejection order.
    #[must_use]
    pub fn ejected(&self) -> &[(BlockPos, MaterialRecord)] {
        &self.ejected
    }

    /// Number of solid cells in the box spanned by both corners.
    #[must_use]
    pub fn count_solid(&self, a: BlockPos, b: BlockPos) -> usize {
        let bounds = Bounds::from_corners(a, b);
        let (min, max) = (bounds.min(), bounds.max());
        (min.y..=max.y)
            .flat_map(|y| (min.z..=max.z).map(move |z| (y, z)))
            .flat_map(|(y, z)| (min.x..=max.x).map(move |x| BlockPos::new(x, y, z)))
            .filter(|pos| self.get(*pos).state == CellState::Solid)
            .count()
    }

    fn index(&self, pos: BlockPos) -> Option<usize> {
        let offset = |value: i32, origin: i32, size: usize| -> Option<usize> {
            let offset = usize::try_from(i64::from(value) - i64::from(origin)).ok()?;
            (offset < size).then_some(offset)
        };
        let x = offset(pos.x, self.origin.x, self.size[0])?;
        let y = offset(pos.y, self.origin.y, self.size[1])?;
        let z = offset(pos.z, self.origin.z, self.size[2])?;
        Some((y * self.size[2] + z) * self.size[0] + x)
    }
}

impl Environment for VoxelGrid {
    fn cell_state(&self, pos: BlockPos) -> CellState {
        self.get(pos).state
    }

    fn collision_geometry_empty(&self, pos: BlockPos) -> bool {
        self.get(pos).state == CellState::Empty
    }

    fn remove_cell(&mut self, pos: BlockPos) -> Vec<MaterialRecord> {
        let voxel = self.get(pos);
        if voxel.state != CellState::Solid {
            return Vec::new();
        }
        let _ = self.set(pos, Voxel::EMPTY);
        vec![MaterialRecord::new(voxel.material, 1)]
    }

    fn eject(&mut self, pos: BlockPos, record: MaterialRecord) {
        self.ejected.push((pos, record));
    }
}

/// Energy store that refills by a fixed amount every step.
#[derive(Clone, Debug, PartialEq)]
pub struct Battery {
    capacity: f64,
    stored: f64,
    recharge: f64,
}

impl Battery {
    /// Creates an empty battery.
    #[must_use]
    pub const fn new(capacity: f64, recharge: f64) -> Self {
        Self {
            capacity,
            stored: 0.0,
            recharge,
        }
    }

    /// Energy added every step.
    #[must_use]
    pub const fn recharge_rate(&self) -> f64 {
        self.recharge
    }

    /// Changes the energy added every step.
    pub fn set_recharge(&mut self, recharge: f64) {
        self.recharge = recharge;
    }

    /// Adds one step worth of energy, capped at the capacity.
    pub fn recharge(&mut self) {
        self.stored = (self.stored + self.recharge).min(self.capacity);
    }
}

impl PowerSource for Battery {
    fn current_stored(&self) -> f64 {
        self.stored
    }

    fn drain(&mut self, amount: f64) -> f64 {
        let drained = amount.min(self.stored).max(0.0);
        self.stored -= drained;
        drained
    }
}

/// Bounded container accepting every record while it has room.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hopper {
    capacity: usize,
    items: Vec<MaterialRecord>,
}

impl Hopper {
    /// Creates an empty hopper holding at most `capacity` records.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::new(),
        }
    }

    /// Records accepted so far.
    #[must_use]
    pub fn items(&self) -> &[MaterialRecord] {
        &self.items
    }

    /// Changes the number of records the hopper holds.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }
}

impl DownstreamAcceptor for Hopper {
    fn try_accept(&mut self, record: &MaterialRecord) -> Acceptance {
        if self.items.len() >= self.capacity {
            return Acceptance::Rejected;
        }
        self.items.push(*record);
        Acceptance::Accepted
    }
}

/// Host backed by a [`VoxelGrid`] with a battery and an optional hopper per
/// rig.
#[derive(Clone, Debug)]
pub struct SimHost {
    grid: VoxelGrid,
    batteries: BTreeMap<RigId, Battery>,
    hoppers: BTreeMap<RigId, Hopper>,
}

impl SimHost {
    /// Creates a host without any rig collaborators.
    #[must_use]
    pub fn new(grid: VoxelGrid) -> Self {
        Self {
            grid,
            batteries: BTreeMap::new(),
            hoppers: BTreeMap::new(),
        }
    }

    /// Registers the collaborators of `rig`.
    pub fn add_rig(&mut self, rig: RigId, battery: Battery, hopper: Option<Hopper>) {
        let _ = self.batteries.insert(rig, battery);
        match hopper {
            Some(hopper) => {
                let _ = self.hoppers.insert(rig, hopper);
            }
            None => {
                let _ = self.hoppers.remove(&rig);
            }
        }
    }

    /// Builds the boundary frame enclosing `bounds`.
    pub fn build_frame(&mut self, bounds: &Bounds) {
        for pos in boundary_shell(bounds) {
            let _ = self.grid.set(pos, Voxel::BOUNDARY);
        }
    }

    /// Shared access to the grid.
    #[must_use]
    pub const fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Mutable access to the grid.
    pub fn grid_mut(&mut self) -> &mut VoxelGrid {
        &mut self.grid
    }

    /// Battery of `rig`.
    #[must_use]
    pub fn battery(&self, rig: RigId) -> Option<&Battery> {
        self.batteries.get(&rig)
    }

    /// Mutable battery of `rig`.
    pub fn battery_mut(&mut self, rig: RigId) -> Option<&mut Battery> {
        self.batteries.get_mut(&rig)
    }

    /// Hopper of `rig`.
    #[must_use]
    pub fn hopper(&self, rig: RigId) -> Option<&Hopper> {
        self.hoppers.get(&rig)
    }

    /// Mutable hopper of `rig`.
    pub fn hopper_mut(&mut self, rig: RigId) -> Option<&mut Hopper> {
        self.hoppers.get_mut(&rig)
    }
}

impl Host for SimHost {
    fn ports(&mut self, rig: RigId) -> Option<RigPorts<'_>> {
        let power = self.batteries.get_mut(&rig)?;
        let acceptor = self
            .hoppers
            .get_mut(&rig)
            .map(|hopper| hopper as &mut dyn DownstreamAcceptor);
        Some(RigPorts {
            env: &mut self.grid,
            power,
            acceptor,
        })
    }

    fn structure_complete(&self, _rig: RigId, bounds: &Bounds) -> bool {
        boundary_shell(bounds)
            .into_iter()
            .all(|pos| self.grid.cell_state(pos) == CellState::Boundary)
    }

    fn begin_step(&mut self, _step: u64) {
        for battery in self.batteries.values_mut() {
            battery.recharge();
        }
    }
}
