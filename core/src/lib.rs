#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Quarry Rig engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and the rig systems. Adapters submit [`Command`]
//! values, the world executes them via its `apply` entry point, and every
//! observable consequence is broadcast as an [`Event`]. Systems never reach
//! into their collaborators directly: the environment, the power source and
//! the downstream acceptor are reached exclusively through the capability
//! traits declared here.

pub mod envelope;
pub mod tuning;

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

pub use envelope::{boundary_shell, envelope_bounds, Bounds, EnvelopeError, EnvelopeSize};
pub use tuning::{
    MiningTuning, MotionTuning, ObstacleTuning, OutputTuning, RigTuning, SchedulerTuning,
    SpeedTuning,
};

/// Unique identifier assigned to a rig by its host.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RigId(u32);

impl RigId {
    /// Creates a new rig identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rig#{}", self.0)
    }
}

/// Location of a single world cell.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockPos {
    /// East-west coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
    /// North-south coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Creates a new cell position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Horizontal column containing the cell.
    #[must_use]
    pub const fn column(&self) -> ColumnCoord {
        ColumnCoord::new(self.x, self.z)
    }
}

/// Horizontal column of cells addressed by its `x` and `z` coordinates.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ColumnCoord {
    /// East-west coordinate.
    pub x: i32,
    /// North-south coordinate.
    pub z: i32,
}

impl ColumnCoord {
    /// Creates a new column coordinate.
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Cell of this column at the provided height.
    #[must_use]
    pub const fn at(&self, y: i32) -> BlockPos {
        BlockPos::new(self.x, y, self.z)
    }

    /// Computes the Manhattan distance between two columns.
    #[must_use]
    pub fn manhattan_distance(self, other: ColumnCoord) -> u32 {
        self.x.abs_diff(other.x) + self.z.abs_diff(other.z)
    }

    /// Reports whether `other` shares an edge with this column.
    #[must_use]
    pub fn is_adjacent(self, other: ColumnCoord) -> bool {
        self.manhattan_distance(other) == 1
    }
}

/// Horizontal direction a rig faces when placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    /// Facing toward decreasing `z`.
    North,
    /// Facing toward increasing `z`.
    South,
    /// Facing toward increasing `x`.
    East,
    /// Facing toward decreasing `x`.
    West,
}

impl Facing {
    /// Unit step `(dx, dz)` pointing in the facing direction.
    #[must_use]
    pub const fn forward(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::South => (0, 1),
            Self::East => (1, 0),
            Self::West => (-1, 0),
        }
    }

    /// Reports whether the facing lies along the `z` axis.
    #[must_use]
    pub const fn is_along_z(self) -> bool {
        matches!(self, Self::North | Self::South)
    }
}

/// Classification of a single environment cell as seen by the rig.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    /// Nothing occupies the cell.
    Empty,
    /// Solid material: an obstacle for travel and a work cell for removal.
    Solid,
    /// Part of the rig's own boundary structure.
    Boundary,
    /// Source of flowing material that is neither crossed nor removed.
    Source,
}

/// Identifier of a harvested material kind.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MaterialId(u32);

impl MaterialId {
    /// Creates a new material identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Harvested material produced by a single removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialRecord {
    /// Kind of material.
    pub material: MaterialId,
    /// Number of units harvested.
    pub quantity: u32,
}

impl MaterialRecord {
    /// Creates a new material record.
    #[must_use]
    pub const fn new(material: MaterialId, quantity: u32) -> Self {
        Self { material, quantity }
    }
}

/// Outcome of offering a record to a downstream acceptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Acceptance {
    /// The acceptor took ownership of the record.
    Accepted,
    /// The acceptor had no room; the caller keeps the record.
    Rejected,
}

/// Read access to the simulated environment plus the destructive removal call.
///
/// Queries are expected to be side-effect free. `remove_cell` is invoked
/// exactly once per completed excavation and is authoritative.
pub trait Environment {
    /// Classifies the provided cell.
    fn cell_state(&self, pos: BlockPos) -> CellState;

    /// Reports whether the cell has no collision geometry.
    fn collision_geometry_empty(&self, pos: BlockPos) -> bool;

    /// Removes the cell and returns the materials it yielded.
    fn remove_cell(&mut self, pos: BlockPos) -> Vec<MaterialRecord>;

    /// Drops a record into the environment next to the provided cell.
    fn eject(&mut self, pos: BlockPos, record: MaterialRecord);
}

/// Energy store feeding a rig.
pub trait PowerSource {
    /// Energy currently stored.
    fn current_stored(&self) -> f64;

    /// Drains up to `amount` and returns how much was actually drained.
    fn drain(&mut self, amount: f64) -> f64;
}

/// Consumer of harvested materials.
pub trait DownstreamAcceptor {
    /// Offers a record. Rejection is backpressure, never an error.
    fn try_accept(&mut self, record: &MaterialRecord) -> Acceptance;
}

/// Discrete movement states of a rig's tool head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementState {
    /// Deciding the next hop toward the target.
    Scanning,
    /// Raising the tool head to clear an obstacle.
    Retracting,
    /// Re-validating clearance after a lift.
    ClearanceCheck,
    /// Travelling horizontally toward a waypoint.
    Traversing,
    /// Fine positioning onto the target cell centre.
    Centering,
    /// Lowering the tool head onto the work cell.
    Deploying,
    /// Holding position while the work cell is excavated.
    Mining,
    /// Waiting for a target.
    Idle,
}

/// Reasons a completed removal could not be executed in the current step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeferralReason {
    /// The rig's phase slot does not match the current step.
    PhaseGate,
    /// The world-wide removal budget is exhausted for this step.
    NoTokens,
    /// The rig's output queue has no room.
    OutputFull,
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Registers a rig; it activates once its host reports the boundary complete.
    PlaceRig {
        /// Identifier of the rig.
        rig: RigId,
        /// Cell the rig is anchored at.
        anchor: BlockPos,
        /// Direction the rig faces; the envelope lies behind it.
        facing: Facing,
        /// Dimensions of the work envelope.
        size: EnvelopeSize,
        /// Lowest layer the rig is allowed to excavate.
        lowest_layer_y: i32,
    },
    /// Tears down a rig and all of its state.
    RemoveRig {
        /// Identifier of the rig.
        rig: RigId,
    },
    /// Advances every active rig by one simulation step.
    Step {
        /// Duration the host measured for the previous simulation step.
        measured: Duration,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// The simulation advanced to a new step.
    TimeAdvanced {
        /// Index of the step that was executed.
        step: u64,
    },
    /// A rig was registered and awaits its boundary structure.
    RigPlaced {
        /// Identifier of the rig.
        rig: RigId,
        /// Work envelope derived from anchor and facing.
        bounds: Bounds,
    },
    /// A rig placement request was rejected.
    RigPlacementRejected {
        /// Identifier of the rig.
        rig: RigId,
        /// Specific reason the placement failed.
        reason: EnvelopeError,
    },
    /// A rig's boundary structure completed and its state was created.
    RigActivated {
        /// Identifier of the rig.
        rig: RigId,
    },
    /// A rig was removed from the world.
    RigRemoved {
        /// Identifier of the rig.
        rig: RigId,
    },
    /// The tool head changed movement state.
    MovementChanged {
        /// Identifier of the rig.
        rig: RigId,
        /// State left.
        from: MovementState,
        /// State entered.
        to: MovementState,
    },
    /// A state exceeded its step budget and was forced back to scanning.
    StateTimedOut {
        /// Identifier of the rig.
        rig: RigId,
        /// State that timed out.
        state: MovementState,
    },
    /// The rig accepted a new target column.
    TargetAssigned {
        /// Identifier of the rig.
        rig: RigId,
        /// Column the rig travels to.
        target: ColumnCoord,
    },
    /// No path exists to the target column; it was skipped temporarily.
    TargetUnreachable {
        /// Identifier of the rig.
        rig: RigId,
        /// Column that could not be reached.
        target: ColumnCoord,
    },
    /// Recovery selected an alternative reachable target.
    TargetRecovered {
        /// Identifier of the rig.
        rig: RigId,
        /// Column that replaced the unreachable target.
        target: ColumnCoord,
    },
    /// The rig has nothing reachable to do and waits.
    RigIdled {
        /// Identifier of the rig.
        rig: RigId,
    },
    /// A work cell was excavated.
    CellRemoved {
        /// Identifier of the rig.
        rig: RigId,
        /// Cell that was removed.
        cell: BlockPos,
        /// Materials the removal yielded.
        records: Vec<MaterialRecord>,
    },
    /// A finished removal was postponed to a later step.
    RemovalDeferred {
        /// Identifier of the rig.
        rig: RigId,
        /// Why the removal did not happen.
        reason: DeferralReason,
    },
    /// The end-of-layer completeness sweep started.
    FinalSweepStarted {
        /// Identifier of the rig.
        rig: RigId,
        /// Layer being swept.
        layer_y: i32,
        /// Number of cells queued for the sweep.
        count: u32,
    },
    /// A layer was fully processed and the rig descended.
    LayerCompleted {
        /// Identifier of the rig.
        rig: RigId,
        /// Layer that was completed.
        layer_y: i32,
    },
    /// The rig excavated every layer down to its lowest allowed layer.
    Finished {
        /// Identifier of the rig.
        rig: RigId,
    },
    /// The rig's power source could not satisfy the per-step drain.
    PowerLost {
        /// Identifier of the rig.
        rig: RigId,
    },
    /// Power returned after an outage.
    PowerRestored {
        /// Identifier of the rig.
        rig: RigId,
    },
    /// Queued materials left the rig.
    MaterialsFlushed {
        /// Identifier of the rig.
        rig: RigId,
        /// Records handed to the downstream acceptor.
        moved: u32,
        /// Records ejected into the environment.
        ejected: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::{BlockPos, ColumnCoord, Facing, MaterialId, MaterialRecord, MovementState, RigId};
    use serde::{de::DeserializeOwned, Serialize};

    #[test]
    fn manhattan_distance_matches_expectation() {
        let origin = ColumnCoord::new(1, 1);
        let destination = ColumnCoord::new(4, -3);
        assert_eq!(origin.manhattan_distance(destination), 7);
        assert_eq!(destination.manhattan_distance(origin), 7);
        assert!(origin.is_adjacent(ColumnCoord::new(1, 2)));
        assert!(!origin.is_adjacent(ColumnCoord::new(2, 2)));
    }

    #[test]
    fn column_at_places_cell_in_column() {
        let column = ColumnCoord::new(3, 9);
        assert_eq!(column.at(-4), BlockPos::new(3, -4, 9));
        assert_eq!(column.at(-4).column(), column);
    }

    #[test]
    fn facing_forward_is_unit_step() {
        for facing in [Facing::North, Facing::South, Facing::East, Facing::West] {
            let (dx, dz) = facing.forward();
            assert_eq!(dx.abs() + dz.abs(), 1);
            assert_eq!(facing.is_along_z(), dz != 0);
        }
    }

    fn assert_round_trip<T>(value: &T)
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    #[test]
    fn persisted_identifiers_round_trip_through_bincode() {
        assert_round_trip(&RigId::new(7));
        assert_round_trip(&Facing::West);
        assert_round_trip(&MovementState::ClearanceCheck);
        assert_round_trip(&MaterialRecord::new(MaterialId::new(3), 2));
    }

    #[test]
    fn rig_id_display_is_prefixed() {
        assert_eq!(RigId::new(12).to_string(), "rig#12");
    }
}
