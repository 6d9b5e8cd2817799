#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state management for Quarry Rig.
//!
//! The world owns every rig's state plus the shared tick-budget scheduler.
//! Adapters mutate it exclusively through [`apply`] and read it through the
//! [`query`] module. The environment, power and output collaborators of each
//! rig are borrowed from the [`Host`] for the duration of a single rig step.

pub mod persistence;
mod rig;
pub mod voxel;

use std::collections::BTreeMap;

use quarry_rig_core::{
    envelope_bounds, Bounds, Command, DownstreamAcceptor, Environment, Event, PowerSource, RigId,
    RigTuning,
};
use quarry_rig_system_scheduler::TickScheduler;
use tracing::{info, warn};

pub use rig::{Placement, RigState};

/// Collaborators a rig works with during one step, borrowed together.
pub struct RigPorts<'a> {
    /// Environment the rig excavates.
    pub env: &'a mut dyn Environment,
    /// Energy store feeding the rig.
    pub power: &'a mut dyn PowerSource,
    /// Consumer of harvested material; `None` ejects into the environment.
    pub acceptor: Option<&'a mut dyn DownstreamAcceptor>,
}

/// Embedding that provides each rig with its collaborators.
pub trait Host {
    /// Borrows the collaborators of `rig`, or `None` when the host has none.
    fn ports(&mut self, rig: RigId) -> Option<RigPorts<'_>>;

    /// Reports whether the boundary structure enclosing `bounds` is complete.
    fn structure_complete(&self, rig: RigId, bounds: &Bounds) -> bool;

    /// Invoked once at the start of every step before any rig runs.
    fn begin_step(&mut self, _step: u64) {}
}

/// Represents the authoritative Quarry Rig world state.
#[derive(Debug)]
pub struct World<H> {
    host: H,
    tuning: RigTuning,
    pending: BTreeMap<RigId, Placement>,
    rigs: BTreeMap<RigId, RigState>,
    scheduler: TickScheduler,
    step_index: u64,
}

impl<H: Host> World<H> {
    /// Creates an empty world driven by `host`.
    #[must_use]
    pub fn new(host: H, tuning: RigTuning) -> Self {
        let scheduler = TickScheduler::new(tuning.scheduler.clone());
        Self {
            host,
            tuning,
            pending: BTreeMap::new(),
            rigs: BTreeMap::new(),
            scheduler,
            step_index: 0,
        }
    }

    /// Mutable access to the host, for adapters that drive its collaborators.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Consumes the world and hands the host back.
    #[must_use]
    pub fn into_host(self) -> H {
        self.host
    }

    fn remove_rig(&mut self, rig: RigId) -> bool {
        let active = self.rigs.remove(&rig).is_some();
        let pending = self.pending.remove(&rig).is_some();
        active || pending
    }

    fn activate_ready(&mut self, out_events: &mut Vec<Event>) {
        let ready: Vec<RigId> = self
            .pending
            .iter()
            .filter(|(rig, placement)| self.host.structure_complete(**rig, &placement.bounds))
            .map(|(rig, _)| *rig)
            .collect();

        for rig in ready {
            let Some(placement) = self.pending.remove(&rig) else {
                continue;
            };
            info!(%rig, bounds = ?placement.bounds, "rig activated");
            let _ = self.rigs.insert(rig, RigState::new(rig, placement));
            out_events.push(Event::RigActivated { rig });
        }
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply<H: Host>(world: &mut World<H>, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::PlaceRig {
            rig,
            anchor,
            facing,
            size,
            lowest_layer_y,
        } => {
            if world.remove_rig(rig) {
                info!(%rig, "rig re-placed");
                out_events.push(Event::RigRemoved { rig });
            }
            let guard = world.tuning.obstacles.guard_height;
            match envelope_bounds(anchor, facing, size, guard) {
                Ok(bounds) => {
                    info!(%rig, ?anchor, ?facing, "rig placed");
                    let _ = world.pending.insert(
                        rig,
                        Placement {
                            anchor,
                            facing,
                            size,
                            lowest_layer_y,
                            bounds,
                        },
                    );
                    out_events.push(Event::RigPlaced { rig, bounds });
                }
                Err(reason) => {
                    warn!(%rig, %reason, "rig placement rejected");
                    out_events.push(Event::RigPlacementRejected { rig, reason });
                }
            }
        }
        Command::RemoveRig { rig } => {
            if world.remove_rig(rig) {
                info!(%rig, "rig removed");
                out_events.push(Event::RigRemoved { rig });
            }
        }
        Command::Step { measured } => {
            world.step_index = world.step_index.saturating_add(1);
            let step = world.step_index;
            out_events.push(Event::TimeAdvanced { step });

            world.host.begin_step(step);
            let _ = world.scheduler.begin_step(step, measured);
            world.activate_ready(out_events);

            for (id, rig) in &mut world.rigs {
                let Some(ports) = world.host.ports(*id) else {
                    continue;
                };
                rig.step(ports, &mut world.scheduler, &world.tuning, step, out_events);
            }
        }
    }
}

/// Reinstates a rig from a persisted state, replacing any rig with its id.
pub fn restore_rig<H: Host>(world: &mut World<H>, state: RigState, out_events: &mut Vec<Event>) {
    let rig = state.id();
    if world.remove_rig(rig) {
        out_events.push(Event::RigRemoved { rig });
    }
    info!(%rig, "rig restored");
    let _ = world.rigs.insert(rig, state);
    out_events.push(Event::RigActivated { rig });
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use glam::Vec3;
    use quarry_rig_core::{ColumnCoord, MovementState, RigId, RigTuning};
    use quarry_rig_system_mining::LayerPhase;
    use quarry_rig_system_scheduler::TickScheduler;
    use serde::Serialize;

    use super::{Placement, RigState, World};

    /// Index of the most recently executed step.
    #[must_use]
    pub fn step_index<H>(world: &World<H>) -> u64 {
        world.step_index
    }

    /// Provides read-only access to the host.
    #[must_use]
    pub fn host<H>(world: &World<H>) -> &H {
        &world.host
    }

    /// Tuning the world was created with.
    #[must_use]
    pub fn tuning<H>(world: &World<H>) -> &RigTuning {
        &world.tuning
    }

    /// Shared removal budget.
    #[must_use]
    pub fn scheduler<H>(world: &World<H>) -> &TickScheduler {
        &world.scheduler
    }

    /// Identifiers of every active rig in ascending order.
    #[must_use]
    pub fn rig_ids<H>(world: &World<H>) -> Vec<RigId> {
        world.rigs.keys().copied().collect()
    }

    /// State of an active rig.
    #[must_use]
    pub fn rig<H>(world: &World<H>, rig: RigId) -> Option<&RigState> {
        world.rigs.get(&rig)
    }

    /// Placement of a rig still waiting for its boundary structure.
    #[must_use]
    pub fn pending<H>(world: &World<H>, rig: RigId) -> Option<&Placement> {
        world.pending.get(&rig)
    }

    /// Captures a read-only view of every active rig.
    #[must_use]
    pub fn rig_view<H>(world: &World<H>) -> RigView {
        let snapshots = world
            .rigs
            .values()
            .map(|rig| RigSnapshot {
                id: rig.id(),
                movement: rig.gantry().state().kind(),
                position: rig.gantry().position(),
                target: rig.gantry().target(),
                layer_y: rig.mining().layer_y(),
                phase: rig.mining().phase(),
                speed: rig.speed().current(),
                queued: rig.output().len(),
                powered: rig.is_powered(),
            })
            .collect();
        RigView { snapshots }
    }

    /// Read-only snapshot describing all active rigs.
    #[derive(Clone, Debug, Serialize)]
    pub struct RigView {
        snapshots: Vec<RigSnapshot>,
    }

    impl RigView {
        /// Iterator over the captured rig snapshots in ascending id order.
        pub fn iter(&self) -> impl Iterator<Item = &RigSnapshot> {
            self.snapshots.iter()
        }

        /// Number of captured rigs.
        #[must_use]
        pub fn len(&self) -> usize {
            self.snapshots.len()
        }

        /// Reports whether no rig is active.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.snapshots.is_empty()
        }
    }

    /// Immutable representation of a single rig's state.
    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub struct RigSnapshot {
        /// Identifier of the rig.
        pub id: RigId,
        /// Movement state of the tool head.
        pub movement: MovementState,
        /// Tool head position.
        pub position: Vec3,
        /// Column the tool head is heading for.
        pub target: Option<ColumnCoord>,
        /// Layer currently excavated.
        pub layer_y: i32,
        /// Stage of the current layer.
        pub phase: LayerPhase,
        /// Current speed multiplier.
        pub speed: f32,
        /// Records waiting in the output queue.
        pub queued: usize,
        /// Whether the last step had enough power.
        pub powered: bool,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use quarry_rig_core::{BlockPos, EnvelopeError, EnvelopeSize, Facing};

    use super::*;
    use crate::voxel::{Battery, SimHost, VoxelGrid};

    const RIG: RigId = RigId::new(1);

    fn host() -> SimHost {
        let grid = VoxelGrid::new(BlockPos::new(-8, 0, -8), BlockPos::new(8, 16, 8));
        let mut host = SimHost::new(grid);
        host.add_rig(RIG, Battery::new(1_000.0, 40.0), None);
        host
    }

    fn place(world: &mut World<SimHost>, out: &mut Vec<Event>) {
        apply(
            world,
            Command::PlaceRig {
                rig: RIG,
                anchor: BlockPos::new(0, 8, 0),
                facing: Facing::North,
                size: EnvelopeSize::new(5, 5, 6),
                lowest_layer_y: 4,
            },
            out,
        );
    }

    fn step(world: &mut World<SimHost>, out: &mut Vec<Event>) {
        apply(
            world,
            Command::Step {
                measured: Duration::from_millis(25),
            },
            out,
        );
    }

    #[test]
    fn rig_waits_for_its_frame_before_activating() {
        let mut world = World::new(host(), RigTuning::default());
        let mut events = Vec::new();
        place(&mut world, &mut events);

        let bounds = query::pending(&world, RIG).expect("pending").bounds;
        assert_eq!(events, vec![Event::RigPlaced { rig: RIG, bounds }]);

        step(&mut world, &mut events);
        assert!(query::rig(&world, RIG).is_none());

        world.host_mut().build_frame(&bounds);
        events.clear();
        step(&mut world, &mut events);
        assert!(events.contains(&Event::RigActivated { rig: RIG }));
        assert!(query::pending(&world, RIG).is_none());
        assert_eq!(query::rig_ids(&world), vec![RIG]);
    }

    #[test]
    fn undersized_envelope_is_rejected() {
        let mut world = World::new(host(), RigTuning::default());
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::PlaceRig {
                rig: RIG,
                anchor: BlockPos::new(0, 8, 0),
                facing: Facing::West,
                size: EnvelopeSize::new(2, 5, 6),
                lowest_layer_y: 4,
            },
            &mut events,
        );

        assert_eq!(
            events,
            vec![Event::RigPlacementRejected {
                rig: RIG,
                reason: EnvelopeError::FootprintTooSmall {
                    width: 2,
                    length: 5
                },
            }]
        );
        assert!(query::pending(&world, RIG).is_none());
    }

    #[test]
    fn placing_an_existing_rig_replaces_it() {
        let mut world = World::new(host(), RigTuning::default());
        let mut events = Vec::new();
        place(&mut world, &mut events);
        let bounds = query::pending(&world, RIG).expect("pending").bounds;
        world.host_mut().build_frame(&bounds);
        step(&mut world, &mut events);

        events.clear();
        place(&mut world, &mut events);
        assert_eq!(
            events,
            vec![
                Event::RigRemoved { rig: RIG },
                Event::RigPlaced { rig: RIG, bounds },
            ]
        );
        assert!(query::rig(&world, RIG).is_none());
    }

    #[test]
    fn removing_unknown_rig_is_silent() {
        let mut world = World::new(host(), RigTuning::default());
        let mut events = Vec::new();
        apply(&mut world, Command::RemoveRig { rig: RIG }, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn steps_are_numbered_from_one() {
        let mut world = World::new(host(), RigTuning::default());
        let mut events = Vec::new();
        step(&mut world, &mut events);
        step(&mut world, &mut events);

        assert_eq!(
            events,
            vec![
                Event::TimeAdvanced { step: 1 },
                Event::TimeAdvanced { step: 2 }
            ]
        );
        assert_eq!(query::step_index(&world), 2);
        assert_eq!(query::scheduler(&world).current_step(), 2);
    }
}
