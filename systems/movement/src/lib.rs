#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic movement state machine for a rig's tool head.
//!
//! The gantry travels across the interior footprint of its envelope toward
//! a target column. Before every horizontal hop it asks the obstacle scanner
//! how much lift the hop needs and retracts first when the current lift is
//! insufficient. Paths come from the grid pathfinder; when a target cannot be
//! reached the gantry asks its [`TargetSource`] for an alternative before
//! giving up and idling.

use std::collections::VecDeque;

use glam::{Vec2, Vec3};
use quarry_rig_core::{
    Bounds, ColumnCoord, Environment, Event, MotionTuning, MovementState, ObstacleTuning, RigId,
};
use quarry_rig_system_obstacles::{column_top, is_column_sealed_at_ceiling, required_lift};
use quarry_rig_system_pathfinding::GridPathfinder;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Movement state together with the data each state needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GantryState {
    /// Waiting for a target.
    Idle,
    /// Deciding the next hop.
    Scanning,
    /// Raising the tool head before a hop.
    Retracting {
        /// Lift to reach before re-checking clearance.
        target_lift: u32,
        /// Column the hop leads to.
        hop: ColumnCoord,
    },
    /// Re-validating clearance after a lift.
    ClearanceCheck {
        /// Column the hop leads to.
        hop: ColumnCoord,
    },
    /// Travelling horizontally toward a waypoint.
    Traversing {
        /// Column currently travelled to.
        waypoint: ColumnCoord,
    },
    /// Fine positioning onto the target cell centre.
    Centering,
    /// Lowering onto the work cell.
    Deploying,
    /// Holding position while the work cell is excavated.
    Mining,
}

impl GantryState {
    /// Data-free classification of the state.
    #[must_use]
    pub const fn kind(&self) -> MovementState {
        match self {
            Self::Idle => MovementState::Idle,
            Self::Scanning => MovementState::Scanning,
            Self::Retracting { .. } => MovementState::Retracting,
            Self::ClearanceCheck { .. } => MovementState::ClearanceCheck,
            Self::Traversing { .. } => MovementState::Traversing,
            Self::Centering => MovementState::Centering,
            Self::Deploying => MovementState::Deploying,
            Self::Mining => MovementState::Mining,
        }
    }
}

/// Instructions queued for the gantry and consumed at the start of its next
/// step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GantryCommand {
    /// Travel to a new target column.
    AssignTarget {
        /// Column to travel to.
        target: ColumnCoord,
    },
    /// The cell under the tool head was excavated.
    RemovalComplete {
        /// Column to travel to next, if any work remains.
        next_target: Option<ColumnCoord>,
    },
    /// Drop the target and the path and wait in idle.
    Halt,
}

/// Context handed to a [`TargetSource`] when the current target is
/// unreachable.
#[derive(Debug)]
pub struct RecoveryRequest<'a, E: ?Sized> {
    /// Environment the rig works in.
    pub env: &'a E,
    /// Envelope bounds of the rig.
    pub bounds: &'a Bounds,
    /// Target the pathfinder could not reach.
    pub unreachable: ColumnCoord,
    /// Column the tool head currently occupies.
    pub from: ColumnCoord,
}

/// Supplies replacement targets when the gantry cannot reach its target.
pub trait TargetSource {
    /// Records `request.unreachable` as temporarily unreachable and proposes
    /// an alternative target. `reachable` runs the pathfinder from the tool
    /// head's current column.
    fn recover<E>(
        &mut self,
        request: RecoveryRequest<'_, E>,
        reachable: &mut dyn FnMut(ColumnCoord) -> bool,
    ) -> Option<ColumnCoord>
    where
        E: Environment + ?Sized;
}

/// Read-only inputs for a single gantry step.
#[derive(Debug)]
pub struct GantryInputs<'a, E: ?Sized> {
    /// Rig the gantry belongs to.
    pub rig: RigId,
    /// Environment the rig works in.
    pub env: &'a E,
    /// Envelope bounds of the rig.
    pub bounds: &'a Bounds,
    /// Obstacle detection constants.
    pub obstacles: &'a ObstacleTuning,
    /// Motion rates and failsafes.
    pub motion: &'a MotionTuning,
    /// Speed multiplier for this step.
    pub speed: f32,
}

impl<E: ?Sized> GantryInputs<'_, E> {
    fn horizontal_step(&self) -> f32 {
        self.motion.base_step * self.speed.max(0.0)
    }

    fn vertical_step(&self) -> f32 {
        self.horizontal_step() * self.motion.vertical_ratio
    }
}

/// Tool head of a single rig.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Gantry {
    position: Vec3,
    lift: f32,
    state: GantryState,
    ticks_in_state: u32,
    target: Option<ColumnCoord>,
    path: VecDeque<ColumnCoord>,
    path_target: Option<ColumnCoord>,
    repath_cooldown: u32,
    inbox: VecDeque<GantryCommand>,
    #[serde(skip)]
    planner: GridPathfinder,
}

impl Gantry {
    /// Creates an idle gantry resting on the floor above `start`.
    #[must_use]
    pub fn new(bounds: &Bounds, start: ColumnCoord) -> Self {
        let mut gantry = Self {
            position: cell_centre(start, bounds.floor() as f32),
            lift: 0.0,
            state: GantryState::Idle,
            ticks_in_state: 0,
            target: None,
            path: VecDeque::new(),
            path_target: None,
            repath_cooldown: 0,
            inbox: VecDeque::new(),
            planner: GridPathfinder::new(),
        };
        gantry.clamp(bounds);
        gantry
    }

    /// Continuous position of the tool head.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Current lift above the floor.
    #[must_use]
    pub const fn lift(&self) -> f32 {
        self.lift
    }

    /// Current movement state.
    #[must_use]
    pub const fn state(&self) -> GantryState {
        self.state
    }

    /// Steps spent in the current state.
    #[must_use]
    pub const fn ticks_in_state(&self) -> u32 {
        self.ticks_in_state
    }

    /// Column the gantry travels to.
    #[must_use]
    pub const fn target(&self) -> Option<ColumnCoord> {
        self.target
    }

    /// Remaining waypoints of the planned path.
    pub fn path(&self) -> impl Iterator<Item = ColumnCoord> + '_ {
        self.path.iter().copied()
    }

    /// Commands waiting for the next step.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.inbox.len()
    }

    /// Column the tool head occupies.
    #[must_use]
    pub fn cell(&self) -> ColumnCoord {
        ColumnCoord::new(
            self.position.x.floor() as i32,
            self.position.z.floor() as i32,
        )
    }

    /// Reports whether the tool head is on the target column.
    #[must_use]
    pub fn at_target(&self) -> bool {
        self.target == Some(self.cell())
    }

    /// Reports whether the gantry holds position over its target for work.
    #[must_use]
    pub fn is_mining(&self) -> bool {
        self.state == GantryState::Mining && self.at_target()
    }

    /// Reports whether the gantry is waiting rather than moving, so the state
    /// timeout does not apply. A deferred removal keeps it in this state.
    fn is_holding(&self) -> bool {
        self.state == GantryState::Idle || self.is_mining()
    }

    /// Queues a command for the next step.
    pub fn send(&mut self, command: GantryCommand) {
        self.inbox.push_back(command);
    }

    /// Advances the state machine by one step.
    pub fn step<E, T>(&mut self, inputs: &GantryInputs<'_, E>, targets: &mut T, out: &mut Vec<Event>)
    where
        E: Environment + ?Sized,
        T: TargetSource,
    {
        self.drain_inbox(inputs.rig, out);
        self.repath_cooldown = self.repath_cooldown.saturating_sub(1);
        self.ticks_in_state = self.ticks_in_state.saturating_add(1);

        if !self.is_holding() && self.ticks_in_state > inputs.motion.max_ticks_per_state {
            let state = self.state.kind();
            warn!(rig = %inputs.rig, ?state, ticks = self.ticks_in_state, "movement state timed out");
            out.push(Event::StateTimedOut {
                rig: inputs.rig,
                state,
            });
            self.drop_path();
            self.transition(inputs.rig, GantryState::Scanning, out);
            return;
        }

        match self.state {
            GantryState::Idle => {
                if self.target.is_some() {
                    self.transition(inputs.rig, GantryState::Scanning, out);
                }
            }
            GantryState::Scanning => self.scan(inputs, targets, out),
            GantryState::Retracting { target_lift, hop } => {
                let ceiling = target_lift.min(inputs.bounds.max_lift(inputs.obstacles.guard_height));
                let ceiling = ceiling as f32;
                self.lift = (self.lift + inputs.vertical_step()).min(ceiling.max(self.lift));
                if self.lift >= ceiling {
                    self.transition(inputs.rig, GantryState::ClearanceCheck { hop }, out);
                }
            }
            GantryState::ClearanceCheck { hop } => {
                let next = self.hop_state(inputs, hop);
                self.transition(inputs.rig, next, out);
            }
            GantryState::Traversing { waypoint } => self.traverse(inputs, waypoint, out),
            GantryState::Centering => self.centre(inputs, out),
            GantryState::Deploying => self.deploy(inputs, out),
            GantryState::Mining => {
                if !self.at_target() {
                    self.transition(inputs.rig, GantryState::Scanning, out);
                }
            }
        }

        self.clamp(inputs.bounds);
    }

    fn drain_inbox(&mut self, rig: RigId, out: &mut Vec<Event>) {
        while let Some(command) = self.inbox.pop_front() {
            match command {
                GantryCommand::AssignTarget { target } => {
                    self.target = Some(target);
                }
                GantryCommand::RemovalComplete { next_target } => {
                    self.target = next_target;
                    if self.state == GantryState::Mining {
                        self.transition(rig, GantryState::Scanning, out);
                    }
                }
                GantryCommand::Halt => {
                    self.target = None;
                    self.drop_path();
                    self.repath_cooldown = 0;
                    self.transition(rig, GantryState::Idle, out);
                }
            }
        }
    }

    fn scan<E, T>(&mut self, inputs: &GantryInputs<'_, E>, targets: &mut T, out: &mut Vec<Event>)
    where
        E: Environment + ?Sized,
        T: TargetSource,
    {
        let Some(target) = self.target else {
            self.transition(inputs.rig, GantryState::Idle, out);
            return;
        };

        let cell = self.cell();
        if cell == target {
            let next = if self.lift > 0.0 {
                GantryState::Deploying
            } else {
                GantryState::Centering
            };
            self.transition(inputs.rig, next, out);
            return;
        }

        if self.path_is_stale(cell) {
            self.replan(inputs, targets, out);
        }

        let Some(hop) = self.path.front().copied() else {
            return;
        };
        let next = self.hop_state(inputs, hop);
        self.transition(inputs.rig, next, out);
    }

    fn traverse<E>(&mut self, inputs: &GantryInputs<'_, E>, waypoint: ColumnCoord, out: &mut Vec<Event>)
    where
        E: Environment + ?Sized,
    {
        let required = self.required_lift(inputs, waypoint);
        if required as f32 > self.lift {
            self.transition(
                inputs.rig,
                GantryState::Retracting {
                    target_lift: required,
                    hop: waypoint,
                },
                out,
            );
            return;
        }

        let goal = cell_centre(waypoint, self.position.y);
        let _ = self.move_toward(goal, inputs.horizontal_step());
        self.clamp(inputs.bounds);

        if self.cell() != waypoint {
            return;
        }
        if self.path.front() == Some(&waypoint) {
            let _ = self.path.pop_front();
        }
        let next = if self.target == Some(waypoint) {
            GantryState::Centering
        } else {
            GantryState::Scanning
        };
        self.transition(inputs.rig, next, out);
    }

    fn centre<E>(&mut self, inputs: &GantryInputs<'_, E>, out: &mut Vec<Event>)
    where
        E: Environment + ?Sized,
    {
        let goal = cell_centre(self.cell(), self.position.y);
        let remaining = self.move_toward(goal, inputs.horizontal_step() * 0.5);
        if remaining > inputs.motion.centering_tolerance {
            return;
        }

        self.position = goal;
        let next = if self.lift > 0.0 {
            GantryState::Deploying
        } else {
            GantryState::Mining
        };
        self.transition(inputs.rig, next, out);
    }

    fn deploy<E>(&mut self, inputs: &GantryInputs<'_, E>, out: &mut Vec<Event>)
    where
        E: Environment + ?Sized,
    {
        let floor = inputs.bounds.floor();
        let lowered = (self.lift - inputs.vertical_step()).max(0.0);
        let below_head = floor + self.lift.floor() as i32 - 1;
        let resting = column_top(inputs.env, self.cell(), floor, below_head)
            .map(|top| (top - floor + 1) as f32);

        match resting {
            Some(rest) if lowered <= rest => {
                self.lift = rest.min(self.lift);
                self.transition(inputs.rig, GantryState::Mining, out);
            }
            _ => {
                self.lift = lowered;
                if self.lift <= 0.0 {
                    self.transition(inputs.rig, GantryState::Mining, out);
                }
            }
        }
    }

    fn hop_state<E>(&self, inputs: &GantryInputs<'_, E>, hop: ColumnCoord) -> GantryState
    where
        E: Environment + ?Sized,
    {
        let required = self.required_lift(inputs, hop);
        if required as f32 > self.lift {
            GantryState::Retracting {
                target_lift: required,
                hop,
            }
        } else {
            GantryState::Traversing { waypoint: hop }
        }
    }

    fn required_lift<E>(&self, inputs: &GantryInputs<'_, E>, hop: ColumnCoord) -> u32
    where
        E: Environment + ?Sized,
    {
        required_lift(
            inputs.env,
            inputs.bounds,
            self.cell(),
            hop,
            inputs.bounds.floor(),
            inputs.obstacles,
        )
    }

    fn path_is_stale(&self, cell: ColumnCoord) -> bool {
        self.path_target != self.target
            || self.repath_cooldown == 0
            || self
                .path
                .front()
                .map_or(true, |next| !next.is_adjacent(cell))
    }

    fn replan<E, T>(&mut self, inputs: &GantryInputs<'_, E>, targets: &mut T, out: &mut Vec<Event>)
    where
        E: Environment + ?Sized,
        T: TargetSource,
    {
        let Some(target) = self.target else {
            return;
        };
        let cell = self.cell();
        let guard = inputs.obstacles.guard_height;
        let sealed =
            |column: ColumnCoord| is_column_sealed_at_ceiling(inputs.env, inputs.bounds, column, guard);
        self.repath_cooldown = inputs.motion.repath_cooldown;

        if let Some(path) = self.planner.find_path(inputs.bounds, cell, target, sealed) {
            self.path = path.into();
            self.path_target = Some(target);
            return;
        }

        debug!(rig = %inputs.rig, ?target, "target unreachable");
        out.push(Event::TargetUnreachable {
            rig: inputs.rig,
            target,
        });

        let planner = &mut self.planner;
        let mut reachable =
            |column: ColumnCoord| planner.find_path(inputs.bounds, cell, column, sealed).is_some();
        let request = RecoveryRequest {
            env: inputs.env,
            bounds: inputs.bounds,
            unreachable: target,
            from: cell,
        };
        let recovered = targets.recover(request, &mut reachable);

        let path = recovered.and_then(|alternative| {
            self.planner
                .find_path(inputs.bounds, cell, alternative, sealed)
                .map(|path| (alternative, path))
        });

        match path {
            Some((alternative, path)) => {
                debug!(rig = %inputs.rig, target = ?alternative, "target recovered");
                out.push(Event::TargetRecovered {
                    rig: inputs.rig,
                    target: alternative,
                });
                self.target = Some(alternative);
                self.path = path.into();
                self.path_target = Some(alternative);
            }
            None => {
                debug!(rig = %inputs.rig, "no reachable target left");
                self.target = None;
                self.drop_path();
                out.push(Event::RigIdled { rig: inputs.rig });
                self.transition(inputs.rig, GantryState::Idle, out);
            }
        }
    }

    fn drop_path(&mut self) {
        self.path.clear();
        self.path_target = None;
    }

    /// Moves horizontally toward `goal` and returns the remaining distance.
    fn move_toward(&mut self, goal: Vec3, step: f32) -> f32 {
        let offset = Vec2::new(goal.x - self.position.x, goal.z - self.position.z);
        let distance = offset.length();
        if distance <= step {
            self.position.x = goal.x;
            self.position.z = goal.z;
            return 0.0;
        }
        if step > 0.0 {
            let advance = offset / distance * step;
            self.position.x += advance.x;
            self.position.z += advance.y;
        }
        distance - step.max(0.0)
    }

    fn clamp(&mut self, bounds: &Bounds) {
        let x = bounds.interior_x();
        let z = bounds.interior_z();
        self.position.x = self
            .position
            .x
            .clamp(*x.start() as f32 + 0.5, *x.end() as f32 + 0.5);
        self.position.z = self
            .position
            .z
            .clamp(*z.start() as f32 + 0.5, *z.end() as f32 + 0.5);
        self.lift = self.lift.max(0.0);
        self.position.y = bounds.floor() as f32 + self.lift;
    }

    fn transition(&mut self, rig: RigId, next: GantryState, out: &mut Vec<Event>) {
        if next == self.state {
            return;
        }
        let from = self.state.kind();
        let to = next.kind();
        self.state = next;
        self.ticks_in_state = 0;
        if from != to {
            trace!(%rig, ?from, ?to, "movement state changed");
            out.push(Event::MovementChanged { rig, from, to });
        }
    }
}

fn cell_centre(column: ColumnCoord, y: f32) -> Vec3 {
    Vec3::new(column.x as f32 + 0.5, y, column.z as f32 + 0.5)
}
