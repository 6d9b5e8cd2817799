//! Per-rig state and the orchestration of a single rig step.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use quarry_rig_core::{
    BlockPos, Bounds, ColumnCoord, DeferralReason, EnvelopeSize, Event, Facing, RigId, RigTuning,
};
use quarry_rig_system_mining::{MiningContext, MiningManager};
use quarry_rig_system_movement::{Gantry, GantryCommand, GantryInputs};
use quarry_rig_system_output::OutputManager;
use quarry_rig_system_scheduler::{phase_slot, TickScheduler};
use quarry_rig_system_speed::SpeedController;

use crate::RigPorts;

/// Placement request of a rig, kept until its boundary structure completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Cell the rig is anchored at.
    pub anchor: BlockPos,
    /// Direction the rig faces.
    pub facing: Facing,
    /// Requested envelope dimensions.
    pub size: EnvelopeSize,
    /// Lowest layer the rig may excavate.
    pub lowest_layer_y: i32,
    /// Envelope derived from the placement.
    pub bounds: Bounds,
}

/// Mutable state owned by a single active rig.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RigState {
    id: RigId,
    placement: Placement,
    gantry: Gantry,
    mining: MiningManager,
    speed: SpeedController,
    output: OutputManager,
    powered: bool,
    idle_until: Option<u64>,
}

impl RigState {
    /// Creates the state of a rig whose boundary structure just completed.
    #[must_use]
    pub fn new(id: RigId, placement: Placement) -> Self {
        let bounds = placement.bounds;
        let mining = MiningManager::new(&bounds, placement.facing, placement.lowest_layer_y);
        let start = mining.sweep().first(&bounds).unwrap_or_else(|| {
            ColumnCoord::new(*bounds.interior_x().start(), *bounds.interior_z().start())
        });
        Self {
            id,
            placement,
            gantry: Gantry::new(&bounds, start),
            mining,
            speed: SpeedController::new(),
            output: OutputManager::new(),
            powered: true,
            idle_until: None,
        }
    }

    /// Identifier of the rig.
    #[must_use]
    pub const fn id(&self) -> RigId {
        self.id
    }

    /// Placement the rig was created from.
    #[must_use]
    pub const fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Envelope of the rig.
    #[must_use]
    pub const fn bounds(&self) -> &Bounds {
        &self.placement.bounds
    }

    /// Tool head state.
    #[must_use]
    pub const fn gantry(&self) -> &Gantry {
        &self.gantry
    }

    /// Excavation progress.
    #[must_use]
    pub const fn mining(&self) -> &MiningManager {
        &self.mining
    }

    /// Power-to-speed controller.
    #[must_use]
    pub const fn speed(&self) -> &SpeedController {
        &self.speed
    }

    /// Output queue.
    #[must_use]
    pub const fn output(&self) -> &OutputManager {
        &self.output
    }

    /// Reports whether the last step had enough power.
    #[must_use]
    pub const fn is_powered(&self) -> bool {
        self.powered
    }

    /// Reports whether the rig counts against the world's removal budget.
    #[must_use]
    pub fn is_working(&self) -> bool {
        !self.mining.is_finished() && self.gantry.target().is_some()
    }

    /// Advances the rig by one step.
    pub(crate) fn step(
        &mut self,
        ports: RigPorts<'_>,
        scheduler: &mut TickScheduler,
        tuning: &RigTuning,
        step: u64,
        out: &mut Vec<Event>,
    ) {
        let RigPorts {
            env,
            power,
            acceptor,
        } = ports;
        let bounds = self.placement.bounds;
        let guard_height = tuning.obstacles.guard_height;

        let speed = if self.mining.is_finished() {
            self.speed.halt();
            0.0
        } else {
            let stored = power.current_stored();
            let required = tuning.speed.drain_per_step;
            let drained = power.drain(required);
            let speed = self.speed.update(stored, &tuning.speed);
            if drained < required {
                self.on_power_lost(out);
                0.0
            } else {
                self.on_power_restored(out);
                speed
            }
        };

        self.mining.purge_expired(step);

        if self.needs_target(step) {
            let ctx = MiningContext {
                rig: self.id,
                env: &*env,
                bounds: &bounds,
                tuning: &tuning.mining,
                guard_height,
            };
            if let Some(target) = self.mining.select_target(&ctx, self.gantry.cell(), out) {
                debug!(rig = %self.id, ?target, "target assigned");
                self.gantry.send(GantryCommand::AssignTarget { target });
                out.push(Event::TargetAssigned {
                    rig: self.id,
                    target,
                });
            }
        }

        if self.is_working() || self.gantry.pending_commands() > 0 {
            scheduler.register_active();
        }

        let mark = out.len();
        {
            let inputs = GantryInputs {
                rig: self.id,
                env: &*env,
                bounds: &bounds,
                obstacles: &tuning.obstacles,
                motion: &tuning.motion,
                speed,
            };
            let mut recovery = self.mining.recovery(&tuning.mining, guard_height, step);
            self.gantry.step(&inputs, &mut recovery, out);
        }
        if out[mark..]
            .iter()
            .any(|event| matches!(event, Event::RigIdled { .. }))
        {
            self.idle_until = Some(step.saturating_add(tuning.mining.temp_skip_steps));
        }

        if self.mining.advance_removal(
            self.gantry.is_mining(),
            speed,
            tuning.mining.removal_stages,
        ) {
            match self.removal_gate(scheduler, tuning) {
                Some(reason) => {
                    trace!(rig = %self.id, ?reason, "removal deferred");
                    out.push(Event::RemovalDeferred {
                        rig: self.id,
                        reason,
                    });
                }
                None => {
                    if let Some((cell, records)) = self.mining.complete_removal(&mut *env) {
                        debug!(rig = %self.id, ?cell, records = records.len(), "cell removed");
                        self.output.push(records.iter().copied());
                        self.output.on_removal_succeeded();
                        out.push(Event::CellRemoved {
                            rig: self.id,
                            cell,
                            records,
                        });

                        let ctx = MiningContext {
                            rig: self.id,
                            env: &*env,
                            bounds: &bounds,
                            tuning: &tuning.mining,
                            guard_height,
                        };
                        let next_target = self.mining.select_target(&ctx, self.gantry.cell(), out);
                        self.gantry
                            .send(GantryCommand::RemovalComplete { next_target });
                        if let Some(target) = next_target {
                            out.push(Event::TargetAssigned {
                                rig: self.id,
                                target,
                            });
                        }
                    }
                }
            }
        }

        let report = self.output.flush(
            acceptor,
            &mut *env,
            self.placement.anchor,
            tuning.output.flush_batch,
        );
        if !report.is_empty() {
            out.push(Event::MaterialsFlushed {
                rig: self.id,
                moved: report.moved,
                ejected: report.ejected,
            });
        }
    }

    fn needs_target(&self, step: u64) -> bool {
        self.powered
            && self.gantry.target().is_none()
            && self.gantry.pending_commands() == 0
            && self.mining.target().is_none()
            && !self.mining.is_finished()
            && self.idle_until.map_or(true, |until| step >= until)
    }

    fn removal_gate(
        &self,
        scheduler: &mut TickScheduler,
        tuning: &RigTuning,
    ) -> Option<DeferralReason> {
        if !scheduler.is_phase_open(phase_slot(self.id)) {
            return Some(DeferralReason::PhaseGate);
        }
        if !self.output.has_room(&tuning.output) {
            return Some(DeferralReason::OutputFull);
        }
        if !scheduler.try_consume_token() {
            return Some(DeferralReason::NoTokens);
        }
        None
    }

    fn on_power_lost(&mut self, out: &mut Vec<Event>) {
        self.speed.halt();
        if !self.powered {
            return;
        }
        self.powered = false;
        info!(rig = %self.id, "power lost");
        self.output.on_power_lost();
        self.mining.reset_progress();
        self.gantry.send(GantryCommand::Halt);
        self.idle_until = None;
        out.push(Event::PowerLost { rig: self.id });
    }

    fn on_power_restored(&mut self, out: &mut Vec<Event>) {
        if self.powered {
            return;
        }
        self.powered = true;
        info!(rig = %self.id, "power restored");
        out.push(Event::PowerRestored { rig: self.id });
    }
}
