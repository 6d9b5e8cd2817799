#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Layer-by-layer excavation bookkeeping for a single rig.
//!
//! The [`MiningManager`] walks each layer in raster order, tracks the cell
//! being worked, temporarily skips cells the gantry could not reach and runs
//! a one-time completeness sweep before descending to the next layer.

mod sweep;

use std::collections::{BTreeMap, VecDeque};

use quarry_rig_core::{
    BlockPos, Bounds, CellState, ColumnCoord, Environment, Event, Facing, MaterialRecord,
    MiningTuning, RigId,
};
use quarry_rig_system_movement::{RecoveryRequest, TargetSource};
use quarry_rig_system_obstacles::is_column_sealed_at_ceiling;
use quarry_rig_system_pathfinding::nearest_on_rings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use sweep::SweepPlanner;

/// Stage of the current layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerPhase {
    /// Following the raster order.
    Raster,
    /// Revisiting cells the raster pass missed.
    FinalSweep,
    /// Every layer down to the lowest allowed one is done.
    Finished,
}

/// Read-only inputs for target selection.
#[derive(Debug)]
pub struct MiningContext<'a, E: ?Sized> {
    /// Rig the manager belongs to.
    pub rig: RigId,
    /// Environment the rig works in.
    pub env: &'a E,
    /// Envelope bounds of the rig.
    pub bounds: &'a Bounds,
    /// Excavation constants.
    pub tuning: &'a MiningTuning,
    /// Ceiling guard band height.
    pub guard_height: u32,
}

/// Excavation state of a single rig.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiningManager {
    layer_y: i32,
    lowest_layer_y: i32,
    sweep: SweepPlanner,
    cursor: Option<ColumnCoord>,
    phase: LayerPhase,
    target: Option<ColumnCoord>,
    removal_progress: u32,
    temp_skip: BTreeMap<BlockPos, u64>,
    final_sweep_pending: bool,
    final_sweep_targets: VecDeque<ColumnCoord>,
}

impl MiningManager {
    /// Creates the manager for a rig whose first layer lies just below the
    /// envelope floor.
    #[must_use]
    pub fn new(bounds: &Bounds, facing: Facing, lowest_layer_y: i32) -> Self {
        Self {
            layer_y: bounds.floor().saturating_sub(1),
            lowest_layer_y,
            sweep: SweepPlanner::new(facing),
            cursor: None,
            phase: LayerPhase::Raster,
            target: None,
            removal_progress: 0,
            temp_skip: BTreeMap::new(),
            final_sweep_pending: true,
            final_sweep_targets: VecDeque::new(),
        }
    }

    /// Layer currently excavated.
    #[must_use]
    pub const fn layer_y(&self) -> i32 {
        self.layer_y
    }

    /// Lowest layer the rig may excavate.
    #[must_use]
    pub const fn lowest_layer_y(&self) -> i32 {
        self.lowest_layer_y
    }

    /// Stage of the current layer.
    #[must_use]
    pub const fn phase(&self) -> LayerPhase {
        self.phase
    }

    /// Reports whether the rig has excavated every allowed layer.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase == LayerPhase::Finished
    }

    /// Visiting order of the current layer.
    #[must_use]
    pub const fn sweep(&self) -> &SweepPlanner {
        &self.sweep
    }

    /// Column currently assigned for excavation.
    #[must_use]
    pub const fn target(&self) -> Option<ColumnCoord> {
        self.target
    }

    /// Cell currently being excavated.
    #[must_use]
    pub fn working_cell(&self) -> Option<BlockPos> {
        self.target.map(|column| column.at(self.layer_y))
    }

    /// Work steps spent on the current cell.
    #[must_use]
    pub const fn removal_progress(&self) -> u32 {
        self.removal_progress
    }

    /// Reports whether the end-of-layer sweep is still to run.
    #[must_use]
    pub const fn final_sweep_pending(&self) -> bool {
        self.final_sweep_pending
    }

    /// Cells queued for the end-of-layer sweep.
    pub fn final_sweep_targets(&self) -> impl Iterator<Item = ColumnCoord> + '_ {
        self.final_sweep_targets.iter().copied()
    }

    /// Reports whether `cell` is excluded from target selection.
    #[must_use]
    pub fn is_skipped(&self, cell: BlockPos) -> bool {
        self.temp_skip.contains_key(&cell)
    }

    /// Number of temporarily skipped cells.
    #[must_use]
    pub fn skipped_len(&self) -> usize {
        self.temp_skip.len()
    }

    /// Drops skip entries that expired at or before `step`.
    pub fn purge_expired(&mut self, step: u64) {
        self.temp_skip.retain(|_, expiry| *expiry > step);
    }

    /// Reports whether `column` holds excavatable material on the current
    /// layer and may be selected.
    pub fn is_workable<E>(&self, env: &E, bounds: &Bounds, guard: u32, column: ColumnCoord) -> bool
    where
        E: Environment + ?Sized,
    {
        !self.is_skipped(column.at(self.layer_y)) && self.is_sweep_candidate(env, bounds, guard, column)
    }

    /// Picks the next target, descending layers as they run out of work.
    ///
    /// Skipped cells are passed over by the raster pass and revisited by the
    /// final sweep. Returns `None` once the rig has finished.
    pub fn select_target<E>(
        &mut self,
        ctx: &MiningContext<'_, E>,
        from: ColumnCoord,
        out: &mut Vec<Event>,
    ) -> Option<ColumnCoord>
    where
        E: Environment + ?Sized,
    {
        self.removal_progress = 0;
        self.target = None;

        loop {
            match self.phase {
                LayerPhase::Finished => return None,
                LayerPhase::Raster => {
                    if self.layer_y < self.lowest_layer_y {
                        self.finish(ctx.rig, out);
                        continue;
                    }
                    let next = self.sweep.next(ctx.bounds, self.cursor, |column| {
                        self.is_workable(ctx.env, ctx.bounds, ctx.guard_height, column)
                    });
                    if let Some(column) = next {
                        self.cursor = Some(column);
                        self.target = Some(column);
                        return Some(column);
                    }
                    self.begin_final_sweep(ctx, from, out);
                }
                LayerPhase::FinalSweep => {
                    while let Some(column) = self.final_sweep_targets.pop_front() {
                        if self.is_sweep_candidate(ctx.env, ctx.bounds, ctx.guard_height, column) {
                            self.target = Some(column);
                            return Some(column);
                        }
                    }
                    self.complete_layer(ctx, out);
                }
            }
        }
    }

    /// Drops all in-progress work on the current layer.
    ///
    /// The layer restarts its raster pass from the first column, and an
    /// interrupted final sweep becomes pending again. Removed cells are not
    /// revisited because only solid cells are ever selected.
    pub fn reset_progress(&mut self) {
        if self.phase == LayerPhase::Finished {
            return;
        }
        self.target = None;
        self.removal_progress = 0;
        self.cursor = None;
        self.temp_skip.clear();
        if self.phase == LayerPhase::FinalSweep {
            self.phase = LayerPhase::Raster;
            self.final_sweep_pending = true;
        }
        self.final_sweep_targets.clear();
    }

    /// Counts one step of work on the target cell.
    ///
    /// Work only progresses while the tool head is on the target and moving
    /// power is available. Returns `true` once the cell is ready for removal.
    pub fn advance_removal(&mut self, at_target: bool, speed: f32, stages: u32) -> bool {
        if self.target.is_none() || !at_target || speed <= 0.0 {
            return false;
        }
        if self.removal_progress < stages {
            self.removal_progress += 1;
        }
        self.removal_progress >= stages
    }

    /// Removes the target cell from the environment.
    pub fn complete_removal<E>(&mut self, env: &mut E) -> Option<(BlockPos, Vec<MaterialRecord>)>
    where
        E: Environment + ?Sized,
    {
        let cell = self.working_cell()?;
        self.target = None;
        self.removal_progress = 0;
        let records = env.remove_cell(cell);
        Some((cell, records))
    }

    /// Borrows the manager as the gantry's source of replacement targets.
    pub fn recovery<'a>(
        &'a mut self,
        tuning: &'a MiningTuning,
        guard_height: u32,
        step: u64,
    ) -> Recovery<'a> {
        Recovery {
            manager: self,
            tuning,
            guard_height,
            step,
        }
    }

    fn is_sweep_candidate<E>(&self, env: &E, bounds: &Bounds, guard: u32, column: ColumnCoord) -> bool
    where
        E: Environment + ?Sized,
    {
        bounds.interior_contains(column)
            && env.cell_state(column.at(self.layer_y)) == CellState::Solid
            && !is_column_sealed_at_ceiling(env, bounds, column, guard)
    }

    fn skip(&mut self, column: ColumnCoord, expiry: u64) {
        let _ = self.temp_skip.insert(column.at(self.layer_y), expiry);
    }

    fn begin_final_sweep<E>(&mut self, ctx: &MiningContext<'_, E>, from: ColumnCoord, out: &mut Vec<Event>)
    where
        E: Environment + ?Sized,
    {
        self.phase = LayerPhase::FinalSweep;
        self.final_sweep_targets.clear();
        if !ctx.tuning.final_sweep || !self.final_sweep_pending {
            return;
        }
        self.final_sweep_pending = false;

        let mut missed: Vec<ColumnCoord> = ctx
            .bounds
            .interior_columns()
            .filter(|column| self.is_sweep_candidate(ctx.env, ctx.bounds, ctx.guard_height, *column))
            .collect();
        if missed.is_empty() {
            return;
        }
        missed.sort_by_key(|column| (column.manhattan_distance(from), column.x, column.z));

        let count = u32::try_from(missed.len()).unwrap_or(u32::MAX);
        debug!(rig = %ctx.rig, layer = self.layer_y, count, "final sweep started");
        out.push(Event::FinalSweepStarted {
            rig: ctx.rig,
            layer_y: self.layer_y,
            count,
        });
        self.final_sweep_targets.extend(missed);
    }

    fn complete_layer<E>(&mut self, ctx: &MiningContext<'_, E>, out: &mut Vec<Event>)
    where
        E: Environment + ?Sized,
    {
        debug!(rig = %ctx.rig, layer = self.layer_y, "layer completed");
        out.push(Event::LayerCompleted {
            rig: ctx.rig,
            layer_y: self.layer_y,
        });

        self.layer_y = self.layer_y.saturating_sub(1);
        self.sweep.descend(ctx.bounds);
        self.cursor = None;
        self.phase = LayerPhase::Raster;
        self.final_sweep_pending = true;
        self.final_sweep_targets.clear();
        self.temp_skip.clear();
    }

    fn finish(&mut self, rig: RigId, out: &mut Vec<Event>) {
        info!(%rig, "excavation finished");
        self.phase = LayerPhase::Finished;
        self.target = None;
        self.temp_skip.clear();
        self.final_sweep_targets.clear();
        out.push(Event::Finished { rig });
    }

    fn recover<E>(
        &mut self,
        request: RecoveryRequest<'_, E>,
        reachable: &mut dyn FnMut(ColumnCoord) -> bool,
        tuning: &MiningTuning,
        guard: u32,
        step: u64,
    ) -> Option<ColumnCoord>
    where
        E: Environment + ?Sized,
    {
        let RecoveryRequest {
            env,
            bounds,
            unreachable,
            from,
        } = request;
        let expiry = step.saturating_add(tuning.temp_skip_steps);
        self.skip(unreachable, expiry);
        self.target = None;
        self.removal_progress = 0;

        let mut probes = 0;
        match self.phase {
            LayerPhase::Finished => return None,
            LayerPhase::Raster => {
                while probes < tuning.recovery_probe_limit {
                    let Some(column) = self.sweep.next(bounds, self.cursor, |column| {
                        self.is_workable(env, bounds, guard, column)
                    }) else {
                        break;
                    };
                    probes += 1;
                    self.cursor = Some(column);
                    if reachable(column) {
                        debug!(?column, probes, "recovered along raster order");
                        self.target = Some(column);
                        return Some(column);
                    }
                    self.skip(column, expiry);
                }
            }
            LayerPhase::FinalSweep => {
                while probes < tuning.recovery_probe_limit {
                    let Some(column) = self.final_sweep_targets.pop_front() else {
                        break;
                    };
                    if !self.is_workable(env, bounds, guard, column) {
                        continue;
                    }
                    probes += 1;
                    if reachable(column) {
                        debug!(?column, probes, "recovered along final sweep");
                        self.target = Some(column);
                        return Some(column);
                    }
                    self.skip(column, expiry);
                }
            }
        }

        let radius = bounds.interior_width().saturating_add(bounds.interior_depth());
        let mut budget = tuning.ring_probe_limit;
        let found = nearest_on_rings(bounds, from, radius, |column| {
            if budget == 0 || !self.is_workable(env, bounds, guard, column) {
                return false;
            }
            budget -= 1;
            reachable(column)
        });

        if let Some(column) = found {
            debug!(?column, "recovered by ring search");
        }
        self.target = found;
        found
    }
}

/// Target recovery bound to a [`MiningManager`] for one gantry step.
#[derive(Debug)]
pub struct Recovery<'a> {
    manager: &'a mut MiningManager,
    tuning: &'a MiningTuning,
    guard_height: u32,
    step: u64,
}

impl TargetSource for Recovery<'_> {
    fn recover<E>(
        &mut self,
        request: RecoveryRequest<'_, E>,
        reachable: &mut dyn FnMut(ColumnCoord) -> bool,
    ) -> Option<ColumnCoord>
    where
        E: Environment + ?Sized,
    {
        self.manager
            .recover(request, reachable, self.tuning, self.guard_height, self.step)
    }
}
