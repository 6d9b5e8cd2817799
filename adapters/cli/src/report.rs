//! Aggregates world events into a per-rig run report.

use std::collections::BTreeMap;

use quarry_rig_core::{DeferralReason, Event, RigId};
use quarry_rig_world::query::RigView;
use serde::Serialize;

/// Event counters of a single rig.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub(crate) struct RigTally {
    pub(crate) cells_removed: u64,
    pub(crate) units_harvested: u64,
    pub(crate) layers_completed: u32,
    pub(crate) final_sweeps: u32,
    pub(crate) unreachable_targets: u32,
    pub(crate) recoveries: u32,
    pub(crate) idles: u32,
    pub(crate) timeouts: u32,
    pub(crate) deferred_phase: u64,
    pub(crate) deferred_tokens: u64,
    pub(crate) deferred_output: u64,
    pub(crate) power_losses: u32,
    pub(crate) records_moved: u64,
    pub(crate) records_ejected: u64,
    pub(crate) finished_at: Option<u64>,
}

/// Running totals over every processed event.
#[derive(Clone, Debug, Default)]
pub(crate) struct Tally {
    step: u64,
    rigs: BTreeMap<RigId, RigTally>,
    rejected: Vec<RigId>,
}

impl Tally {
    /// Folds a batch of events into the totals.
    pub(crate) fn record(&mut self, events: &[Event]) {
        for event in events {
            self.record_one(event);
        }
    }

    /// Reports whether every tracked rig has finished.
    pub(crate) fn all_finished(&self) -> bool {
        !self.rigs.is_empty() && self.rigs.values().all(|rig| rig.finished_at.is_some())
    }

    /// Produces the serialisable report.
    pub(crate) fn into_report(self, seed: u64, view: RigView) -> Report {
        Report {
            seed,
            steps: self.step,
            rejected: self.rejected,
            rigs: self.rigs,
            final_state: view,
        }
    }

    fn rig(&mut self, rig: RigId) -> &mut RigTally {
        self.rigs.entry(rig).or_default()
    }

    fn record_one(&mut self, event: &Event) {
        match event {
            Event::TimeAdvanced { step } => self.step = *step,
            Event::RigPlaced { rig, .. } | Event::RigActivated { rig } => {
                let _ = self.rig(*rig);
            }
            Event::RigPlacementRejected { rig, .. } => self.rejected.push(*rig),
            Event::RigRemoved { rig } => {
                let _ = self.rigs.remove(rig);
            }
            Event::CellRemoved { rig, records, .. } => {
                let units: u64 = records.iter().map(|record| u64::from(record.quantity)).sum();
                let tally = self.rig(*rig);
                tally.cells_removed += 1;
                tally.units_harvested += units;
            }
            Event::LayerCompleted { rig, .. } => self.rig(*rig).layers_completed += 1,
            Event::FinalSweepStarted { rig, .. } => self.rig(*rig).final_sweeps += 1,
            Event::TargetUnreachable { rig, .. } => self.rig(*rig).unreachable_targets += 1,
            Event::TargetRecovered { rig, .. } => self.rig(*rig).recoveries += 1,
            Event::RigIdled { rig } => self.rig(*rig).idles += 1,
            Event::StateTimedOut { rig, .. } => self.rig(*rig).timeouts += 1,
            Event::RemovalDeferred { rig, reason } => {
                let tally = self.rig(*rig);
                match reason {
                    DeferralReason::PhaseGate => tally.deferred_phase += 1,
                    DeferralReason::NoTokens => tally.deferred_tokens += 1,
                    DeferralReason::OutputFull => tally.deferred_output += 1,
                }
            }
            Event::PowerLost { rig } => self.rig(*rig).power_losses += 1,
            Event::MaterialsFlushed {
                rig,
                moved,
                ejected,
            } => {
                let tally = self.rig(*rig);
                tally.records_moved += u64::from(*moved);
                tally.records_ejected += u64::from(*ejected);
            }
            Event::Finished { rig } => {
                let step = self.step;
                self.rig(*rig).finished_at = Some(step);
            }
            Event::MovementChanged { .. }
            | Event::TargetAssigned { .. }
            | Event::PowerRestored { .. } => {}
        }
    }
}

/// Summary written at the end of a run.
#[derive(Debug, Serialize)]
pub(crate) struct Report {
    seed: u64,
    steps: u64,
    rejected: Vec<RigId>,
    rigs: BTreeMap<RigId, RigTally>,
    final_state: RigView,
}
