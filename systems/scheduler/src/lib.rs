#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! World-wide tick budget shared by every rig.
//!
//! At the start of each simulation step the scheduler folds the measured
//! step duration into a rolling window, scales the removal token budget by
//! how far the mean runs over the target, and spreads active rigs across
//! phases so only a fraction of them may remove cells in any given step.

use std::{collections::VecDeque, time::Duration};

use quarry_rig_core::{RigId, SchedulerTuning};
use sha2::{Digest, Sha256};
use tracing::trace;

const PHASE_SLOT_LABEL: &str = "quarry-rig:phase-slot";

/// Shared per-world scheduler state.
#[derive(Clone, Debug)]
pub struct TickScheduler {
    tuning: SchedulerTuning,
    tokens: u32,
    phase_count: u32,
    active_this_step: u32,
    active_last_step: u32,
    last_step_id: Option<u64>,
    current_step: u64,
    samples: VecDeque<Duration>,
}

impl TickScheduler {
    /// Creates a scheduler with a full budget and a single phase.
    #[must_use]
    pub fn new(tuning: SchedulerTuning) -> Self {
        Self {
            tokens: tuning.base_tokens,
            phase_count: 1,
            active_this_step: 0,
            active_last_step: 0,
            last_step_id: None,
            current_step: 0,
            samples: VecDeque::with_capacity(tuning.window.max(1)),
            tuning,
        }
    }

    /// Tuning the scheduler was created with.
    #[must_use]
    pub const fn tuning(&self) -> &SchedulerTuning {
        &self.tuning
    }

    /// Removal tokens left for the current step.
    #[must_use]
    pub const fn tokens(&self) -> u32 {
        self.tokens
    }

    /// Number of phases active rigs are spread across.
    #[must_use]
    pub const fn phase_count(&self) -> u32 {
        self.phase_count
    }

    /// Rigs that registered as working during the current step.
    #[must_use]
    pub const fn active_this_step(&self) -> u32 {
        self.active_this_step
    }

    /// Rigs that registered as working during the previous step.
    #[must_use]
    pub const fn active_last_step(&self) -> u32 {
        self.active_last_step
    }

    /// Identifier of the step currently being executed.
    #[must_use]
    pub const fn current_step(&self) -> u64 {
        self.current_step
    }

    /// Mean of the measured step durations in the window.
    #[must_use]
    pub fn mean_step(&self) -> Option<Duration> {
        let count = u32::try_from(self.samples.len()).ok().filter(|count| *count > 0)?;
        let total: Duration = self.samples.iter().sum();
        Some(total / count)
    }

    /// Opens a new step.
    ///
    /// Calling this again with the same `step_id` has no effect. Returns
    /// `true` when the step was opened by this call.
    pub fn begin_step(&mut self, step_id: u64, measured: Duration) -> bool {
        if self.last_step_id == Some(step_id) {
            return false;
        }
        self.last_step_id = Some(step_id);
        self.current_step = step_id;

        self.samples.push_back(measured);
        while self.samples.len() > self.tuning.window.max(1) {
            let _ = self.samples.pop_front();
        }

        let factor = self.load_factor();
        let scaled = (f64::from(self.tuning.base_tokens) * factor).floor();
        self.tokens = (scaled as u32).max(self.tuning.min_tokens);

        self.active_last_step = self.active_this_step;
        self.active_this_step = 0;
        let per_phase = self.tuning.rigs_per_phase.max(1);
        self.phase_count = self
            .active_last_step
            .div_ceil(per_phase)
            .clamp(1, self.tuning.max_phases.max(1));

        trace!(
            step = step_id,
            tokens = self.tokens,
            phases = self.phase_count,
            factor,
            "scheduler step opened"
        );
        true
    }

    /// Reports whether the provided phase slot may remove cells this step.
    #[must_use]
    pub fn is_phase_open(&self, slot: u64) -> bool {
        let phases = u64::from(self.phase_count.max(1));
        slot % phases == self.current_step % phases
    }

    /// Takes one removal token from the shared budget.
    ///
    /// Returns `false` when the budget for this step is exhausted.
    pub fn try_consume_token(&mut self) -> bool {
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }

    /// Counts a rig as working during the current step.
    pub fn register_active(&mut self) {
        self.active_this_step = self.active_this_step.saturating_add(1);
    }

    fn load_factor(&self) -> f64 {
        let target = self.tuning.target_step().as_micros() as f64;
        let Some(mean) = self.mean_step() else {
            return 1.0;
        };
        if target <= 0.0 {
            return 1.0;
        }
        let mean = mean.as_micros() as f64;
        (1.0 - (mean - target) / target).clamp(0.0, 1.0)
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new(SchedulerTuning::default())
    }
}

/// Stable phase slot of a rig, independent of process and platform.
#[must_use]
pub fn phase_slot(rig: RigId) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(PHASE_SLOT_LABEL.as_bytes());
    hasher.update(rig.get().to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn micros(value: u64) -> Duration {
        Duration::from_micros(value)
    }

    #[test]
    fn on_time_steps_grant_full_budget() {
        let mut scheduler = TickScheduler::default();
        assert!(scheduler.begin_step(1, micros(10_000)));
        assert_eq!(scheduler.tokens(), 8);
        assert_eq!(scheduler.phase_count(), 1);
    }

    #[test]
    fn slow_steps_shrink_budget_down_to_minimum() {
        let mut scheduler = TickScheduler::default();
        assert!(scheduler.begin_step(1, micros(37_500)));
        assert_eq!(scheduler.tokens(), 4);

        let mut starved = TickScheduler::default();
        assert!(starved.begin_step(1, micros(100_000)));
        assert_eq!(starved.tokens(), 1);
    }

    #[test]
    fn begin_step_is_idempotent_per_step() {
        let mut scheduler = TickScheduler::default();
        assert!(scheduler.begin_step(3, micros(25_000)));
        assert!(scheduler.try_consume_token());
        assert!(!scheduler.begin_step(3, micros(25_000)));
        assert_eq!(scheduler.tokens(), 7);
        assert_eq!(scheduler.mean_step(), Some(micros(25_000)));
    }

    #[test]
    fn window_keeps_most_recent_samples() {
        let tuning = SchedulerTuning {
            window: 2,
            ..SchedulerTuning::default()
        };
        let mut scheduler = TickScheduler::new(tuning);
        let _ = scheduler.begin_step(1, micros(90_000));
        let _ = scheduler.begin_step(2, micros(20_000));
        let _ = scheduler.begin_step(3, micros(30_000));
        assert_eq!(scheduler.mean_step(), Some(micros(25_000)));
        assert_eq!(scheduler.tokens(), 8);
    }

    #[test]
    fn phases_follow_previous_activity() {
        let mut scheduler = TickScheduler::default();
        let _ = scheduler.begin_step(1, micros(0));
        for _ in 0..9 {
            scheduler.register_active();
        }
        let _ = scheduler.begin_step(2, micros(0));
        assert_eq!(scheduler.active_last_step(), 9);
        assert_eq!(scheduler.active_this_step(), 0);
        assert_eq!(scheduler.phase_count(), 3);

        let open = (0..3_u64).filter(|slot| scheduler.is_phase_open(*slot)).count();
        assert_eq!(open, 1);
        assert!(scheduler.is_phase_open(2));

        for _ in 0..100 {
            scheduler.register_active();
        }
        let _ = scheduler.begin_step(3, micros(0));
        assert_eq!(scheduler.phase_count(), 8);
    }

    #[test]
    fn phase_slot_is_stable() {
        assert_eq!(phase_slot(RigId::new(4)), phase_slot(RigId::new(4)));
        assert_ne!(phase_slot(RigId::new(4)), phase_slot(RigId::new(5)));
    }
}
