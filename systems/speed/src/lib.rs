#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Power-to-speed controller for a rig's tool head.
//!
//! Every step the controller derives the power inflow from the change in
//! stored energy, maps it through tiered linear curves onto a target speed
//! multiplier and then chases that target: slowly and power-dependent when
//! accelerating, quickly and at a fixed rate when braking.

use quarry_rig_core::SpeedTuning;
use serde::{Deserialize, Serialize};

/// Speed multiplier state of a single rig.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedController {
    current: f32,
    target: f32,
    last_stored: Option<f64>,
}

impl SpeedController {
    /// Creates a controller at standstill.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Speed multiplier applied to motion this step.
    #[must_use]
    pub const fn current(&self) -> f32 {
        self.current
    }

    /// Speed multiplier the controller is ramping toward.
    #[must_use]
    pub const fn target(&self) -> f32 {
        self.target
    }

    /// Stored energy observed on the previous update.
    #[must_use]
    pub const fn last_stored(&self) -> Option<f64> {
        self.last_stored
    }

    /// Observes the stored energy for this step and updates the speed.
    ///
    /// Returns the new current multiplier.
    pub fn update(&mut self, stored: f64, tuning: &SpeedTuning) -> f32 {
        let inflow = self.observe_inflow(stored, tuning.drain_per_step);
        self.target = target_speed(inflow, tuning);
        self.step_toward(self.target, tuning)
    }

    /// Moves the current speed one step toward `target` without overshoot.
    pub fn step_toward(&mut self, target: f32, tuning: &SpeedTuning) -> f32 {
        self.target = target;
        if self.current < target {
            let mut accel = base_accel(target, tuning);
            if self.current < tuning.standstill_threshold {
                accel *= tuning.standstill_damping;
            }
            self.current = (self.current + accel).min(target);
        } else if self.current > target {
            self.current = (self.current - tuning.decel_rate).max(target);
        }
        self.current
    }

    /// Drops to standstill immediately, as on a power outage.
    pub fn halt(&mut self) {
        self.current = 0.0;
        self.target = 0.0;
    }

    fn observe_inflow(&mut self, stored: f64, drain: f64) -> f64 {
        let inflow = match self.last_stored {
            Some(previous) => (stored - previous + drain).max(0.0),
            None => 0.0,
        };
        self.last_stored = Some(stored);
        inflow
    }
}

/// Maps a power inflow per step onto a target speed multiplier.
#[must_use]
pub fn target_speed(inflow: f64, tuning: &SpeedTuning) -> f32 {
    if inflow <= 0.0 {
        return 0.0;
    }

    let tiers = [
        (0.0, 0.0),
        (tuning.crawl_inflow, tuning.crawl_speed),
        (tuning.normal_inflow, tuning.normal_speed),
        (tuning.fast_inflow, tuning.fast_speed),
        (tuning.max_inflow, tuning.max_speed),
    ];

    for pair in tiers.windows(2) {
        let [(low_inflow, low_speed), (high_inflow, high_speed)] = pair else {
            continue;
        };
        if inflow <= *high_inflow {
            let span = high_inflow - low_inflow;
            if span <= 0.0 {
                return *high_speed;
            }
            let t = ((inflow - low_inflow) / span) as f32;
            return low_speed + (high_speed - low_speed) * t;
        }
    }

    tuning.max_speed
}

/// Acceleration per step when ramping toward `target`.
///
/// More available power means a higher target and therefore a faster ramp.
#[must_use]
pub fn base_accel(target: f32, tuning: &SpeedTuning) -> f32 {
    if tuning.max_speed <= 0.0 {
        return tuning.accel_floor;
    }
    tuning.accel_floor + tuning.accel_gain * (target / tuning.max_speed).clamp(0.0, 1.0)
}
