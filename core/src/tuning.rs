//! Tuning knobs shared by the rig systems.
//!
//! Every section deserialises with `#[serde(default)]`, so configuration
//! files only need to mention the values they override.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Aggregated tuning surface for a world full of rigs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigTuning {
    /// Obstacle detection and clearance.
    pub obstacles: ObstacleTuning,
    /// Tool head motion rates and failsafes.
    pub motion: MotionTuning,
    /// Power-to-speed mapping.
    pub speed: SpeedTuning,
    /// World-wide load shedding.
    pub scheduler: SchedulerTuning,
    /// Output queue sizing.
    pub output: OutputTuning,
    /// Excavation and target recovery.
    pub mining: MiningTuning,
}

/// Obstacle scanner constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleTuning {
    /// Height of the zone below the ceiling that marks a column as sealed.
    pub guard_height: u32,
    /// Cells added on top of the highest obstacle when computing a lift:
    /// one for the obstacle itself, one for the tool head and one spare.
    pub clearance_margin: u32,
}

impl Default for ObstacleTuning {
    fn default() -> Self {
        Self {
            guard_height: 2,
            clearance_margin: 3,
        }
    }
}

/// Tool head motion constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionTuning {
    /// Horizontal distance covered per step at a speed multiplier of one.
    pub base_step: f32,
    /// Fraction of the horizontal step used for vertical motion.
    pub vertical_ratio: f32,
    /// Distance from a cell centre considered "centred".
    pub centering_tolerance: f32,
    /// Steps a state may persist before it is forced back to scanning.
    pub max_ticks_per_state: u32,
    /// Steps between unconditional path recomputations.
    pub repath_cooldown: u32,
}

impl Default for MotionTuning {
    fn default() -> Self {
        Self {
            base_step: 0.25,
            vertical_ratio: 1.0 / 3.0,
            centering_tolerance: 0.01,
            max_ticks_per_state: 600,
            repath_cooldown: 40,
        }
    }
}

/// Power inflow tiers and speed ramp rates.
///
/// Inflow below `crawl_inflow` interpolates from standstill to
/// `crawl_speed`; each further tier interpolates between its neighbours until
/// `max_inflow`, beyond which the target saturates at `max_speed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTuning {
    /// Energy drained from the power source every step.
    pub drain_per_step: f64,
    /// Inflow at which the crawl tier ends.
    pub crawl_inflow: f64,
    /// Inflow at which the normal tier ends.
    pub normal_inflow: f64,
    /// Inflow at which the fast tier ends.
    pub fast_inflow: f64,
    /// Inflow at which the target speed saturates.
    pub max_inflow: f64,
    /// Speed reached at the top of the crawl tier.
    pub crawl_speed: f32,
    /// Speed reached at the top of the normal tier.
    pub normal_speed: f32,
    /// Speed reached at the top of the fast tier.
    pub fast_speed: f32,
    /// Saturated speed multiplier.
    pub max_speed: f32,
    /// Acceleration applied regardless of the target.
    pub accel_floor: f32,
    /// Additional acceleration at the saturated target speed.
    pub accel_gain: f32,
    /// Speed below which acceleration is damped.
    pub standstill_threshold: f32,
    /// Multiplier applied to acceleration below the standstill threshold.
    pub standstill_damping: f32,
    /// Fixed deceleration per step.
    pub decel_rate: f32,
}

impl Default for SpeedTuning {
    fn default() -> Self {
        Self {
            drain_per_step: 10.0,
            crawl_inflow: 5.0,
            normal_inflow: 20.0,
            fast_inflow: 60.0,
            max_inflow: 160.0,
            crawl_speed: 0.25,
            normal_speed: 1.0,
            fast_speed: 2.0,
            max_speed: 3.0,
            accel_floor: 0.01,
            accel_gain: 0.04,
            standstill_threshold: 0.1,
            standstill_damping: 0.5,
            decel_rate: 0.15,
        }
    }
}

/// World-wide scheduler constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerTuning {
    /// Removal tokens granted per step when the simulation runs on time.
    pub base_tokens: u32,
    /// Tokens granted no matter how slow the simulation runs.
    pub min_tokens: u32,
    /// Step duration the simulation aims for, in microseconds.
    pub target_step_micros: u64,
    /// Number of measured step durations averaged.
    pub window: usize,
    /// Active rigs that may share a single phase.
    pub rigs_per_phase: u32,
    /// Upper bound on the phase count.
    pub max_phases: u32,
}

impl SchedulerTuning {
    /// Target step duration as a [`Duration`].
    #[must_use]
    pub const fn target_step(&self) -> Duration {
        Duration::from_micros(self.target_step_micros)
    }
}

impl Default for SchedulerTuning {
    fn default() -> Self {
        Self {
            base_tokens: 8,
            min_tokens: 1,
            target_step_micros: 25_000,
            window: 20,
            rigs_per_phase: 4,
            max_phases: 8,
        }
    }
}

/// Output queue constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputTuning {
    /// Records a rig may hold before removals are deferred.
    pub capacity: usize,
    /// Records offered downstream per step.
    pub flush_batch: usize,
}

impl Default for OutputTuning {
    fn default() -> Self {
        Self {
            capacity: 64,
            flush_batch: 4,
        }
    }
}

/// Excavation and recovery constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningTuning {
    /// Steps of work a single cell needs before it can be removed.
    pub removal_stages: u32,
    /// Steps an unreachable cell stays excluded from target selection.
    pub temp_skip_steps: u64,
    /// Raster candidates probed for reachability during recovery.
    pub recovery_probe_limit: usize,
    /// Ring-search candidates probed for reachability during recovery.
    pub ring_probe_limit: usize,
    /// Whether each layer ends with a completeness sweep.
    pub final_sweep: bool,
}

impl Default for MiningTuning {
    fn default() -> Self {
        Self {
            removal_stages: 4,
            temp_skip_steps: 200,
            recovery_probe_limit: 8,
            ring_probe_limit: 64,
            final_sweep: true,
        }
    }
}
