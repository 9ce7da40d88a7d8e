//! Runtime configuration for the motion core.
//!
//! These are the in-memory structs used by `SensorFusion`, `MotionController`
//! and `EnduranceTest`. They are separate from the TOML-deserialized schema in
//! `agsa_config`.

use std::path::PathBuf;

/// Sensor fusion constants.
///
/// The fine sensor completes several revolutions over the full gap travel;
/// the coarse sensor roughly one, rotating in the opposite sense.
#[derive(Debug, Clone)]
pub struct FusionCfg {
    /// Fine-sensor revolutions per revolution of the reconciled angle.
    pub fine_gear_ratio: f64,
    /// Scale applied to the (sense-inverted) coarse angle.
    pub coarse_gear_ratio: f64,
    /// Acceptance window for wrap reconciliation, tenths of a degree.
    pub accept_window_10th: i32,
}

impl Default for FusionCfg {
    fn default() -> Self {
        Self {
            fine_gear_ratio: 6.06,
            coarse_gear_ratio: 1.02,
            accept_window_10th: 100,
        }
    }
}

/// Motion controller configuration (frequencies, watchdogs, tolerances).
#[derive(Debug, Clone)]
pub struct MotionCfg {
    /// Ramp start frequency (steps per second).
    pub start_freq: u32,
    /// Full seek frequency (steps per second).
    pub run_freq: u32,
    /// Reduced step rate near the target to avoid overshoot.
    pub approach_freq: u32,
    /// Ramp length handed to the driver on every start.
    pub ramp_steps: u32,
    /// Microsteps per device unit, used for open-loop step estimates and by
    /// the simulator for its travel rate. The default pairs with `run_freq`
    /// so a full 0..=800 sweep lands inside `absolute_timeout_ms`.
    pub microsteps_per_unit: i32,
    /// "Close enough" window around the target when the motor self-stops.
    pub target_tolerance: i32,
    /// Use the raw gap instead of the fused gap when they diverge by more
    /// than this (guards against fused-filter lag).
    pub noise_guard: i32,
    /// A progress tick with |Δgap| at or below this counts as no progress.
    pub progress_epsilon: i32,
    /// Non-progress ticks tolerated at full/seek speed before Blockage.
    pub blockage_limit_run: u32,
    /// Non-progress ticks tolerated at approach speed before Blockage.
    pub blockage_limit_approach: u32,
    /// Progress/blockage check period in milliseconds.
    pub progress_interval_ms: u64,
    /// Absolute one-shot watchdog in milliseconds.
    pub absolute_timeout_ms: u64,
    /// Test-mode flag: count non-progress ticks but never raise Blockage.
    pub suppress_blockage: bool,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            start_freq: 200,
            run_freq: 1600,
            approach_freq: 400,
            ramp_steps: 50,
            microsteps_per_unit: 20,
            target_tolerance: 2,
            noise_guard: 20,
            progress_epsilon: 10,
            blockage_limit_run: 3,
            blockage_limit_approach: 30,
            progress_interval_ms: 400,
            absolute_timeout_ms: 15_000,
            suppress_blockage: false,
        }
    }
}

/// Endurance test configuration.
#[derive(Debug, Clone)]
pub struct EnduranceCfg {
    /// Manual mode: gap the cycle starts from.
    pub manual_start_gap: i32,
    /// Manual mode: gap the cycle moves out to.
    pub manual_stop_gap: i32,
    /// Manual mode: cycles per run.
    pub manual_cycles: u32,
    /// Steps test: microsteps per leg.
    pub steps_test_steps: u32,
    /// Steps test: forward/backward cycles per run.
    pub steps_test_cycles: u32,
    /// Cycles per intermediate stress step.
    pub stress_cycles: u32,
    /// Ramp start frequency for open-loop steps-test legs.
    pub start_freq: u32,
    /// Run frequency for open-loop steps-test legs; also logged metadata.
    pub run_freq: u32,
    /// Approach frequency, logged metadata only.
    pub approach_freq: u32,
    /// Fixed harness watchdog interval for Manual/Stress, milliseconds.
    pub watchdog_fixed_ms: u64,
    /// Consecutive failures tolerated before the whole test aborts.
    pub abort_limit: u32,
    /// Device serial, embedded in log filenames and headers.
    pub device_serial: String,
    /// Directory for the live CSV log.
    pub log_dir: PathBuf,
    /// Directory rotated logs are archived into.
    pub archive_dir: PathBuf,
    /// Rotation threshold in bytes.
    pub max_log_bytes: u64,
    /// Archived files kept (most recently modified first).
    pub max_archives: usize,
}

impl Default for EnduranceCfg {
    fn default() -> Self {
        Self {
            manual_start_gap: 0,
            manual_stop_gap: 800,
            manual_cycles: 100,
            steps_test_steps: 4_000,
            steps_test_cycles: 100,
            stress_cycles: 200,
            start_freq: 200,
            run_freq: 1600,
            approach_freq: 400,
            watchdog_fixed_ms: 30_000,
            abort_limit: 10,
            device_serial: String::from("unknown"),
            log_dir: PathBuf::from("agsa_logs"),
            archive_dir: PathBuf::from("agsa_logs/archive"),
            max_log_bytes: 5_000_000,
            max_archives: 100,
        }
    }
}

impl EnduranceCfg {
    /// Harness watchdog interval for the steps test: twice the nominal leg
    /// duration, `2 * steps / run_freq` seconds, in milliseconds.
    pub fn steps_watchdog_ms(&self) -> u64 {
        let freq = u64::from(self.run_freq.max(1));
        u64::from(self.steps_test_steps)
            .saturating_mul(2_000)
            .saturating_div(freq)
            .max(1)
    }
}
