//! Closed-loop/open-loop motion controller for the grinding-gap actuator.
//!
//! Single-threaded and timer-driven: all state transitions happen inside
//! `update()` or a command entry point, never concurrently. The controller
//! knows nothing about the endurance harness; observers drain `MotionEvent`s
//! from `update()` (or `take_events()`) instead.

use std::sync::Arc;
use std::time::Duration;

use agsa_traits::clock::{Clock, MonotonicClock};
use agsa_traits::{AngleSensor, MotorDriver};
use eyre::WrapErr;

use crate::config::{FusionCfg, MotionCfg};
use crate::error::{BuildError, FailureKind, Result, map_hw_error};
use crate::fusion::{GAP_MAX, SensorFusion};
use crate::scheduler::TimerSet;

/// Distance at or below which the approach frequency is used.
const APPROACH_BAND: i32 = 20;
/// Distance at or below which the half-run frequency is used.
const HALF_SPEED_BAND: i32 = 40;

/// Current intent of the controller; mutated only by command entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovingMode {
    #[default]
    Idle,
    MoveToDdd,
    MoveSteps,
}

/// Three independent sticky failure flags.
///
/// Set by watchdog/sensor logic; cleared only when a new motion command is
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureFlags {
    pub timeout: bool,
    pub blockage: bool,
    pub no_sensor: bool,
}

impl FailureFlags {
    pub fn any(self) -> bool {
        self.timeout || self.blockage || self.no_sensor
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn contains(self, kind: FailureKind) -> bool {
        match kind {
            FailureKind::Timeout => self.timeout,
            FailureKind::Blockage => self.blockage,
            FailureKind::NoSensor => self.no_sensor,
        }
    }

    fn set(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Timeout => self.timeout = true,
            FailureKind::Blockage => self.blockage = true,
            FailureKind::NoSensor => self.no_sensor = true,
        }
    }
}

/// Observable controller output, drained by the caller each update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEvent {
    /// A motion command started the motor.
    Started,
    /// The motor came to rest without failure (goal reached or commanded stop).
    Stopped,
    /// A failure flag transitioned to set; the motor has been stopped.
    Failed(FailureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MotionTimer {
    /// Periodic progress/blockage check.
    Progress,
    /// One-shot absolute timeout per watchdog-guarded command.
    Absolute,
}

pub struct MotionController<F: AngleSensor, C: AngleSensor, M: MotorDriver> {
    fusion: SensorFusion<F, C>,
    motor: M,
    cfg: MotionCfg,
    clock: Arc<dyn Clock + Send + Sync>,

    mode: MovingMode,
    flags: FailureFlags,
    target: i32,
    /// Gap at the start of the current seek attempt (or last progress tick).
    baseline: i32,
    blockage_count: u32,
    /// Whether the current attempt runs at approach speed (longer blockage
    /// tolerance on the slow final approach).
    approach_active: bool,
    seek_reverse: bool,
    seek_freq: u32,
    timers: TimerSet<MotionTimer>,
    pending: Vec<MotionEvent>,
}

impl<F: AngleSensor, C: AngleSensor, M: MotorDriver> MotionController<F, C, M> {
    pub fn builder() -> MotionControllerBuilder<F, C, M> {
        MotionControllerBuilder::default()
    }

    /// Open-loop move of `steps` microsteps (sign selects direction).
    ///
    /// Clears all failure flags. With the sensor pair failed and failure not
    /// ignored, sets NoSensor and returns without moving.
    pub fn move_steps(
        &mut self,
        steps: i32,
        start_freq: u32,
        run_freq: u32,
        ignore_sensor_failure: bool,
        suppress_watchdog: bool,
    ) -> Result<()> {
        self.flags.clear();
        if self.fusion.is_failed() && !ignore_sensor_failure {
            self.apply_failure(FailureKind::NoSensor);
            return Ok(());
        }
        if steps == 0 {
            return Ok(());
        }

        self.mode = MovingMode::MoveSteps;
        self.baseline = self.fusion.ddd_value();
        self.blockage_count = 0;
        self.approach_active = false;
        self.motor
            .start_steps(
                steps < 0,
                steps.unsigned_abs(),
                start_freq,
                run_freq,
                self.cfg.ramp_steps,
            )
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("starting open-loop move")?;
        tracing::debug!(steps, start_freq, run_freq, "open-loop move started");
        if !suppress_watchdog {
            self.arm_watchdogs();
        }
        self.pending.push(MotionEvent::Started);
        Ok(())
    }

    /// Closed-loop seek to `target` device units.
    ///
    /// A target the mechanism already sits at reports `Stopped` right away,
    /// so callers sequencing on the completion event (the endurance harness,
    /// the CLI run loop) never wait on a move that was never needed.
    pub fn move_to_ddd_value(&mut self, target: i32) -> Result<()> {
        let target = target.clamp(0, GAP_MAX);
        self.target = target;
        self.flags.clear();
        if self.fusion.is_failed() {
            self.apply_failure(FailureKind::NoSensor);
            return Ok(());
        }
        if self.fusion.ddd_value() == target {
            self.pending.push(MotionEvent::Stopped);
            return Ok(());
        }

        self.mode = MovingMode::MoveToDdd;
        self.enter_seek()?;
        if self.mode == MovingMode::MoveToDdd && !self.flags.any() {
            self.arm_watchdogs();
            self.pending.push(MotionEvent::Started);
        }
        Ok(())
    }

    /// Open-loop estimate of the move to `target`, delegated to `move_steps`.
    pub fn move_steps_to_ddd_value(&mut self, target: i32) -> Result<()> {
        let target = target.clamp(0, GAP_MAX);
        let steps = (target - self.fusion.ddd_value()).saturating_mul(self.cfg.microsteps_per_unit);
        self.move_steps(steps, self.cfg.start_freq, self.cfg.run_freq, false, false)
    }

    /// Raise the stored target by one unit (clamped). While the motor runs
    /// only the stored target changes: a seek picks it up on its next tick,
    /// an open-loop move is left alone. An idle controller starts moving.
    pub fn increment_target(&mut self) -> Result<()> {
        let target = (self.target + 1).min(GAP_MAX);
        if self.motor.is_running() {
            self.target = target;
            Ok(())
        } else {
            self.move_to_ddd_value(target)
        }
    }

    /// Lower the stored target by one unit (clamped).
    pub fn decrement_target(&mut self) -> Result<()> {
        let target = (self.target - 1).max(0);
        if self.motor.is_running() {
            self.target = target;
            Ok(())
        } else {
            self.move_to_ddd_value(target)
        }
    }

    /// Stop everything. Safe and idempotent from any state: disarms all
    /// timers and unconditionally issues a motor stop, even if the motor is
    /// believed already stopped.
    pub fn stop(&mut self) {
        self.timers.disarm_all();
        if let Err(e) = self.motor.stop() {
            tracing::warn!(error = %e, "motor stop failed");
        }
        if self.mode != MovingMode::Idle {
            self.mode = MovingMode::Idle;
            self.pending.push(MotionEvent::Stopped);
        }
    }

    /// The single dispatch entry: drains due timers, runs the sensor-loss
    /// check, detects a self-stopped motor, and returns the resulting events.
    ///
    /// Call once per sensor-update tick. Not reentrant; callers serialize.
    pub fn update(&mut self) -> Vec<MotionEvent> {
        // Sensor pair dropping out while actuating is a failure in its own
        // right, independent of the watchdogs.
        if self.mode != MovingMode::Idle && self.motor.is_running() && self.fusion.is_failed() {
            self.apply_failure(FailureKind::NoSensor);
        }

        // A closed-loop seek reaching its target exactly stops there; drivers
        // that stop on their own are covered by the tolerance check below.
        if self.mode == MovingMode::MoveToDdd
            && !self.flags.any()
            && self.motor.is_running()
            && self.working_gap() == self.target
        {
            if let Err(e) = self.motor.stop() {
                tracing::warn!(error = %e, "motor stop failed on arrival");
            }
            self.finish_stopped();
        }

        if self.mode != MovingMode::Idle && !self.flags.any() && !self.motor.is_running() {
            self.on_motor_stopped();
        }

        let now = self.clock.now();
        for token in self.timers.take_due(now) {
            match token {
                MotionTimer::Absolute => self.apply_failure(FailureKind::Timeout),
                MotionTimer::Progress => {
                    self.on_progress_tick();
                    if self.mode != MovingMode::Idle {
                        self.timers.arm(
                            MotionTimer::Progress,
                            Duration::from_millis(self.cfg.progress_interval_ms),
                            now,
                        );
                    }
                }
            }
        }

        self.take_events()
    }

    /// Drain events produced since the last call.
    pub fn take_events(&mut self) -> Vec<MotionEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_failed(&self) -> bool {
        self.flags.any()
    }

    pub fn flags(&self) -> FailureFlags {
        self.flags
    }

    pub fn mode(&self) -> MovingMode {
        self.mode
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    pub fn fusion(&self) -> &SensorFusion<F, C> {
        &self.fusion
    }

    pub fn fusion_mut(&mut self) -> &mut SensorFusion<F, C> {
        &mut self.fusion
    }

    // ── Private: seek and watchdog logic ─────────────────────────────────────

    /// Gap used for seek decisions: the fused value, unless it diverges from
    /// the raw value by more than the noise guard (fused-filter lag).
    fn working_gap(&self) -> i32 {
        let fused = self.fusion.ddd_value();
        let raw = self.fusion.raw_ddd_value();
        if (fused - raw).abs() > self.cfg.noise_guard {
            raw
        } else {
            fused
        }
    }

    /// Run frequency by distance to target; the bool marks approach speed.
    fn select_frequency(&self, distance: i32) -> (u32, bool) {
        if distance <= APPROACH_BAND {
            (self.cfg.approach_freq, true)
        } else if distance <= HALF_SPEED_BAND {
            (self.cfg.approach_freq.max(self.cfg.run_freq / 2), false)
        } else {
            (self.cfg.run_freq, false)
        }
    }

    /// Start (or restart) the closed-loop seek toward the stored target.
    fn enter_seek(&mut self) -> Result<()> {
        if self.fusion.is_failed() {
            self.apply_failure(FailureKind::NoSensor);
            return Ok(());
        }

        let current = self.working_gap();
        let distance = (current - self.target).abs();
        if distance == 0 {
            return Ok(());
        }
        let reverse = current > self.target;
        let (freq, approach) = self.select_frequency(distance);

        self.baseline = current;
        self.blockage_count = 0;
        self.approach_active = approach;
        self.seek_reverse = reverse;
        self.seek_freq = freq;
        self.motor
            .start(reverse, self.cfg.start_freq, freq, self.cfg.ramp_steps)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("starting closed-loop seek")?;
        tracing::debug!(current, target = self.target, reverse, freq, "seek started");
        Ok(())
    }

    fn arm_watchdogs(&mut self) {
        let now = self.clock.now();
        self.timers.arm(
            MotionTimer::Progress,
            Duration::from_millis(self.cfg.progress_interval_ms),
            now,
        );
        self.timers.arm(
            MotionTimer::Absolute,
            Duration::from_millis(self.cfg.absolute_timeout_ms),
            now,
        );
    }

    /// Periodic progress check: re-evaluate the seek and count non-progress.
    fn on_progress_tick(&mut self) {
        if self.mode == MovingMode::Idle || self.flags.any() {
            return;
        }

        // Closed-loop re-evaluation: a reversal (overshoot or target change)
        // or a frequency band change restarts the seek attempt.
        if self.mode == MovingMode::MoveToDdd && self.motor.is_running() {
            let current = self.working_gap();
            let distance = (current - self.target).abs();
            if distance > 0 {
                let reverse = current > self.target;
                let (freq, _) = self.select_frequency(distance);
                if reverse != self.seek_reverse || freq != self.seek_freq {
                    if let Err(e) = self.motor.stop() {
                        tracing::warn!(error = %e, "motor stop failed on seek re-entry");
                    }
                    if let Err(e) = self.enter_seek() {
                        tracing::warn!(error = %e, "seek re-entry failed");
                    }
                    return;
                }
            }
        }

        let gap = self.fusion.ddd_value();
        if (gap - self.baseline).abs() <= self.cfg.progress_epsilon {
            self.blockage_count += 1;
            let limit = if self.approach_active {
                self.cfg.blockage_limit_approach
            } else {
                self.cfg.blockage_limit_run
            };
            if self.blockage_count > limit && !self.cfg.suppress_blockage {
                self.apply_failure(FailureKind::Blockage);
            }
        } else {
            self.blockage_count = 0;
            self.baseline = gap;
        }
    }

    /// The motor came to rest on its own.
    fn on_motor_stopped(&mut self) {
        match self.mode {
            MovingMode::MoveToDdd => {
                let gap = self.working_gap();
                if (gap - self.target).abs() <= self.cfg.target_tolerance {
                    self.finish_stopped();
                } else if let Err(e) = self.enter_seek() {
                    tracing::warn!(error = %e, "seek restart failed");
                }
            }
            MovingMode::MoveSteps => self.finish_stopped(),
            MovingMode::Idle => {}
        }
    }

    fn finish_stopped(&mut self) {
        self.timers.disarm_all();
        self.mode = MovingMode::Idle;
        self.pending.push(MotionEvent::Stopped);
        tracing::debug!(gap = self.fusion.ddd_value(), "motion finished");
    }

    /// Set a failure flag and perform the stop/notify side effect exactly
    /// once per flag transition.
    fn apply_failure(&mut self, kind: FailureKind) {
        if self.flags.contains(kind) {
            return;
        }
        self.flags.set(kind);
        self.timers.disarm_all();
        if let Err(e) = self.motor.stop() {
            tracing::warn!(error = %e, failure = %kind, "motor stop failed on failure");
        }
        self.mode = MovingMode::Idle;
        self.pending.push(MotionEvent::Failed(kind));
        tracing::warn!(failure = %kind, "motion failure");
    }
}

/// Builder for `MotionController`; all fields validated on `build()`.
pub struct MotionControllerBuilder<F: AngleSensor, C: AngleSensor, M: MotorDriver> {
    fine: Option<F>,
    coarse: Option<C>,
    motor: Option<M>,
    fusion_cfg: FusionCfg,
    motion_cfg: MotionCfg,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
}

impl<F: AngleSensor, C: AngleSensor, M: MotorDriver> Default for MotionControllerBuilder<F, C, M> {
    fn default() -> Self {
        Self {
            fine: None,
            coarse: None,
            motor: None,
            fusion_cfg: FusionCfg::default(),
            motion_cfg: MotionCfg::default(),
            clock: None,
        }
    }
}

impl<F: AngleSensor, C: AngleSensor, M: MotorDriver> MotionControllerBuilder<F, C, M> {
    pub fn with_fine_sensor(mut self, fine: F) -> Self {
        self.fine = Some(fine);
        self
    }

    pub fn with_coarse_sensor(mut self, coarse: C) -> Self {
        self.coarse = Some(coarse);
        self
    }

    pub fn with_motor(mut self, motor: M) -> Self {
        self.motor = Some(motor);
        self
    }

    pub fn with_fusion_cfg(mut self, cfg: FusionCfg) -> Self {
        self.fusion_cfg = cfg;
        self
    }

    pub fn with_motion_cfg(mut self, cfg: MotionCfg) -> Self {
        self.motion_cfg = cfg;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<MotionController<F, C, M>> {
        let fine = self
            .fine
            .ok_or_else(|| eyre::Report::new(BuildError::MissingFineSensor))?;
        let coarse = self
            .coarse
            .ok_or_else(|| eyre::Report::new(BuildError::MissingCoarseSensor))?;
        let motor = self
            .motor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotor))?;

        let cfg = self.motion_cfg;
        if cfg.run_freq == 0 || cfg.approach_freq == 0 || cfg.start_freq == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "frequencies must be positive",
            )));
        }
        if cfg.progress_interval_ms == 0 || cfg.absolute_timeout_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "watchdog intervals must be positive",
            )));
        }
        if cfg.microsteps_per_unit <= 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "microsteps_per_unit must be positive",
            )));
        }
        if self.fusion_cfg.fine_gear_ratio <= 0.0 || self.fusion_cfg.coarse_gear_ratio <= 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "gear ratios must be positive",
            )));
        }

        let fusion = SensorFusion::new(fine, coarse, self.fusion_cfg);
        let baseline = fusion.ddd_value();
        Ok(MotionController {
            fusion,
            motor,
            cfg,
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            mode: MovingMode::Idle,
            flags: FailureFlags::default(),
            target: baseline,
            baseline,
            blockage_count: 0,
            approach_active: false,
            seek_reverse: false,
            seek_freq: 0,
            timers: TimerSet::new(),
            pending: Vec::new(),
        })
    }
}
