//! Endurance-test harness: meta sequence + per-cycle step machine.
//!
//! The harness borrows the controller for the duration of each call and never
//! owns it; the controller reports back through the `MotionEvent`s its caller
//! feeds into `on_motion_event`.

pub mod log;
pub mod meta;
pub mod step;

use std::sync::Arc;
use std::time::Duration;

use agsa_traits::clock::{Clock, MonotonicClock};
use agsa_traits::{AngleSensor, MotorDriver};

use crate::config::EnduranceCfg;
use crate::motion::{MotionController, MotionEvent};
use crate::scheduler::TimerSet;
use log::{LogMeta, LogRow, TestLog};
pub use meta::{Leg, MetaState};
pub use step::{StepAction, StepContext, StepEffect, StepState};

/// Which endurance test to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    Manual,
    Steps,
    Stress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HarnessTimer {
    Watchdog,
}

pub struct EnduranceTest {
    cfg: EnduranceCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    meta: MetaState,
    step: StepState,
    /// Completed cycles within the current leg.
    cycle: u32,
    /// Full stress-sequence loops, or backward completions in the steps test.
    total_cycles: u32,
    /// Failures over the whole run.
    fail_count: u32,
    /// Failures since the last successful leg.
    continuous_fails: u32,
    timers: TimerSet<HarnessTimer>,
    log: Option<TestLog>,
    pending_remark: Option<String>,
}

impl EnduranceTest {
    pub fn new(cfg: EnduranceCfg) -> Self {
        Self::with_clock(cfg, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(cfg: EnduranceCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            cfg,
            clock,
            meta: MetaState::Idle,
            step: StepState::Idle,
            cycle: 0,
            total_cycles: 0,
            fail_count: 0,
            continuous_fails: 0,
            timers: TimerSet::new(),
            log: None,
            pending_remark: None,
        }
    }

    /// Begin a test run. Starting while a run is active aborts the old run
    /// first (any action other than the regular advance is an abort).
    pub fn start<F, C, M>(&mut self, ctrl: &mut MotionController<F, C, M>, mode: TestMode)
    where
        F: AngleSensor,
        C: AngleSensor,
        M: MotorDriver,
    {
        if self.meta.is_running() {
            tracing::warn!("test start while running; aborting previous run");
            self.stop_test(ctrl);
        }

        self.meta = match mode {
            TestMode::Manual => MetaState::Manual,
            TestMode::Steps => MetaState::StepsTest,
            TestMode::Stress => MetaState::StressStep0to200,
        };
        self.step = StepState::Idle;
        self.cycle = 0;
        self.total_cycles = 0;
        self.fail_count = 0;
        self.continuous_fails = 0;
        self.pending_remark = None;
        self.log = Some(TestLog::create(
            &self.cfg.log_dir,
            &self.cfg.archive_dir,
            self.log_meta(),
            self.cfg.max_log_bytes,
            self.cfg.max_archives,
        ));
        tracing::info!(?mode, "endurance test started");
        self.dispatch(ctrl, StepAction::Started);
    }

    /// Stop the run. Safe and idempotent from any state.
    pub fn stop_test<F, C, M>(&mut self, ctrl: &mut MotionController<F, C, M>)
    where
        F: AngleSensor,
        C: AngleSensor,
        M: MotorDriver,
    {
        self.timers.disarm_all();
        ctrl.stop();
        if self.meta.is_running() {
            tracing::info!(
                cycles = self.cycle,
                total = self.total_cycles,
                fails = self.fail_count,
                "endurance test stopped"
            );
        }
        self.meta = MetaState::Idle;
        self.step = StepState::Idle;
        if let Some(log) = self.log.as_mut() {
            log.flush();
        }
        self.log = None;
    }

    /// Feed one controller event into the step machine.
    pub fn on_motion_event<F, C, M>(
        &mut self,
        ctrl: &mut MotionController<F, C, M>,
        event: MotionEvent,
    ) where
        F: AngleSensor,
        C: AngleSensor,
        M: MotorDriver,
    {
        if !self.meta.is_running() {
            return;
        }
        match event {
            MotionEvent::Started => self.dispatch(ctrl, StepAction::AgsaStarted),
            MotionEvent::Stopped => self.dispatch(ctrl, StepAction::AgsaStopped),
            MotionEvent::Failed(kind) => {
                self.pending_remark = Some(kind.to_string());
                self.dispatch(ctrl, StepAction::AgsaFailed);
            }
        }
    }

    /// Periodic update: fire the harness watchdog if due and write one CSV
    /// row for this controller update.
    pub fn update<F, C, M>(&mut self, ctrl: &mut MotionController<F, C, M>)
    where
        F: AngleSensor,
        C: AngleSensor,
        M: MotorDriver,
    {
        if !self.meta.is_running() {
            return;
        }

        let now = self.clock.now();
        for _watchdog in self.timers.take_due(now) {
            if !self.steps_mode() {
                self.pending_remark = Some(String::from("harness watchdog"));
            }
            self.dispatch(ctrl, StepAction::WatchdogTimeout);
        }

        if self.meta.is_running() {
            let remark = self.pending_remark.take().unwrap_or_default();
            let row = LogRow {
                total_cycle: self.total_cycles,
                step_cycle: self.cycle,
                ddd_value: ctrl.fusion().ddd_value(),
                raw_ddd_value: ctrl.fusion().raw_ddd_value(),
                fail_count: self.fail_count,
                step_state: self.step.ordinal(),
                remark: &remark,
            };
            if let Some(log) = self.log.as_mut() {
                log.write_row(&row);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.meta.is_running()
    }

    pub fn meta_state(&self) -> MetaState {
        self.meta
    }

    pub fn step_state(&self) -> StepState {
        self.step
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn total_cycles(&self) -> u32 {
        self.total_cycles
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    pub fn continuous_fails(&self) -> u32 {
        self.continuous_fails
    }

    pub fn log_session(&self) -> Option<u32> {
        self.log.as_ref().map(|l| l.session())
    }

    // ── Private ──────────────────────────────────────────────────────────────

    fn steps_mode(&self) -> bool {
        self.meta == MetaState::StepsTest
    }

    fn cycle_target(&self) -> u32 {
        if self.steps_mode() {
            self.cfg.steps_test_cycles
        } else {
            self.meta.leg(&self.cfg).map_or(0, |leg| leg.cycles)
        }
    }

    fn log_meta(&self) -> LogMeta {
        let leg = self.meta.leg(&self.cfg);
        LogMeta {
            cycle_target: self.cycle_target(),
            start_gap: leg.map_or(0, |l| l.start_gap),
            stop_gap: leg.map_or(0, |l| l.stop_gap),
            run_freq: self.cfg.run_freq,
            approach_freq: self.cfg.approach_freq,
            device_serial: self.cfg.device_serial.clone(),
        }
    }

    fn watchdog_interval(&self) -> Duration {
        if self.steps_mode() {
            Duration::from_millis(self.cfg.steps_watchdog_ms())
        } else {
            Duration::from_millis(self.cfg.watchdog_fixed_ms)
        }
    }

    fn arm_watchdog(&mut self) {
        let interval = self.watchdog_interval();
        self.timers.arm(HarnessTimer::Watchdog, interval, self.clock.now());
    }

    fn dispatch<F, C, M>(&mut self, ctrl: &mut MotionController<F, C, M>, action: StepAction)
    where
        F: AngleSensor,
        C: AngleSensor,
        M: MotorDriver,
    {
        if !self.meta.is_running() {
            return;
        }
        let ctx = StepContext {
            steps_mode: self.steps_mode(),
            cycle: self.cycle,
            cycle_target: self.cycle_target(),
            continuous_fails: self.continuous_fails,
            abort_limit: self.cfg.abort_limit,
        };
        let (next, effects) = step::transition(self.step, action, &ctx);
        tracing::trace!(?action, from = ?self.step, to = ?next, "step transition");
        self.step = next;

        let mut advance = false;
        let mut abort = false;
        for effect in effects {
            match effect {
                StepEffect::SeekStart => {
                    if let Some(leg) = self.meta.leg(&self.cfg)
                        && let Err(e) = ctrl.move_to_ddd_value(leg.start_gap)
                    {
                        tracing::warn!(error = %e, "seek to start gap failed");
                    }
                }
                StepEffect::SeekStop => {
                    if let Some(leg) = self.meta.leg(&self.cfg)
                        && let Err(e) = ctrl.move_to_ddd_value(leg.stop_gap)
                    {
                        tracing::warn!(error = %e, "seek to stop gap failed");
                    }
                }
                StepEffect::StepForward => self.steps_leg(ctrl, false),
                StepEffect::StepBackward => self.steps_leg(ctrl, true),
                StepEffect::MarkSuccess => self.continuous_fails = 0,
                StepEffect::IncrementCycle => self.cycle += 1,
                StepEffect::IncrementTotal => self.total_cycles += 1,
                StepEffect::CountFailure => {
                    self.fail_count += 1;
                    self.continuous_fails += 1;
                }
                StepEffect::AdvanceMeta => advance = true,
                StepEffect::AbortTest => abort = true,
                StepEffect::RearmWatchdog => self.arm_watchdog(),
            }
        }

        if abort {
            tracing::warn!(
                fails = self.continuous_fails,
                "consecutive-failure budget spent; aborting endurance test"
            );
            self.stop_test(ctrl);
            return;
        }
        if advance {
            self.advance_meta(ctrl);
        }
    }

    fn advance_meta<F, C, M>(&mut self, ctrl: &mut MotionController<F, C, M>)
    where
        F: AngleSensor,
        C: AngleSensor,
        M: MotorDriver,
    {
        let (next, wrapped) = self.meta.advance();
        if wrapped {
            self.total_cycles += 1;
        }
        tracing::info!(from = ?self.meta, to = ?next, "meta step complete");
        self.meta = next;
        self.cycle = 0;
        if self.meta.is_running() {
            self.step = StepState::Idle;
            self.dispatch(ctrl, StepAction::Started);
        } else {
            // One-shot run finished cleanly.
            self.timers.disarm_all();
            if let Some(log) = self.log.as_mut() {
                log.flush();
            }
            self.log = None;
        }
    }

    fn steps_leg<F, C, M>(&mut self, ctrl: &mut MotionController<F, C, M>, reverse: bool)
    where
        F: AngleSensor,
        C: AngleSensor,
        M: MotorDriver,
    {
        let steps = self.cfg.steps_test_steps as i32;
        let steps = if reverse { -steps } else { steps };
        if let Err(e) = ctrl.move_steps(steps, self.cfg.start_freq, self.cfg.run_freq, false, false)
        {
            tracing::warn!(error = %e, "steps-test leg failed to start");
        }
    }
}
