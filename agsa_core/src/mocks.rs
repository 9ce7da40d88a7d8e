//! Test and helper mocks for agsa_core.
//!
//! Shared-handle mocks: clones observe and mutate the same underlying state,
//! so tests keep a handle while the controller owns the other clone.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agsa_traits::{AngleSensor, BoxError, CalibrationStore, EventSink, MotorDriver};

/// Scripted rotary sensor with settable angles, failure flag, and offset.
#[derive(Clone, Default)]
pub struct MockAngleSensor {
    filtered_10th: Arc<AtomicI32>,
    raw_10th: Arc<AtomicI32>,
    failed: Arc<AtomicBool>,
    offset_10th: Arc<AtomicI32>,
    calibrate_calls: Arc<AtomicUsize>,
}

impl MockAngleSensor {
    pub fn new(angle_10th: i32) -> Self {
        let sensor = Self::default();
        sensor.set_angle_10th(angle_10th);
        sensor
    }

    /// Set both the filtered and the raw angle.
    pub fn set_angle_10th(&self, angle_10th: i32) {
        self.filtered_10th.store(angle_10th, Ordering::Relaxed);
        self.raw_10th.store(angle_10th, Ordering::Relaxed);
    }

    pub fn set_filtered_10th(&self, angle_10th: i32) {
        self.filtered_10th.store(angle_10th, Ordering::Relaxed);
    }

    pub fn set_raw_10th(&self, angle_10th: i32) {
        self.raw_10th.store(angle_10th, Ordering::Relaxed);
    }

    pub fn set_failed(&self, failed: bool) {
        self.failed.store(failed, Ordering::Relaxed);
    }

    pub fn set_offset_10th(&self, offset_10th: i32) {
        self.offset_10th.store(offset_10th, Ordering::Relaxed);
    }

    pub fn calibrate_calls(&self) -> usize {
        self.calibrate_calls.load(Ordering::Relaxed)
    }
}

impl AngleSensor for MockAngleSensor {
    fn calibrate(&mut self) -> Result<(), BoxError> {
        self.calibrate_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn filtered_angle_10th(&self) -> i32 {
        self.filtered_10th.load(Ordering::Relaxed)
    }

    fn raw_angle_10th(&self) -> i32 {
        self.raw_10th.load(Ordering::Relaxed)
    }

    fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    fn calibration_offset_10th(&self) -> i32 {
        self.offset_10th.load(Ordering::Relaxed)
    }

    fn set_calibration_offset_10th(&mut self, offset_10th: i32) -> Result<(), BoxError> {
        self.offset_10th.store(offset_10th, Ordering::Relaxed);
        Ok(())
    }
}

/// One recorded motor command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCommand {
    pub reverse: bool,
    /// `None` for open-ended starts, `Some(steps)` for bounded moves.
    pub steps: Option<u32>,
    pub start_freq: u32,
    pub run_freq: u32,
    pub ramp_steps: u32,
}

/// Spy motor recording every command; run state is test-controlled.
#[derive(Clone, Default)]
pub struct MockMotor {
    running: Arc<AtomicBool>,
    commands: Arc<Mutex<Vec<MotorCommand>>>,
    stop_calls: Arc<AtomicUsize>,
}

impl MockMotor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the driver finishing (or being externally stopped).
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn commands(&self) -> Vec<MotorCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn last_command(&self) -> Option<MotorCommand> {
        self.commands().last().copied()
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::Relaxed)
    }

    fn record(&self, cmd: MotorCommand) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(cmd);
        }
        self.running.store(true, Ordering::Relaxed);
    }
}

impl MotorDriver for MockMotor {
    fn start(
        &mut self,
        reverse: bool,
        start_freq: u32,
        run_freq: u32,
        ramp_steps: u32,
    ) -> Result<(), BoxError> {
        self.record(MotorCommand {
            reverse,
            steps: None,
            start_freq,
            run_freq,
            ramp_steps,
        });
        Ok(())
    }

    fn start_steps(
        &mut self,
        reverse: bool,
        steps: u32,
        start_freq: u32,
        run_freq: u32,
        ramp_steps: u32,
    ) -> Result<(), BoxError> {
        self.record(MotorCommand {
            reverse,
            steps: Some(steps),
            start_freq,
            run_freq,
            ramp_steps,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.stop_calls.fetch_add(1, Ordering::Relaxed);
        self.running.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// In-memory calibration persistence.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryCalibrationStore {
    pub fine_10th: i32,
    pub coarse_10th: i32,
}

impl CalibrationStore for MemoryCalibrationStore {
    fn offsets_10th(&self) -> (i32, i32) {
        (self.fine_10th, self.coarse_10th)
    }

    fn store_offsets_10th(&mut self, fine_10th: i32, coarse_10th: i32) -> Result<(), BoxError> {
        self.fine_10th = fine_10th;
        self.coarse_10th = coarse_10th;
        Ok(())
    }
}

/// Event sink that keeps every calibration record for assertions.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    pub calibrations: Vec<(i32, i32)>,
}

impl EventSink for RecordingEventSink {
    fn calibration_performed(&mut self, fine_offset_10th: i32, coarse_offset_10th: i32) {
        self.calibrations.push((fine_offset_10th, coarse_offset_10th));
    }
}
