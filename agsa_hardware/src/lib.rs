#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Simulated AGSA hardware: a shared spindle plant from which the DDD sensor
//! pair and the stepper driver are derived.
//!
//! The real sensors and stepper sit behind a wire protocol outside this
//! workspace; the simulation implements the same `agsa_traits` seams so the
//! core and the CLI run unmodified against it.

use std::cell::RefCell;
use std::rc::Rc;

use agsa_traits::{AngleSensor, BoxError, CalibrationStore, EventSink, MotorDriver};

/// Full-scale mechanical angle in tenths of a degree.
const MAX_ANGLE_10TH: f64 = 3558.0;
/// One revolution in tenths of a degree.
const REV_10TH: f64 = 3600.0;
/// Device-unit full scale.
const GAP_MAX: f64 = 800.0;

/// Shared state of the simulated gap mechanism.
#[derive(Debug)]
struct PlantState {
    /// Gap position in device units, fractional.
    position: f64,
    running: bool,
    reverse: bool,
    run_freq: u32,
    /// Remaining microsteps for bounded moves; `None` runs until stopped.
    steps_remaining: Option<f64>,
    microsteps_per_unit: f64,
}

/// Simulated spindle plant. Clones share the same underlying mechanism.
#[derive(Clone, Debug)]
pub struct SimPlant {
    state: Rc<RefCell<PlantState>>,
    fine_gear_ratio: f64,
    coarse_gear_ratio: f64,
}

impl SimPlant {
    pub fn new(position: f64, microsteps_per_unit: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(PlantState {
                position: position.clamp(0.0, GAP_MAX),
                running: false,
                reverse: false,
                run_freq: 0,
                steps_remaining: None,
                microsteps_per_unit: f64::from(microsteps_per_unit.max(1)),
            })),
            fine_gear_ratio: 6.06,
            coarse_gear_ratio: 1.02,
        }
    }

    /// Advance the mechanism by `dt_ms` of simulated time.
    ///
    /// The position saturates at the travel ends, which is exactly how a real
    /// blockage looks to the controller.
    pub fn tick(&self, dt_ms: u64) {
        let mut st = self.state.borrow_mut();
        if !st.running {
            return;
        }
        let steps = f64::from(st.run_freq) * (dt_ms as f64) / 1000.0;
        let steps = match st.steps_remaining {
            Some(remaining) => {
                let used = steps.min(remaining);
                let left = remaining - used;
                st.steps_remaining = Some(left);
                if left <= 0.0 {
                    st.running = false;
                }
                used
            }
            None => steps,
        };
        let delta = steps / st.microsteps_per_unit;
        let delta = if st.reverse { -delta } else { delta };
        st.position = (st.position + delta).clamp(0.0, GAP_MAX);
    }

    pub fn position(&self) -> f64 {
        self.state.borrow().position
    }

    pub fn set_position(&self, position: f64) {
        self.state.borrow_mut().position = position.clamp(0.0, GAP_MAX);
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Fine sensor: geared up, wrapping several times over the travel.
    pub fn fine_sensor(&self) -> SimAngleSensor {
        SimAngleSensor {
            plant: self.clone(),
            coarse: false,
            offset_10th: 0,
            failed: Rc::new(RefCell::new(false)),
        }
    }

    /// Coarse sensor: one (inverted-sense) sweep over the travel.
    pub fn coarse_sensor(&self) -> SimAngleSensor {
        SimAngleSensor {
            plant: self.clone(),
            coarse: true,
            offset_10th: 0,
            failed: Rc::new(RefCell::new(false)),
        }
    }

    pub fn motor(&self) -> SimAgsaMotor {
        SimAgsaMotor {
            plant: self.clone(),
        }
    }

    fn angle_10th(&self, coarse: bool) -> i32 {
        let gap_angle = self.position() * MAX_ANGLE_10TH / GAP_MAX;
        let angle = if coarse {
            REV_10TH - gap_angle / self.coarse_gear_ratio
        } else {
            (gap_angle * self.fine_gear_ratio).rem_euclid(REV_10TH)
        };
        angle.round() as i32
    }
}

/// One simulated rotary sensor of the DDD pair.
#[derive(Clone, Debug)]
pub struct SimAngleSensor {
    plant: SimPlant,
    coarse: bool,
    offset_10th: i32,
    failed: Rc<RefCell<bool>>,
}

impl SimAngleSensor {
    /// Inject or clear a sensor failure.
    pub fn set_failed(&self, failed: bool) {
        *self.failed.borrow_mut() = failed;
    }
}

impl AngleSensor for SimAngleSensor {
    fn calibrate(&mut self) -> Result<(), BoxError> {
        // The simulated mechanism is perfectly aligned already.
        self.offset_10th = 0;
        tracing::debug!(coarse = self.coarse, "simulated sensor calibrated");
        Ok(())
    }

    fn filtered_angle_10th(&self) -> i32 {
        self.plant.angle_10th(self.coarse) + self.offset_10th
    }

    fn raw_angle_10th(&self) -> i32 {
        self.plant.angle_10th(self.coarse) + self.offset_10th
    }

    fn is_failed(&self) -> bool {
        *self.failed.borrow()
    }

    fn calibration_offset_10th(&self) -> i32 {
        self.offset_10th
    }

    fn set_calibration_offset_10th(&mut self, offset_10th: i32) -> Result<(), BoxError> {
        self.offset_10th = offset_10th;
        Ok(())
    }
}

/// Simulated stepper driver acting on the shared plant.
#[derive(Clone, Debug)]
pub struct SimAgsaMotor {
    plant: SimPlant,
}

impl MotorDriver for SimAgsaMotor {
    fn start(
        &mut self,
        reverse: bool,
        _start_freq: u32,
        run_freq: u32,
        _ramp_steps: u32,
    ) -> Result<(), BoxError> {
        let mut st = self.plant.state.borrow_mut();
        st.running = true;
        st.reverse = reverse;
        st.run_freq = run_freq;
        st.steps_remaining = None;
        Ok(())
    }

    fn start_steps(
        &mut self,
        reverse: bool,
        steps: u32,
        _start_freq: u32,
        run_freq: u32,
        _ramp_steps: u32,
    ) -> Result<(), BoxError> {
        let mut st = self.plant.state.borrow_mut();
        st.running = true;
        st.reverse = reverse;
        st.run_freq = run_freq;
        st.steps_remaining = Some(f64::from(steps));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        let mut st = self.plant.state.borrow_mut();
        st.running = false;
        st.steps_remaining = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.plant.is_running()
    }
}

/// Calibration offsets kept in memory for the simulated setup.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryCalibrationStore {
    fine_10th: i32,
    coarse_10th: i32,
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

/// Event sink writing calibration records to the tracing log in the wire
/// format used by the device event log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn calibration_performed(&mut self, fine_offset_10th: i32, coarse_offset_10th: i32) {
        tracing::info!(
            offsets = %format!("1:{fine_offset_10th}/2:{coarse_offset_10th}"),
            "calibration performed"
        );
    }
}
