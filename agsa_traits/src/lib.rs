pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error type used at the hardware trait seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One physical rotary position sensor of the DDD pair.
///
/// Instantiated twice: once for the fine (geared) sensor and once for the
/// coarse sensor. Angles are reported in tenths of a degree and are already
/// corrected by the sensor's calibration offset.
pub trait AngleSensor {
    /// Trigger the sensor's self-calibration routine.
    fn calibrate(&mut self) -> Result<(), BoxError>;

    /// Calibrated, filtered angle in tenths of a degree.
    fn filtered_angle_10th(&self) -> i32;

    /// Calibrated, unfiltered angle in tenths of a degree.
    fn raw_angle_10th(&self) -> i32;

    /// Whether the sensor reports itself broken or unreachable.
    fn is_failed(&self) -> bool;

    /// Current calibration offset in tenths of a degree.
    fn calibration_offset_10th(&self) -> i32;

    /// Overwrite the calibration offset (restore after restart).
    fn set_calibration_offset_10th(&mut self, offset_10th: i32) -> Result<(), BoxError>;
}

/// Stepper driver for the grinding-gap actuator.
pub trait MotorDriver {
    /// Start an open-ended move with the given ramp; runs until `stop()`.
    fn start(
        &mut self,
        reverse: bool,
        start_freq: u32,
        run_freq: u32,
        ramp_steps: u32,
    ) -> Result<(), BoxError>;

    /// Start a bounded move of `steps` microsteps; the driver stops on its own.
    fn start_steps(
        &mut self,
        reverse: bool,
        steps: u32,
        start_freq: u32,
        run_freq: u32,
        ramp_steps: u32,
    ) -> Result<(), BoxError>;

    /// Stop the motor. Must be safe to call while already stopped.
    fn stop(&mut self) -> Result<(), BoxError>;

    /// Whether the motor is currently stepping.
    fn is_running(&self) -> bool;
}

/// Persistence for the two DDD calibration offsets.
///
/// These are the only values the motion core needs to survive a restart.
pub trait CalibrationStore {
    /// Stored offsets in tenths of a degree as `(fine, coarse)`.
    fn offsets_10th(&self) -> (i32, i32);

    fn store_offsets_10th(&mut self, fine_10th: i32, coarse_10th: i32) -> Result<(), BoxError>;
}

/// Sink for event records produced by the motion core.
pub trait EventSink {
    /// A calibration was performed; both new offsets in tenths of a degree.
    fn calibration_performed(&mut self, fine_offset_10th: i32, coarse_offset_10th: i32);
}
