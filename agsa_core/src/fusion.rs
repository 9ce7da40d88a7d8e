//! Dual-sensor position fusion for the DDD rotary sensor pair.
//!
//! The fine sensor is geared and completes several revolutions over the full
//! gap travel; the coarse sensor covers the travel in (roughly) one revolution
//! of opposite sense. `fuse` reconciles the fine sensor's wrap-around against
//! the coarse estimate and converts the result to device units.

use agsa_traits::{AngleSensor, CalibrationStore, EventSink};
use eyre::WrapErr;

use crate::config::FusionCfg;
use crate::error::{Result, map_hw_error};

/// Upper end of the device-unit ("Hemro") scale.
pub const GAP_MAX: i32 = 800;
/// Values past this are sensor wrap artifacts and read as 0.
const WRAP_SLACK: i32 = 10;
/// Full-scale mechanical angle in tenths of a degree (355.8 degrees).
const MAX_ANGLE_10TH: f64 = 3558.0;
/// One revolution in tenths of a degree.
const REV_10TH: i32 = 3600;
/// Highest whole fine-sensor revolution considered during reconciliation.
const MAX_FINE_TURNS: i32 = 5;

pub struct SensorFusion<F: AngleSensor, C: AngleSensor> {
    fine: F,
    coarse: C,
    cfg: FusionCfg,
    fused_gap: i32,
    raw_gap: i32,
}

impl<F: AngleSensor, C: AngleSensor> SensorFusion<F, C> {
    pub fn new(fine: F, coarse: C, cfg: FusionCfg) -> Self {
        let mut fusion = Self {
            fine,
            coarse,
            cfg,
            fused_gap: 0,
            raw_gap: 0,
        };
        fusion.update();
        fusion
    }

    /// Re-read both sensors and recompute the fused and raw gap values.
    pub fn update(&mut self) {
        self.fused_gap = self.fuse(
            self.fine.filtered_angle_10th(),
            self.coarse.filtered_angle_10th(),
        );
        self.raw_gap = self.fuse(self.fine.raw_angle_10th(), self.coarse.raw_angle_10th());
    }

    /// Combine one fine/coarse angle pair into a gap in device units.
    pub fn fuse(&self, fine_angle_10th: i32, coarse_angle_10th: i32) -> i32 {
        let fine = wrap_revolution_10th(fine_angle_10th);
        let coarse = wrap_revolution_10th(coarse_angle_10th);

        // The coarse sensor rotates against the fine sensor's sense.
        let coarse = REV_10TH - coarse;
        let coarse_est = f64::from(coarse) * self.cfg.coarse_gear_ratio;

        // The fine sensor wraps several times per coarse revolution; pick the
        // whole-revolution count whose unwrapped angle lands near the coarse
        // estimate. No match means the sensors disagree outright, in which
        // case the coarse estimate is the only absolute reference left.
        let window = f64::from(self.cfg.accept_window_10th);
        let mut reconciled = coarse_est;
        for k in 0..=MAX_FINE_TURNS {
            let candidate = f64::from(k * REV_10TH + fine) / self.cfg.fine_gear_ratio;
            if (candidate - coarse_est).abs() <= window {
                reconciled = candidate;
                break;
            }
        }

        let gap = (reconciled * f64::from(GAP_MAX) / MAX_ANGLE_10TH) as i64;
        if gap > i64::from(GAP_MAX + WRAP_SLACK) {
            // Wrap artifact just past full scale: the mechanism is at 0.
            0
        } else if gap > i64::from(GAP_MAX) {
            GAP_MAX
        } else if gap < 0 {
            0
        } else {
            gap as i32
        }
    }

    /// Either sensor failing fails the pair.
    pub fn is_failed(&self) -> bool {
        self.fine.is_failed() || self.coarse.is_failed()
    }

    /// Last fused gap value; reads 0 while the sensor pair is failed.
    pub fn ddd_value(&self) -> i32 {
        if self.is_failed() { 0 } else { self.fused_gap }
    }

    /// Gap computed from the unfiltered raw angles. Used for noise-guard
    /// comparisons; never zeroed on failure.
    pub fn raw_ddd_value(&self) -> i32 {
        self.raw_gap
    }

    /// Self-calibrate both sensors, persist the resulting offsets, and emit
    /// one calibration event carrying both.
    pub fn calibrate<P, E>(&mut self, store: &mut P, events: &mut E) -> Result<()>
    where
        P: CalibrationStore,
        E: EventSink,
    {
        self.fine
            .calibrate()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("fine sensor calibration")?;
        self.coarse
            .calibrate()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("coarse sensor calibration")?;

        let fine_off = self.fine.calibration_offset_10th();
        let coarse_off = self.coarse.calibration_offset_10th();
        self.update();

        store
            .store_offsets_10th(fine_off, coarse_off)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("persisting calibration offsets")?;
        events.calibration_performed(fine_off, coarse_off);
        tracing::info!(fine_off, coarse_off, "ddd calibration performed");
        Ok(())
    }

    /// Push previously persisted offsets back into the sensors.
    pub fn restore_offsets<P: CalibrationStore>(&mut self, store: &P) -> Result<()> {
        let (fine_off, coarse_off) = store.offsets_10th();
        self.fine
            .set_calibration_offset_10th(fine_off)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("restoring fine offset")?;
        self.coarse
            .set_calibration_offset_10th(coarse_off)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("restoring coarse offset")?;
        self.update();
        Ok(())
    }

    pub fn fine(&self) -> &F {
        &self.fine
    }

    pub fn coarse(&self) -> &C {
        &self.coarse
    }
}

/// Normalize a wrapping tenths-of-degree angle into [0, 3600).
#[inline]
fn wrap_revolution_10th(angle_10th: i32) -> i32 {
    angle_10th.rem_euclid(REV_10TH)
}
