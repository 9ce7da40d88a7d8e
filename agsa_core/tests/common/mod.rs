//! Shared test rig: mock sensor pair + spy motor + deterministic clock.
#![allow(dead_code)]

use std::sync::Arc;

use agsa_core::mocks::{MockAngleSensor, MockMotor};
use agsa_core::motion::MotionController;
use agsa_core::{FusionCfg, MotionCfg};
use agsa_traits::clock::test_clock::TestClock;

pub const FINE_GEAR_RATIO: f64 = 6.06;
pub const COARSE_GEAR_RATIO: f64 = 1.02;

/// Angle pair that fuses to (approximately) the given fractional gap.
pub fn angles_for_gap(gap: f64) -> (i32, i32) {
    let gap_angle = gap * 3558.0 / 800.0;
    let fine = (gap_angle * FINE_GEAR_RATIO).rem_euclid(3600.0).round() as i32;
    let coarse = (3600.0 - gap_angle / COARSE_GEAR_RATIO).round() as i32;
    (fine, coarse)
}

/// Drive both mock sensors to read exactly `gap` after fusion.
///
/// The half-unit bias keeps truncation from landing one unit low.
pub fn set_gap(fine: &MockAngleSensor, coarse: &MockAngleSensor, gap: i32) {
    let (f, c) = angles_for_gap(f64::from(gap) + 0.5);
    fine.set_angle_10th(f);
    coarse.set_angle_10th(c);
}

pub struct Rig {
    pub ctrl: MotionController<MockAngleSensor, MockAngleSensor, MockMotor>,
    pub fine: MockAngleSensor,
    pub coarse: MockAngleSensor,
    pub motor: MockMotor,
    pub clock: TestClock,
}

impl Rig {
    pub fn at_gap(gap: i32) -> Self {
        Self::with_cfg(gap, MotionCfg::default())
    }

    pub fn with_cfg(gap: i32, cfg: MotionCfg) -> Self {
        let fine = MockAngleSensor::default();
        let coarse = MockAngleSensor::default();
        set_gap(&fine, &coarse, gap);
        let motor = MockMotor::new();
        let clock = TestClock::new();
        let ctrl = MotionController::builder()
            .with_fine_sensor(fine.clone())
            .with_coarse_sensor(coarse.clone())
            .with_motor(motor.clone())
            .with_fusion_cfg(FusionCfg::default())
            .with_motion_cfg(cfg)
            .with_clock(Arc::new(clock.clone()))
            .build()
            .expect("rig build");
        Self {
            ctrl,
            fine,
            coarse,
            motor,
            clock,
        }
    }

    /// Move the mocked mechanism to `gap` and refresh the fusion.
    pub fn set_gap(&mut self, gap: i32) {
        set_gap(&self.fine, &self.coarse, gap);
        self.ctrl.fusion_mut().update();
    }

    /// Advance time by one progress-watchdog period and run one update.
    pub fn progress_tick(&mut self) -> Vec<agsa_core::MotionEvent> {
        self.clock
            .advance(std::time::Duration::from_millis(400));
        self.ctrl.fusion_mut().update();
        self.ctrl.update()
    }
}
