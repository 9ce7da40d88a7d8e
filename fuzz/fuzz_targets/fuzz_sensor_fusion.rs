#![no_main]
use libfuzzer_sys::fuzz_target;

use agsa_core::mocks::MockAngleSensor;
use agsa_core::{FusionCfg, SensorFusion};

fuzz_target!(|angles: (i32, i32)| {
    // Arbitrary sensor readings must fuse without panicking and land on the
    // 0..=800 device scale.
    let fusion = SensorFusion::new(
        MockAngleSensor::default(),
        MockAngleSensor::default(),
        FusionCfg::default(),
    );
    let gap = fusion.fuse(angles.0, angles.1);
    assert!((0..=800).contains(&gap));
});
