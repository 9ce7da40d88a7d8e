mod common;

use agsa_core::{FailureKind, MotionCfg, MotionEvent, MovingMode};
use agsa_traits::MotorDriver;
use rstest::rstest;

use common::{Rig, angles_for_gap};

#[test]
fn builder_rejects_missing_parts_and_bad_config() {
    use agsa_core::mocks::{MockAngleSensor, MockMotor};
    use agsa_core::motion::MotionController;

    let missing_motor = MotionController::<_, _, MockMotor>::builder()
        .with_fine_sensor(MockAngleSensor::default())
        .with_coarse_sensor(MockAngleSensor::default())
        .build();
    assert!(missing_motor.is_err());

    let zero_freq = MotionController::builder()
        .with_fine_sensor(MockAngleSensor::default())
        .with_coarse_sensor(MockAngleSensor::default())
        .with_motor(MockMotor::new())
        .with_motion_cfg(MotionCfg {
            run_freq: 0,
            ..MotionCfg::default()
        })
        .build();
    assert!(zero_freq.is_err());
}

#[test]
fn move_to_equal_target_reports_stopped_without_moving() {
    let mut rig = Rig::at_gap(400);
    rig.ctrl.move_to_ddd_value(400).unwrap();
    assert!(rig.motor.commands().is_empty());
    assert_eq!(rig.ctrl.mode(), MovingMode::Idle);
    // Callers sequencing on the completion event still get one.
    assert_eq!(rig.ctrl.take_events(), vec![MotionEvent::Stopped]);
}

#[test]
fn move_to_equal_target_with_failed_sensors_is_not_an_arrival() {
    // A failed pair reads gap 0; a seek to 0 must not pass as complete.
    let mut rig = Rig::at_gap(0);
    rig.fine.set_failed(true);
    rig.ctrl.move_to_ddd_value(0).unwrap();
    assert_eq!(
        rig.ctrl.take_events(),
        vec![MotionEvent::Failed(FailureKind::NoSensor)]
    );
    assert!(rig.motor.commands().is_empty());
}

#[test]
fn move_to_out_of_range_target_clamps() {
    let mut rig = Rig::at_gap(400);
    rig.ctrl.move_to_ddd_value(900).unwrap();
    assert_eq!(rig.ctrl.target(), 800);
    let cmd = rig.motor.last_command().unwrap();
    assert!(!cmd.reverse);

    let mut rig = Rig::at_gap(400);
    rig.ctrl.move_to_ddd_value(-50).unwrap();
    assert_eq!(rig.ctrl.target(), 0);
    assert!(rig.motor.last_command().unwrap().reverse);
}

#[rstest]
#[case(15, 400)] // inside the approach band
#[case(20, 400)] // approach band boundary
#[case(21, 800)] // half-speed band, run/2
#[case(40, 800)] // half-speed boundary
#[case(41, 1600)] // full run frequency
fn seek_frequency_follows_distance_bands(#[case] distance: i32, #[case] expect_freq: u32) {
    let mut rig = Rig::at_gap(400);
    rig.ctrl.move_to_ddd_value(400 + distance).unwrap();
    let cmd = rig.motor.last_command().unwrap();
    assert_eq!(cmd.run_freq, expect_freq, "distance {distance}");
    assert_eq!(cmd.start_freq, 200);
    assert!(cmd.steps.is_none());
}

#[test]
fn starting_a_move_emits_started_and_arms_the_motor() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_to_ddd_value(500).unwrap();
    assert_eq!(rig.ctrl.take_events(), vec![MotionEvent::Started]);
    assert_eq!(rig.ctrl.mode(), MovingMode::MoveToDdd);
    assert!(rig.motor.is_running());
}

#[test]
fn reaching_the_target_stops_the_motor() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_to_ddd_value(200).unwrap();
    rig.ctrl.take_events();

    rig.set_gap(200);
    let events = rig.ctrl.update();
    assert_eq!(events, vec![MotionEvent::Stopped]);
    assert!(!rig.motor.is_running());
    assert_eq!(rig.ctrl.mode(), MovingMode::Idle);
}

#[test]
fn self_stop_inside_tolerance_finishes_the_move() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_to_ddd_value(200).unwrap();
    rig.ctrl.take_events();

    rig.set_gap(199); // within target_tolerance = 2
    rig.motor.set_running(false);
    let events = rig.ctrl.update();
    assert_eq!(events, vec![MotionEvent::Stopped]);
    assert_eq!(rig.ctrl.mode(), MovingMode::Idle);
}

#[test]
fn self_stop_outside_tolerance_restarts_the_seek() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_to_ddd_value(200).unwrap();
    rig.ctrl.take_events();
    let commands_before = rig.motor.commands().len();

    rig.set_gap(150);
    rig.motor.set_running(false);
    let events = rig.ctrl.update();
    assert!(events.is_empty(), "no terminal event on restart: {events:?}");
    assert_eq!(rig.ctrl.mode(), MovingMode::MoveToDdd);
    assert_eq!(rig.motor.commands().len(), commands_before + 1);
    assert!(rig.motor.is_running());
}

#[test]
fn stop_is_idempotent_and_reports_once() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_to_ddd_value(500).unwrap();
    rig.ctrl.take_events();

    rig.ctrl.stop();
    assert_eq!(rig.ctrl.take_events(), vec![MotionEvent::Stopped]);
    assert_eq!(rig.ctrl.mode(), MovingMode::Idle);

    rig.ctrl.stop();
    assert!(rig.ctrl.take_events().is_empty());
    assert_eq!(rig.ctrl.mode(), MovingMode::Idle);
    assert!(!rig.ctrl.is_failed());
}

#[test]
fn sensor_loss_while_moving_fails_and_stops() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_to_ddd_value(500).unwrap();
    rig.ctrl.take_events();

    rig.fine.set_failed(true);
    let events = rig.ctrl.update();
    assert_eq!(events, vec![MotionEvent::Failed(FailureKind::NoSensor)]);
    assert!(rig.ctrl.flags().no_sensor);
    assert!(!rig.motor.is_running());
    assert_eq!(rig.ctrl.mode(), MovingMode::Idle);
}

#[test]
fn absolute_timeout_fails_the_move() {
    let mut rig = Rig::at_gap(0);
    // Progress never fires a blockage here; the mechanism keeps creeping.
    rig.ctrl.move_to_ddd_value(800).unwrap();
    rig.ctrl.take_events();

    let mut gap = 0;
    let mut failed = Vec::new();
    for _ in 0..40 {
        gap += 20;
        rig.set_gap(gap.min(700));
        let events = rig.progress_tick();
        if !events.is_empty() {
            failed = events;
            break;
        }
    }
    // 38 ticks of 400 ms pass the 15 s absolute timeout.
    assert_eq!(failed, vec![MotionEvent::Failed(FailureKind::Timeout)]);
    assert!(rig.ctrl.flags().timeout);
}

#[test]
fn failure_flags_clear_on_the_next_command() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_to_ddd_value(500).unwrap();
    rig.ctrl.take_events();
    rig.fine.set_failed(true);
    rig.ctrl.update();
    assert!(rig.ctrl.flags().no_sensor);

    rig.fine.set_failed(false);
    rig.set_gap(100);
    rig.ctrl.move_to_ddd_value(300).unwrap();
    assert!(!rig.ctrl.is_failed());
    assert_eq!(rig.ctrl.take_events(), vec![MotionEvent::Started]);
}

#[test]
fn move_steps_with_failed_sensors_reports_no_sensor() {
    let mut rig = Rig::at_gap(100);
    rig.fine.set_failed(true);
    rig.ctrl.move_steps(1000, 200, 1600, false, false).unwrap();
    assert_eq!(
        rig.ctrl.take_events(),
        vec![MotionEvent::Failed(FailureKind::NoSensor)]
    );
    assert!(rig.motor.commands().is_empty());
}

#[test]
fn move_steps_can_ignore_sensor_failure() {
    let mut rig = Rig::at_gap(100);
    rig.fine.set_failed(true);
    rig.ctrl.move_steps(-1000, 200, 1600, true, true).unwrap();
    let cmd = rig.motor.last_command().unwrap();
    assert!(cmd.reverse);
    assert_eq!(cmd.steps, Some(1000));
    assert_eq!(rig.ctrl.take_events(), vec![MotionEvent::Started]);
}

#[test]
fn move_steps_to_ddd_value_scales_by_microsteps() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_steps_to_ddd_value(150).unwrap();
    let cmd = rig.motor.last_command().unwrap();
    assert!(!cmd.reverse);
    assert_eq!(cmd.steps, Some(50 * 20));
}

#[test]
fn target_nudges_only_retarget_a_running_seek() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_to_ddd_value(500).unwrap();
    let commands = rig.motor.commands().len();

    rig.ctrl.increment_target().unwrap();
    rig.ctrl.increment_target().unwrap();
    assert_eq!(rig.ctrl.target(), 502);
    assert_eq!(rig.motor.commands().len(), commands, "no extra motor start");

    // Idle controller: a nudge is a fresh move.
    rig.ctrl.stop();
    rig.ctrl.take_events();
    rig.ctrl.decrement_target().unwrap();
    assert_eq!(rig.ctrl.target(), 501);
    assert_eq!(rig.motor.commands().len(), commands + 1);
}

#[test]
fn target_nudges_during_open_loop_moves_only_store_the_target() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_steps(1000, 200, 1600, false, false).unwrap();
    rig.ctrl.take_events();
    let commands = rig.motor.commands().len();

    rig.ctrl.increment_target().unwrap();
    assert_eq!(rig.ctrl.target(), 101);
    assert_eq!(rig.ctrl.mode(), MovingMode::MoveSteps, "open-loop move kept");
    assert_eq!(rig.motor.commands().len(), commands, "no override issued");
    assert!(rig.motor.is_running());
    assert!(rig.ctrl.take_events().is_empty());
}

#[test]
fn target_nudges_clamp_at_scale_ends() {
    let mut rig = Rig::at_gap(799);
    rig.ctrl.move_to_ddd_value(800).unwrap();
    rig.ctrl.increment_target().unwrap();
    assert_eq!(rig.ctrl.target(), 800);

    let mut rig = Rig::at_gap(1);
    rig.ctrl.move_to_ddd_value(0).unwrap();
    rig.ctrl.decrement_target().unwrap();
    assert_eq!(rig.ctrl.target(), 0);
}

#[test]
fn progress_tick_reenters_on_band_change() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_to_ddd_value(200).unwrap();
    assert_eq!(rig.motor.last_command().unwrap().run_freq, 1600);

    rig.set_gap(170); // distance 30: half-speed band
    rig.progress_tick();
    let cmd = rig.motor.last_command().unwrap();
    assert_eq!(cmd.run_freq, 800);
    assert!(!cmd.reverse);
}

#[test]
fn progress_tick_reenters_on_overshoot() {
    let mut rig = Rig::at_gap(100);
    rig.ctrl.move_to_ddd_value(200).unwrap();

    rig.set_gap(210); // past the target
    rig.progress_tick();
    let cmd = rig.motor.last_command().unwrap();
    assert!(cmd.reverse);
    assert_eq!(cmd.run_freq, 400);
}

#[test]
fn noise_guard_prefers_raw_when_filter_lags() {
    let mut rig = Rig::at_gap(100);
    // Filtered reading stays at 100 but the raw gap is already 130.
    let (fine_raw, coarse_raw) = angles_for_gap(130.5);
    rig.fine.set_raw_10th(fine_raw);
    rig.coarse.set_raw_10th(coarse_raw);
    rig.ctrl.fusion_mut().update();

    // Divergence 30 > noise guard 20: direction comes from the raw value,
    // so a target of 110 means moving backwards from 130.
    rig.ctrl.move_to_ddd_value(110).unwrap();
    let cmd = rig.motor.last_command().unwrap();
    assert!(cmd.reverse);
    assert_eq!(cmd.run_freq, 400);
}

#[test]
fn suppressed_blockage_leaves_timeout_in_charge() {
    let cfg = MotionCfg {
        suppress_blockage: true,
        ..MotionCfg::default()
    };
    let mut rig = Rig::with_cfg(100, cfg);
    rig.ctrl.move_to_ddd_value(500).unwrap();
    rig.ctrl.take_events();

    // Ten stalled progress periods, far past either blockage limit.
    for _ in 0..10 {
        let events = rig.progress_tick();
        assert!(events.is_empty(), "unexpected events: {events:?}");
    }
    assert!(!rig.ctrl.flags().blockage);
    assert_eq!(rig.ctrl.mode(), MovingMode::MoveToDdd);
}

#[test]
fn default_constants_complete_a_full_sweep_inside_the_timeout() {
    // The mechanism advances run_freq / microsteps_per_unit units per second
    // (80 with the defaults); the whole 0..=800 travel has to finish before
    // the 15 s absolute watchdog.
    let mut rig = Rig::at_gap(0);
    rig.ctrl.move_to_ddd_value(800).unwrap();
    rig.ctrl.take_events();

    let mut gap = 0;
    let mut events = Vec::new();
    for _ in 0..40 {
        // Units covered in one 400 ms progress period at the commanded rate.
        let freq = rig.motor.last_command().unwrap().run_freq as i32;
        gap = (gap + freq / 50).min(800);
        rig.set_gap(gap);
        events = rig.progress_tick();
        if !events.is_empty() {
            break;
        }
    }
    assert_eq!(events, vec![MotionEvent::Stopped]);
    assert_eq!(rig.ctrl.mode(), MovingMode::Idle);
    assert!(!rig.motor.is_running());
}
