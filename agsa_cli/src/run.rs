//! Cooperative run loops driving the core against the simulated hardware.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::{Result, WrapErr};

use agsa_core::motion::MotionController;
use agsa_core::{EnduranceCfg, EnduranceTest, FusionCfg, MotionCfg, MotionEvent, TestMode};
use agsa_hardware::{LogEventSink, MemoryCalibrationStore, SimAgsaMotor, SimAngleSensor, SimPlant};

use crate::cli::ModeArg;

/// Simulation tick; also the controller update cadence.
const TICK_MS: u64 = 20;

type SimController = MotionController<SimAngleSensor, SimAngleSensor, SimAgsaMotor>;

pub struct Session {
    pub plant: SimPlant,
    pub controller: SimController,
    pub interrupted: Arc<AtomicBool>,
}

pub fn motion_cfg(cfg: &agsa_config::Config) -> MotionCfg {
    MotionCfg {
        start_freq: cfg.motion.start_freq,
        run_freq: cfg.motion.run_freq,
        approach_freq: cfg.motion.approach_freq,
        ramp_steps: cfg.motion.ramp_steps,
        microsteps_per_unit: cfg.motion.microsteps_per_unit,
        target_tolerance: cfg.motion.target_tolerance,
        ..MotionCfg::default()
    }
}

pub fn fusion_cfg(cfg: &agsa_config::Config) -> FusionCfg {
    FusionCfg {
        fine_gear_ratio: cfg.fusion.fine_gear_ratio,
        coarse_gear_ratio: cfg.fusion.coarse_gear_ratio,
        accept_window_10th: cfg.fusion.accept_window_10th,
    }
}

pub fn endurance_cfg(cfg: &agsa_config::Config, cycles: Option<u32>) -> EnduranceCfg {
    let e = &cfg.endurance;
    EnduranceCfg {
        manual_start_gap: e.manual_start_gap,
        manual_stop_gap: e.manual_stop_gap,
        manual_cycles: cycles.unwrap_or(e.manual_cycles),
        steps_test_steps: e.steps_test_steps,
        steps_test_cycles: cycles.unwrap_or(e.steps_test_cycles),
        stress_cycles: e.stress_cycles,
        start_freq: cfg.motion.start_freq,
        run_freq: cfg.motion.run_freq,
        approach_freq: cfg.motion.approach_freq,
        device_serial: e.device_serial.clone(),
        log_dir: PathBuf::from(&e.log_dir),
        archive_dir: PathBuf::from(&e.archive_dir),
        ..EnduranceCfg::default()
    }
}

pub fn open_session(cfg: &agsa_config::Config, sim_position: f64) -> Result<Session> {
    let plant = SimPlant::new(sim_position, cfg.motion.microsteps_per_unit.unsigned_abs());
    let controller = MotionController::builder()
        .with_fine_sensor(plant.fine_sensor())
        .with_coarse_sensor(plant.coarse_sensor())
        .with_motor(plant.motor())
        .with_fusion_cfg(fusion_cfg(cfg))
        .with_motion_cfg(motion_cfg(cfg))
        .build()
        .wrap_err("building motion controller")?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })
    .wrap_err("installing ctrl-c handler")?;

    Ok(Session {
        plant,
        controller,
        interrupted,
    })
}

impl Session {
    fn tick(&mut self) -> Vec<MotionEvent> {
        std::thread::sleep(Duration::from_millis(TICK_MS));
        self.plant.tick(TICK_MS);
        self.controller.fusion_mut().update();
        self.controller.update()
    }

    /// Run until the controller goes quiet; report the terminal event.
    fn run_to_rest(&mut self) -> Result<()> {
        loop {
            if self.interrupted.load(Ordering::Relaxed) {
                self.controller.stop();
                tracing::info!("interrupted; motor stopped");
                return Ok(());
            }
            for event in self.tick() {
                match event {
                    MotionEvent::Started => {}
                    MotionEvent::Stopped => {
                        println!(
                            "stopped at gap {} (raw {})",
                            self.controller.fusion().ddd_value(),
                            self.controller.fusion().raw_ddd_value()
                        );
                        return Ok(());
                    }
                    MotionEvent::Failed(kind) => {
                        eyre::bail!("motion failed: {kind}");
                    }
                }
            }
        }
    }
}

pub fn run_move(session: &mut Session, target: i32) -> Result<()> {
    println!(
        "moving from gap {} to {target}",
        session.controller.fusion().ddd_value()
    );
    session.controller.move_to_ddd_value(target)?;
    session.run_to_rest()
}

pub fn run_steps(session: &mut Session, count: i32, cfg: &agsa_config::Config) -> Result<()> {
    println!("open-loop move of {count} microsteps");
    session
        .controller
        .move_steps(count, cfg.motion.start_freq, cfg.motion.run_freq, false, false)?;
    session.run_to_rest()
}

pub fn run_calibrate(session: &mut Session) -> Result<()> {
    let mut store = MemoryCalibrationStore::default();
    let mut sink = LogEventSink;
    session
        .controller
        .fusion_mut()
        .calibrate(&mut store, &mut sink)?;
    println!("calibration done; offsets {:?}", {
        use agsa_traits::CalibrationStore;
        store.offsets_10th()
    });
    Ok(())
}

pub fn run_endurance(
    session: &mut Session,
    cfg: &agsa_config::Config,
    mode: ModeArg,
    cycles: Option<u32>,
) -> Result<()> {
    let mode = match mode {
        ModeArg::Manual => TestMode::Manual,
        ModeArg::Steps => TestMode::Steps,
        ModeArg::Stress => TestMode::Stress,
    };
    let mut harness = EnduranceTest::new(endurance_cfg(cfg, cycles));
    harness.start(&mut session.controller, mode);

    while harness.is_running() {
        if session.interrupted.load(Ordering::Relaxed) {
            harness.stop_test(&mut session.controller);
            break;
        }
        std::thread::sleep(Duration::from_millis(TICK_MS));
        session.plant.tick(TICK_MS);
        session.controller.fusion_mut().update();
        for event in session.controller.update() {
            harness.on_motion_event(&mut session.controller, event);
        }
        harness.update(&mut session.controller);
    }

    println!(
        "endurance test finished: {} cycles, {} total, {} failures",
        harness.cycle(),
        harness.total_cycles(),
        harness.fail_count()
    );
    Ok(())
}
