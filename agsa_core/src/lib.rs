#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Motion-control core for the motorized grinding-gap actuator (AGSA).
//!
//! Hardware-agnostic: all hardware interactions go through the
//! `agsa_traits::AngleSensor` / `agsa_traits::MotorDriver` seams.
//!
//! ## Architecture
//!
//! - **Fusion**: dual rotary-sensor reconciliation into device units
//!   (`fusion` module)
//! - **Motion**: closed-loop seek / open-loop stepping with blockage, timeout
//!   and sensor-loss watchdogs (`motion` module)
//! - **Harness**: endurance-test meta + step state machines with failure
//!   counting and rotating CSV logs (`harness` module)
//! - **Scheduler**: explicit arm/disarm timers for the cooperative,
//!   single-threaded core (`scheduler` module)
//!
//! ## Units
//!
//! Gap positions are integer device units on the 0–800 Hemro scale; sensor
//! angles are integer tenths of a degree. Both stay in `i32` end to end.

pub mod config;
pub mod error;
pub mod fusion;
pub mod harness;
pub mod mocks;
pub mod motion;
pub mod scheduler;

pub use config::{EnduranceCfg, FusionCfg, MotionCfg};
pub use error::{AgsaError, BuildError, FailureKind, Result};
pub use fusion::{GAP_MAX, SensorFusion};
pub use harness::{EnduranceTest, MetaState, StepAction, StepState, TestMode};
pub use motion::{FailureFlags, MotionController, MotionEvent, MovingMode};
