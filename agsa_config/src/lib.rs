#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! TOML configuration schema for the AGSA motion core.
//!
//! Deserialized from TOML and validated; the CLI converts the result into the
//! runtime structs in `agsa_core::config`.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("toml parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub motion: Motion,
    pub fusion: Fusion,
    pub endurance: Endurance,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Motion {
    /// Ramp start frequency in steps per second.
    pub start_freq: u32,
    /// Full seek frequency in steps per second.
    pub run_freq: u32,
    /// Reduced step rate for the final approach.
    pub approach_freq: u32,
    /// Ramp length in steps handed to the driver.
    pub ramp_steps: u32,
    /// Microsteps per device unit for open-loop estimates.
    pub microsteps_per_unit: i32,
    /// Self-stop acceptance window around the target, device units.
    pub target_tolerance: i32,
}

impl Default for Motion {
    fn default() -> Self {
        Self {
            start_freq: 200,
            run_freq: 1600,
            approach_freq: 400,
            ramp_steps: 50,
            microsteps_per_unit: 20,
            target_tolerance: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Fusion {
    pub fine_gear_ratio: f64,
    pub coarse_gear_ratio: f64,
    /// Wrap-reconciliation acceptance window, tenths of a degree.
    pub accept_window_10th: i32,
}

impl Default for Fusion {
    fn default() -> Self {
        Self {
            fine_gear_ratio: 6.06,
            coarse_gear_ratio: 1.02,
            accept_window_10th: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Endurance {
    pub manual_start_gap: i32,
    pub manual_stop_gap: i32,
    pub manual_cycles: u32,
    pub steps_test_steps: u32,
    pub steps_test_cycles: u32,
    pub stress_cycles: u32,
    pub device_serial: String,
    pub log_dir: String,
    pub archive_dir: String,
}

impl Default for Endurance {
    fn default() -> Self {
        Self {
            manual_start_gap: 0,
            manual_stop_gap: 800,
            manual_cycles: 100,
            steps_test_steps: 4_000,
            steps_test_cycles: 100,
            stress_cycles: 200,
            device_serial: String::from("unknown"),
            log_dir: String::from("agsa_logs"),
            archive_dir: String::from("agsa_logs/archive"),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.motion.start_freq == 0 || self.motion.run_freq == 0 || self.motion.approach_freq == 0
        {
            return Err(ConfigError::Invalid("frequencies must be positive"));
        }
        if self.motion.approach_freq > self.motion.run_freq {
            return Err(ConfigError::Invalid(
                "approach_freq must not exceed run_freq",
            ));
        }
        if self.motion.microsteps_per_unit <= 0 {
            return Err(ConfigError::Invalid("microsteps_per_unit must be positive"));
        }
        if self.motion.target_tolerance < 0 {
            return Err(ConfigError::Invalid("target_tolerance must not be negative"));
        }
        if self.fusion.fine_gear_ratio <= 0.0
            || !self.fusion.fine_gear_ratio.is_finite()
            || self.fusion.coarse_gear_ratio <= 0.0
            || !self.fusion.coarse_gear_ratio.is_finite()
        {
            return Err(ConfigError::Invalid("gear ratios must be positive"));
        }
        if self.fusion.accept_window_10th <= 0 {
            return Err(ConfigError::Invalid("accept_window_10th must be positive"));
        }
        let e = &self.endurance;
        if !(0..=800).contains(&e.manual_start_gap) || !(0..=800).contains(&e.manual_stop_gap) {
            return Err(ConfigError::Invalid("manual gaps must be within 0..=800"));
        }
        if e.manual_start_gap >= e.manual_stop_gap {
            return Err(ConfigError::Invalid(
                "manual_start_gap must be below manual_stop_gap",
            ));
        }
        if e.manual_cycles == 0 || e.steps_test_cycles == 0 || e.stress_cycles == 0 {
            return Err(ConfigError::Invalid("cycle counts must be positive"));
        }
        if e.steps_test_steps == 0 {
            return Err(ConfigError::Invalid("steps_test_steps must be positive"));
        }
        Ok(())
    }
}
