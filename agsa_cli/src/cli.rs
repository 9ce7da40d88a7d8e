use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Motion-control CLI for the AGSA grinding-gap actuator (simulated hardware).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML config file; defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Starting gap position of the simulated mechanism.
    #[arg(long, default_value_t = 400.0)]
    pub sim_position: f64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Closed-loop move to a gap value on the 0-800 scale.
    Move {
        #[arg(long)]
        target: i32,
    },
    /// Open-loop move by a signed microstep count.
    Steps {
        #[arg(long)]
        count: i32,
    },
    /// Run the DDD self-calibration and persist the offsets.
    Calibrate,
    /// Run an endurance test until it finishes or Ctrl-C.
    Endurance {
        #[arg(long, value_enum, default_value_t = ModeArg::Stress)]
        mode: ModeArg,
        /// Override the configured cycle count (manual/steps modes).
        #[arg(long)]
        cycles: Option<u32>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Manual,
    Steps,
    Stress,
}
