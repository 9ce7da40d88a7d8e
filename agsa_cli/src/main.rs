mod cli;
mod run;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

use cli::{Args, Command};

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("reading config {}", path.display()))?;
            agsa_config::Config::from_toml(&text).wrap_err("parsing config")?
        }
        None => agsa_config::Config::default(),
    };

    let mut session = run::open_session(&config, args.sim_position)?;
    match args.command {
        Command::Move { target } => run::run_move(&mut session, target),
        Command::Steps { count } => run::run_steps(&mut session, count, &config),
        Command::Calibrate => run::run_calibrate(&mut session),
        Command::Endurance { mode, cycles } => {
            run::run_endurance(&mut session, &config, mode, cycles)
        }
    }
}
