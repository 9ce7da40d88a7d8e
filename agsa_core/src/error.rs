use thiserror::Error;

/// The three sticky motion failure kinds.
///
/// Each is independent and cleared only by the next accepted motion command.
/// Any one being set is fatal to the current motion attempt but not to the
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Absolute watchdog elapsed without reaching the goal.
    Timeout,
    /// Position static beyond the context-sensitive tolerance.
    Blockage,
    /// Sensor pair failed while actuating.
    NoSensor,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Blockage => write!(f, "blockage"),
            Self::NoSensor => write!(f, "no sensor"),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum AgsaError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("motion failure: {0}")]
    Motion(FailureKind),
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing fine sensor")]
    MissingFineSensor,
    #[error("missing coarse sensor")]
    MissingCoarseSensor,
    #[error("missing motor driver")]
    MissingMotor,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Map a boxed hardware error from a trait seam into a typed `AgsaError`.
pub(crate) fn map_hw_error(e: &(dyn std::error::Error + Send + Sync)) -> AgsaError {
    AgsaError::Hardware(e.to_string())
}
