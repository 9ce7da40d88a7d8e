//! Per-cycle step state machine of the endurance test.
//!
//! `transition` is a pure function over (state, action, context); the harness
//! shell interprets the returned effects. Undeclared action/state pairs stay
//! in place with no effects.

/// Per-cycle harness state; reset to `Idle` when a test stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepState {
    #[default]
    Idle,
    /// Initial travel to the leg's start gap.
    Init,
    MoveToStart,
    MoveToStop,
    MoveForward,
    MoveBackward,
}

impl StepState {
    /// Stable ordinal written into the CSV log.
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Init => 1,
            Self::MoveToStart => 2,
            Self::MoveToStop => 3,
            Self::MoveForward => 4,
            Self::MoveBackward => 5,
        }
    }

    pub fn is_moving(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Inputs driving the step machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// The test (or the next meta step) was started.
    Started,
    /// The controller accepted a motion command.
    AgsaStarted,
    /// The controller finished a motion cleanly.
    AgsaStopped,
    /// The controller raised a failure flag.
    AgsaFailed,
    /// The harness watchdog elapsed without hearing back.
    WatchdogTimeout,
    /// The raw motor-stop observation (informational).
    MotorStopped,
}

/// Context the transition function needs but does not own.
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    /// Steps-test mode (open-loop legs alternating on the watchdog).
    pub steps_mode: bool,
    /// Completed cycles in the current leg.
    pub cycle: u32,
    /// Cycles the current leg must complete.
    pub cycle_target: u32,
    /// Failures since the last success.
    pub continuous_fails: u32,
    /// Consecutive failures at which the whole test aborts.
    pub abort_limit: u32,
}

/// Effects the harness shell performs after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEffect {
    /// Closed-loop move to the leg's start gap.
    SeekStart,
    /// Closed-loop move to the leg's stop gap.
    SeekStop,
    /// Open-loop forward leg (steps test).
    StepForward,
    /// Open-loop backward leg (steps test).
    StepBackward,
    /// A leg completed successfully; reset the continuous-failure count.
    MarkSuccess,
    /// One start↔stop (or forward/backward) cycle completed.
    IncrementCycle,
    /// One full-sequence loop (stress) or backward completion (steps test).
    IncrementTotal,
    /// Count a failure into both failure counters.
    CountFailure,
    /// Current meta step is done; advance the meta machine.
    AdvanceMeta,
    /// Too many consecutive failures; abort the whole test.
    AbortTest,
    /// Re-arm the harness watchdog.
    RearmWatchdog,
}

pub fn transition(
    state: StepState,
    action: StepAction,
    ctx: &StepContext,
) -> (StepState, Vec<StepEffect>) {
    use StepAction as A;
    use StepEffect as E;
    use StepState as S;

    match (state, action) {
        (S::Idle, A::Started) => {
            if ctx.steps_mode {
                (S::MoveForward, vec![E::StepForward, E::RearmWatchdog])
            } else {
                (S::Init, vec![E::SeekStart, E::RearmWatchdog])
            }
        }

        (S::Init, A::AgsaStopped) => {
            if ctx.cycle < ctx.cycle_target {
                (S::MoveToStop, vec![E::MarkSuccess, E::SeekStop, E::RearmWatchdog])
            } else {
                (S::Idle, vec![E::MarkSuccess, E::AdvanceMeta])
            }
        }
        (S::Init, A::AgsaFailed | A::WatchdogTimeout) => retry(state, E::SeekStart, ctx),

        (S::MoveToStop, A::AgsaStopped) => (
            S::MoveToStart,
            vec![E::MarkSuccess, E::SeekStart, E::RearmWatchdog],
        ),
        (S::MoveToStop, A::AgsaFailed | A::WatchdogTimeout) => retry(state, E::SeekStop, ctx),

        // Arrival back at the start gap completes one cycle.
        (S::MoveToStart, A::AgsaStopped) => {
            if ctx.cycle + 1 >= ctx.cycle_target {
                (
                    S::Idle,
                    vec![E::MarkSuccess, E::IncrementCycle, E::AdvanceMeta],
                )
            } else {
                (
                    S::MoveToStop,
                    vec![
                        E::MarkSuccess,
                        E::IncrementCycle,
                        E::SeekStop,
                        E::RearmWatchdog,
                    ],
                )
            }
        }
        (S::MoveToStart, A::AgsaFailed | A::WatchdogTimeout) => retry(state, E::SeekStart, ctx),

        // Steps test: legs alternate on the harness watchdog, which doubles
        // as the leg-complete signal for the open-loop move.
        (S::MoveForward, A::WatchdogTimeout) => (
            S::MoveBackward,
            vec![E::MarkSuccess, E::StepBackward, E::RearmWatchdog],
        ),
        (S::MoveForward, A::AgsaFailed) => retry(state, E::StepForward, ctx),

        (S::MoveBackward, A::WatchdogTimeout) => {
            if ctx.cycle + 1 >= ctx.cycle_target {
                (
                    S::Idle,
                    vec![
                        E::MarkSuccess,
                        E::IncrementTotal,
                        E::IncrementCycle,
                        E::AdvanceMeta,
                    ],
                )
            } else {
                (
                    S::MoveForward,
                    vec![
                        E::MarkSuccess,
                        E::IncrementTotal,
                        E::IncrementCycle,
                        E::StepForward,
                        E::RearmWatchdog,
                    ],
                )
            }
        }
        (S::MoveBackward, A::AgsaFailed) => retry(state, E::StepBackward, ctx),

        // Everything else stays put.
        _ => (state, Vec::new()),
    }
}

/// A failure (controller or harness watchdog) retries the current leg until
/// the consecutive-failure budget is spent, then aborts the whole test.
fn retry(state: StepState, again: StepEffect, ctx: &StepContext) -> (StepState, Vec<StepEffect>) {
    use StepEffect as E;
    if ctx.continuous_fails + 1 >= ctx.abort_limit {
        (StepState::Idle, vec![E::CountFailure, E::AbortTest])
    } else {
        (state, vec![E::CountFailure, again, E::RearmWatchdog])
    }
}
