//! Table checks for the pure step-machine transition function.

use agsa_core::harness::step::{StepAction, StepContext, StepEffect, transition};
use agsa_core::{StepAction as A, StepState as S};
use rstest::rstest;

fn ctx(steps_mode: bool, cycle: u32, cycle_target: u32) -> StepContext {
    StepContext {
        steps_mode,
        cycle,
        cycle_target,
        continuous_fails: 0,
        abort_limit: 10,
    }
}

#[test]
fn started_enters_the_mode_specific_first_leg() {
    let (next, effects) = transition(S::Idle, A::Started, &ctx(false, 0, 5));
    assert_eq!(next, S::Init);
    assert_eq!(effects, vec![StepEffect::SeekStart, StepEffect::RearmWatchdog]);

    let (next, effects) = transition(S::Idle, A::Started, &ctx(true, 0, 5));
    assert_eq!(next, S::MoveForward);
    assert_eq!(
        effects,
        vec![StepEffect::StepForward, StepEffect::RearmWatchdog]
    );
}

#[test]
fn closed_loop_cycle_counts_on_return_to_start() {
    // Out and back, with cycles still to go.
    let (next, effects) = transition(S::MoveToStop, A::AgsaStopped, &ctx(false, 0, 3));
    assert_eq!(next, S::MoveToStart);
    assert!(effects.contains(&StepEffect::MarkSuccess));
    assert!(!effects.contains(&StepEffect::IncrementCycle));

    let (next, effects) = transition(S::MoveToStart, A::AgsaStopped, &ctx(false, 0, 3));
    assert_eq!(next, S::MoveToStop);
    assert!(effects.contains(&StepEffect::IncrementCycle));
    assert!(effects.contains(&StepEffect::SeekStop));

    // The last return finishes the leg.
    let (next, effects) = transition(S::MoveToStart, A::AgsaStopped, &ctx(false, 2, 3));
    assert_eq!(next, S::Idle);
    assert!(effects.contains(&StepEffect::IncrementCycle));
    assert!(effects.contains(&StepEffect::AdvanceMeta));
}

#[test]
fn retry_keeps_the_state_until_the_budget_is_spent() {
    let mut c = ctx(false, 0, 3);
    c.continuous_fails = 8; // budget 10: this failure is the ninth
    let (next, effects) = transition(S::MoveToStop, A::AgsaFailed, &c);
    assert_eq!(next, S::MoveToStop);
    assert_eq!(
        effects,
        vec![
            StepEffect::CountFailure,
            StepEffect::SeekStop,
            StepEffect::RearmWatchdog
        ]
    );

    c.continuous_fails = 9; // the tenth consecutive failure aborts
    let (next, effects) = transition(S::MoveToStop, A::AgsaFailed, &c);
    assert_eq!(next, S::Idle);
    assert_eq!(effects, vec![StepEffect::CountFailure, StepEffect::AbortTest]);
}

#[test]
fn steps_mode_watchdog_is_completion_not_failure() {
    let (next, effects) = transition(S::MoveForward, A::WatchdogTimeout, &ctx(true, 0, 2));
    assert_eq!(next, S::MoveBackward);
    assert!(effects.contains(&StepEffect::MarkSuccess));
    assert!(!effects.contains(&StepEffect::CountFailure));

    let (next, effects) = transition(S::MoveBackward, A::WatchdogTimeout, &ctx(true, 0, 2));
    assert_eq!(next, S::MoveForward);
    assert!(effects.contains(&StepEffect::IncrementTotal));
    assert!(effects.contains(&StepEffect::IncrementCycle));

    let (next, effects) = transition(S::MoveBackward, A::WatchdogTimeout, &ctx(true, 1, 2));
    assert_eq!(next, S::Idle);
    assert!(effects.contains(&StepEffect::AdvanceMeta));
}

// Every state/action pair, in a mid-run closed-loop context (cycle 0 of 3,
// no failures on the books). Pairs the machine does not declare stay put
// with no effects.
#[rstest]
#[case(S::Idle, A::Started, S::Init, true)]
#[case(S::Idle, A::AgsaStarted, S::Idle, false)]
#[case(S::Idle, A::AgsaStopped, S::Idle, false)]
#[case(S::Idle, A::AgsaFailed, S::Idle, false)]
#[case(S::Idle, A::WatchdogTimeout, S::Idle, false)]
#[case(S::Idle, A::MotorStopped, S::Idle, false)]
#[case(S::Init, A::Started, S::Init, false)]
#[case(S::Init, A::AgsaStarted, S::Init, false)]
#[case(S::Init, A::AgsaStopped, S::MoveToStop, true)]
#[case(S::Init, A::AgsaFailed, S::Init, true)]
#[case(S::Init, A::WatchdogTimeout, S::Init, true)]
#[case(S::Init, A::MotorStopped, S::Init, false)]
#[case(S::MoveToStart, A::Started, S::MoveToStart, false)]
#[case(S::MoveToStart, A::AgsaStarted, S::MoveToStart, false)]
#[case(S::MoveToStart, A::AgsaStopped, S::MoveToStop, true)]
#[case(S::MoveToStart, A::AgsaFailed, S::MoveToStart, true)]
#[case(S::MoveToStart, A::WatchdogTimeout, S::MoveToStart, true)]
#[case(S::MoveToStart, A::MotorStopped, S::MoveToStart, false)]
#[case(S::MoveToStop, A::Started, S::MoveToStop, false)]
#[case(S::MoveToStop, A::AgsaStarted, S::MoveToStop, false)]
#[case(S::MoveToStop, A::AgsaStopped, S::MoveToStart, true)]
#[case(S::MoveToStop, A::AgsaFailed, S::MoveToStop, true)]
#[case(S::MoveToStop, A::WatchdogTimeout, S::MoveToStop, true)]
#[case(S::MoveToStop, A::MotorStopped, S::MoveToStop, false)]
#[case(S::MoveForward, A::Started, S::MoveForward, false)]
#[case(S::MoveForward, A::AgsaStarted, S::MoveForward, false)]
#[case(S::MoveForward, A::AgsaStopped, S::MoveForward, false)]
#[case(S::MoveForward, A::AgsaFailed, S::MoveForward, true)]
#[case(S::MoveForward, A::WatchdogTimeout, S::MoveBackward, true)]
#[case(S::MoveForward, A::MotorStopped, S::MoveForward, false)]
#[case(S::MoveBackward, A::Started, S::MoveBackward, false)]
#[case(S::MoveBackward, A::AgsaStarted, S::MoveBackward, false)]
#[case(S::MoveBackward, A::AgsaStopped, S::MoveBackward, false)]
#[case(S::MoveBackward, A::AgsaFailed, S::MoveBackward, true)]
#[case(S::MoveBackward, A::WatchdogTimeout, S::MoveForward, true)]
#[case(S::MoveBackward, A::MotorStopped, S::MoveBackward, false)]
fn full_transition_table(
    #[case] state: S,
    #[case] action: StepAction,
    #[case] expect: S,
    #[case] declared: bool,
) {
    let (next, effects) = transition(state, action, &ctx(false, 0, 3));
    assert_eq!(next, expect);
    assert_eq!(!effects.is_empty(), declared, "effects: {effects:?}");
}
