//! Meta-sequence state machine of the endurance test.
//!
//! Pure data: transitions return the next state plus whether the full stress
//! sequence wrapped around (which increments the total-cycle counter).

use crate::config::EnduranceCfg;

/// Overall test-sequence state; lifecycle spans one full endurance-test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetaState {
    #[default]
    Idle,
    Manual,
    StepsTest,
    StressStep0to200,
    StressStep200to400,
    StressStep400to600,
    StressStep600to800,
    StressStep0to800,
}

/// One closed-loop leg of the sequence: the gap range cycled between and the
/// number of cycles to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leg {
    pub start_gap: i32,
    pub stop_gap: i32,
    pub cycles: u32,
}

impl MetaState {
    pub fn is_running(self) -> bool {
        self != Self::Idle
    }

    pub fn is_stress(self) -> bool {
        matches!(
            self,
            Self::StressStep0to200
                | Self::StressStep200to400
                | Self::StressStep400to600
                | Self::StressStep600to800
                | Self::StressStep0to800
        )
    }

    /// The closed-loop leg this state runs, if any. `StepsTest` moves by raw
    /// step counts and has no gap range; `Idle` runs nothing.
    pub fn leg(self, cfg: &EnduranceCfg) -> Option<Leg> {
        match self {
            Self::Idle | Self::StepsTest => None,
            Self::Manual => Some(Leg {
                start_gap: cfg.manual_start_gap,
                stop_gap: cfg.manual_stop_gap,
                cycles: cfg.manual_cycles,
            }),
            Self::StressStep0to200 => Some(Leg {
                start_gap: 0,
                stop_gap: 210,
                cycles: cfg.stress_cycles,
            }),
            Self::StressStep200to400 => Some(Leg {
                start_gap: 190,
                stop_gap: 410,
                cycles: cfg.stress_cycles,
            }),
            Self::StressStep400to600 => Some(Leg {
                start_gap: 390,
                stop_gap: 610,
                cycles: cfg.stress_cycles,
            }),
            Self::StressStep600to800 => Some(Leg {
                start_gap: 590,
                stop_gap: 800,
                cycles: cfg.stress_cycles,
            }),
            // Full-travel sweep, once per sequence loop.
            Self::StressStep0to800 => Some(Leg {
                start_gap: 0,
                stop_gap: 800,
                cycles: 1,
            }),
        }
    }

    /// Advance after a completed run of the current state. The bool reports
    /// that the stress sequence wrapped back to its first step.
    pub fn advance(self) -> (Self, bool) {
        match self {
            Self::Idle => (Self::Idle, false),
            Self::Manual | Self::StepsTest => (Self::Idle, false),
            Self::StressStep0to200 => (Self::StressStep200to400, false),
            Self::StressStep200to400 => (Self::StressStep400to600, false),
            Self::StressStep400to600 => (Self::StressStep600to800, false),
            Self::StressStep600to800 => (Self::StressStep0to800, false),
            Self::StressStep0to800 => (Self::StressStep0to200, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stress_sequence_loops_with_wrap_marker() {
        let mut state = MetaState::StressStep0to200;
        let order = [
            MetaState::StressStep200to400,
            MetaState::StressStep400to600,
            MetaState::StressStep600to800,
            MetaState::StressStep0to800,
            MetaState::StressStep0to200,
        ];
        for (i, expected) in order.iter().enumerate() {
            let (next, wrapped) = state.advance();
            assert_eq!(next, *expected);
            assert_eq!(wrapped, i == order.len() - 1, "wrap only on the last step");
            state = next;
        }
    }

    #[test]
    fn one_shot_modes_return_to_idle() {
        assert_eq!(MetaState::Manual.advance(), (MetaState::Idle, false));
        assert_eq!(MetaState::StepsTest.advance(), (MetaState::Idle, false));
        assert_eq!(MetaState::Idle.advance(), (MetaState::Idle, false));
    }

    #[test]
    fn stress_ranges_overlap_as_configured() {
        let cfg = EnduranceCfg::default();
        let leg = |m: MetaState| m.leg(&cfg).unwrap();
        assert_eq!(leg(MetaState::StressStep0to200).start_gap, 0);
        assert_eq!(leg(MetaState::StressStep0to200).stop_gap, 210);
        assert_eq!(leg(MetaState::StressStep200to400).start_gap, 190);
        assert_eq!(leg(MetaState::StressStep200to400).stop_gap, 410);
        assert_eq!(leg(MetaState::StressStep400to600).start_gap, 390);
        assert_eq!(leg(MetaState::StressStep400to600).stop_gap, 610);
        assert_eq!(leg(MetaState::StressStep600to800).start_gap, 590);
        assert_eq!(leg(MetaState::StressStep600to800).stop_gap, 800);
        assert_eq!(leg(MetaState::StressStep0to800).cycles, 1);
        assert!(MetaState::StepsTest.leg(&cfg).is_none());
    }
}
