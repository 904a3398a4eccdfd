//! Pipeline state machine.
//!
//! One explicit enum replaces the isStarting/isRendering/isStopping flag
//! combinations this design descends from: every combination that used
//! to be ambiguous is now unrepresentable.

use serde::{Deserialize, Serialize};

/// Lifecycle of the hardware render path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PipelineState {
    /// No output unit exists; nothing is audible.
    #[default]
    Idle,
    /// Output unit is being configured/started (transient).
    Starting,
    /// The callback is being serviced at hardware cadence.
    Running,
    /// Output unit is being stopped and torn down (transient).
    Stopping,
}

impl PipelineState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            PipelineState::Idle => 0,
            PipelineState::Starting => 1,
            PipelineState::Running => 2,
            PipelineState::Stopping => 3,
        }
    }

    pub(crate) fn from_u8(val: u8) -> Self {
        match val {
            1 => PipelineState::Starting,
            2 => PipelineState::Running,
            3 => PipelineState::Stopping,
            _ => PipelineState::Idle,
        }
    }

    /// Starting or Stopping: a transition is in flight and further
    /// requests queue behind it.
    pub fn is_transient(self) -> bool {
        matches!(self, PipelineState::Starting | PipelineState::Stopping)
    }
}

/// Events driving the pipeline lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A play request needs the output unit up.
    StartRequested,
    /// The output unit came up.
    StartSucceeded,
    /// The output unit could not be started.
    StartFailed,
    /// The last active track went away.
    StopRequested,
    /// The output unit is down and torn down.
    StopCompleted,
}

/// Result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Event did not apply in the current state (re-entrancy guard).
    None,
    Changed(PipelineState),
}

/// Pure pipeline state machine; the sequencer owns the side effects.
#[derive(Debug, Default)]
pub struct PipelineFsm {
    state: PipelineState,
}

impl PipelineFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn transition(&mut self, event: PipelineEvent) -> Transition {
        use PipelineEvent::*;
        use PipelineState::*;

        let next = match (self.state, event) {
            (Idle, StartRequested) => Some(Starting),
            (Starting, StartSucceeded) => Some(Running),
            (Starting, StartFailed) => Some(Idle),
            (Running, StopRequested) => Some(Stopping),
            (Stopping, StopCompleted) => Some(Idle),
            // Everything else is a duplicate or out-of-order event
            _ => None,
        };

        match next {
            Some(state) => {
                self.state = state;
                Transition::Changed(state)
            }
            None => Transition::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut fsm = PipelineFsm::new();
        assert_eq!(fsm.state(), PipelineState::Idle);

        assert_eq!(
            fsm.transition(PipelineEvent::StartRequested),
            Transition::Changed(PipelineState::Starting)
        );
        assert_eq!(
            fsm.transition(PipelineEvent::StartSucceeded),
            Transition::Changed(PipelineState::Running)
        );
        assert_eq!(
            fsm.transition(PipelineEvent::StopRequested),
            Transition::Changed(PipelineState::Stopping)
        );
        assert_eq!(
            fsm.transition(PipelineEvent::StopCompleted),
            Transition::Changed(PipelineState::Idle)
        );
    }

    #[test]
    fn test_start_failure_returns_to_idle() {
        let mut fsm = PipelineFsm::new();
        fsm.transition(PipelineEvent::StartRequested);
        assert_eq!(
            fsm.transition(PipelineEvent::StartFailed),
            Transition::Changed(PipelineState::Idle)
        );
    }

    #[test]
    fn test_reentrant_start_is_guarded() {
        let mut fsm = PipelineFsm::new();
        fsm.transition(PipelineEvent::StartRequested);

        // A second start while already starting must not re-execute
        assert_eq!(fsm.transition(PipelineEvent::StartRequested), Transition::None);
        assert_eq!(fsm.state(), PipelineState::Starting);

        fsm.transition(PipelineEvent::StartSucceeded);
        assert_eq!(fsm.transition(PipelineEvent::StartRequested), Transition::None);
        assert_eq!(fsm.state(), PipelineState::Running);
    }

    #[test]
    fn test_out_of_order_events_ignored() {
        let mut fsm = PipelineFsm::new();
        assert_eq!(fsm.transition(PipelineEvent::StartSucceeded), Transition::None);
        assert_eq!(fsm.transition(PipelineEvent::StopRequested), Transition::None);
        assert_eq!(fsm.transition(PipelineEvent::StopCompleted), Transition::None);
        assert_eq!(fsm.state(), PipelineState::Idle);
    }

    #[test]
    fn test_transient_states() {
        assert!(PipelineState::Starting.is_transient());
        assert!(PipelineState::Stopping.is_transient());
        assert!(!PipelineState::Idle.is_transient());
        assert!(!PipelineState::Running.is_transient());
    }

    #[test]
    fn test_u8_round_trip() {
        for state in [
            PipelineState::Idle,
            PipelineState::Starting,
            PipelineState::Running,
            PipelineState::Stopping,
        ] {
            assert_eq!(PipelineState::from_u8(state.to_u8()), state);
        }
    }
}
