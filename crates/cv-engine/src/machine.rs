//! Generic state machine
//!
//! One type serves frames and tabs alike; what happens after a state change
//! is supplied by a [`StateObserver`].

use crate::state::{Transition, VerificationState};

/// Notified after every effective state change
pub trait StateObserver {
    fn on_state_updated(&mut self, previous: VerificationState, current: VerificationState);
}

/// Observer for machines whose changes need no side effect
impl StateObserver for () {
    fn on_state_updated(&mut self, _previous: VerificationState, _current: VerificationState) {}
}

/// State machine starting in [`VerificationState::Start`]
#[derive(Debug, Default)]
pub struct StateMachine<O> {
    state: VerificationState,
    observer: O,
}

impl<O: StateObserver> StateMachine<O> {
    pub fn new(observer: O) -> Self {
        Self {
            state: VerificationState::Start,
            observer,
        }
    }

    pub fn state(&self) -> VerificationState {
        self.state
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Request a move to `target`.
    ///
    /// Returns the new state when it changed. Self-transitions and rejected
    /// moves return `None` and do not reach the observer.
    pub fn update_state(&mut self, target: VerificationState) -> Option<VerificationState> {
        let next = match self.state.resolve(target) {
            Transition::Accept(next) => next,
            Transition::Redirect(next) => {
                tracing::debug!("{} -> {} redirected to {}", self.state, target, next);
                next
            }
            Transition::Reject => {
                tracing::debug!("{} -> {} rejected", self.state, target);
                return None;
            }
        };

        if next == self.state {
            return None;
        }

        let previous = std::mem::replace(&mut self.state, next);
        self.observer.on_state_updated(previous, next);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VerificationState::*;

    #[derive(Default)]
    struct Recorder(Vec<(VerificationState, VerificationState)>);

    impl StateObserver for Recorder {
        fn on_state_updated(&mut self, previous: VerificationState, current: VerificationState) {
            self.0.push((previous, current));
        }
    }

    #[test]
    fn test_self_transition_is_silent() {
        let mut machine = StateMachine::new(Recorder::default());
        assert_eq!(machine.update_state(Processing), Some(Processing));
        assert_eq!(machine.update_state(Processing), None);
        assert_eq!(machine.observer().0, vec![(Start, Processing)]);
    }

    #[test]
    fn test_ignore_to_valid_ends_invalid() {
        let mut machine = StateMachine::new(());
        machine.update_state(Ignore);
        assert_eq!(machine.update_state(Valid), Some(Invalid));
        assert_eq!(machine.state(), Invalid);
    }

    #[test]
    fn test_rejected_move_keeps_state() {
        let mut machine = StateMachine::new(Recorder::default());
        machine.update_state(Invalid);
        assert_eq!(machine.update_state(Valid), None);
        assert_eq!(machine.state(), Invalid);
        assert_eq!(machine.observer().0.len(), 1);
    }

    #[test]
    fn test_unknown_name_forces_invalid() {
        let mut machine = StateMachine::new(());
        machine.update_state(Valid);
        let target = VerificationState::parse_or_invalid("BOGUS");
        assert_eq!(machine.update_state(target), Some(Invalid));
    }
}
