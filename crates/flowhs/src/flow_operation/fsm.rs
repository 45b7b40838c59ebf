//! Transition table of the flow operation saga.

use thiserror::Error;

use super::types::{Action, Event, State};

/// Error type for rejected transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsmError {
    #[error("Event {event} is not accepted in state {state}")]
    UnexpectedEvent { state: State, event: Event },

    #[error("State {state} is terminal, event {event} rejected")]
    TerminalState { state: State, event: Event },
}

/// A permitted transition and the action to run on entering `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: State,
    pub to: State,
    pub action: Action,
}

/// Looks up the transition for `event` in `state`.
///
/// Every non-terminal state accepts its one success event and `Error`.
/// Errors raised while reverting still end in `Reverted`; the saga flags
/// the outcome as a failed revert.
pub fn transition(state: State, event: Event) -> Result<Transition, FsmError> {
    use Action as A;
    use Event as E;
    use State as S;

    let (to, action) = match (state, event) {
        (S::Completed | S::Reverted, _) => return Err(FsmError::TerminalState { state, event }),

        (S::Initialized, E::Start) => (S::ComputingPath, A::ComputePath),
        (S::ComputingPath, E::PathComputed) => (S::InstallingNewRules, A::InstallNewRules),
        (S::InstallingNewRules, E::RulesInstalled) => (S::ValidatingNewRules, A::ValidateNewRules),
        (S::ValidatingNewRules, E::RulesValidated) => (S::RemovingOldRules, A::RemoveOldRules),
        (S::RemovingOldRules, E::RulesRemoved) => (S::Completed, A::CompleteOperation),
        (S::Reverting, E::RevertCompleted | E::Error) => (S::Reverted, A::FinishRevert),

        (
            S::Initialized
            | S::ComputingPath
            | S::InstallingNewRules
            | S::ValidatingNewRules
            | S::RemovingOldRules,
            E::Error,
        ) => (S::Reverting, A::RevertRules),

        _ => return Err(FsmError::UnexpectedEvent { state, event }),
    };

    Ok(Transition {
        from: state,
        to,
        action,
    })
}
