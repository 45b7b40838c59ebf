//! States, events, actions and the request/outcome types of a flow operation.

use std::fmt;

use flowhs_types::FlowId;
use serde::{Deserialize, Serialize};

use crate::history::HistoryRecord;
use crate::model::Flow;

/// Saga state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Initialized,
    ComputingPath,
    InstallingNewRules,
    ValidatingNewRules,
    RemovingOldRules,
    /// Terminal: the network reflects the requested change.
    Completed,
    Reverting,
    /// Terminal: the change was rolled back (or the rollback failed).
    Reverted,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Reverted)
    }

    /// Returns the command phase run while in this state, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            State::InstallingNewRules => Some(Phase::Install),
            State::RemovingOldRules => Some(Phase::Remove),
            State::Reverting => Some(Phase::Revert),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Input driving the saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    Start,
    PathComputed,
    RulesInstalled,
    RulesValidated,
    RulesRemoved,
    RevertCompleted,
    Error,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Work performed on entering a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ComputePath,
    InstallNewRules,
    ValidateNewRules,
    RemoveOldRules,
    CompleteOperation,
    RevertRules,
    FinishRevert,
}

/// A group of commands whose completion moves the saga forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Install rules of the new path.
    Install,
    /// Remove rules of the previous path.
    Remove,
    /// Remove new rules and re-install old ones.
    Revert,
}

impl Phase {
    /// Event fired once every command of the phase succeeded.
    pub fn success_event(&self) -> Event {
        match self {
            Phase::Install => Event::RulesInstalled,
            Phase::Remove => Event::RulesRemoved,
            Phase::Revert => Event::RevertCompleted,
        }
    }

    /// Short noun used in the phase failure summary.
    pub fn noun(&self) -> &'static str {
        match self {
            Phase::Install => "install",
            Phase::Remove | Phase::Revert => "remove / re-install",
        }
    }
}

/// Kind of change requested for a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowOperationKind {
    Create,
    Update,
    Reroute,
    Delete,
}

impl fmt::Display for FlowOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowOperationKind::Create => write!(f, "create"),
            FlowOperationKind::Update => write!(f, "update"),
            FlowOperationKind::Reroute => write!(f, "reroute"),
            FlowOperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A northbound request for a flow change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum FlowOperationRequest {
    /// Provision a new flow.
    Create { flow: Flow },
    /// Replace the definition (endpoints, bandwidth) of an existing flow.
    Update { flow: Flow },
    /// Move an existing flow to a freshly computed path.
    Reroute { flow_id: FlowId },
    /// Tear a flow down.
    Delete { flow_id: FlowId },
}

impl FlowOperationRequest {
    pub fn flow_id(&self) -> &FlowId {
        match self {
            FlowOperationRequest::Create { flow } | FlowOperationRequest::Update { flow } => {
                &flow.flow_id
            }
            FlowOperationRequest::Reroute { flow_id } | FlowOperationRequest::Delete { flow_id } => {
                flow_id
            }
        }
    }

    pub fn kind(&self) -> FlowOperationKind {
        match self {
            FlowOperationRequest::Create { .. } => FlowOperationKind::Create,
            FlowOperationRequest::Update { .. } => FlowOperationKind::Update,
            FlowOperationRequest::Reroute { .. } => FlowOperationKind::Reroute,
            FlowOperationRequest::Delete { .. } => FlowOperationKind::Delete,
        }
    }
}

/// How a flow operation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OperationResult {
    Completed,
    /// The change failed and was rolled back.
    Reverted { error: String },
    /// The rollback failed too; switches may carry stray or missing rules.
    RevertFailed { error: String, revert_error: String },
}

/// Terminal report handed back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowOperationOutcome {
    pub flow_id: FlowId,
    pub kind: FlowOperationKind,
    #[serde(flatten)]
    pub result: OperationResult,
    /// Problems that did not change the result, such as a completed
    /// operation whose new state could not be stored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub history: Vec<HistoryRecord>,
}

impl FlowOperationOutcome {
    pub fn is_success(&self) -> bool {
        self.result == OperationResult::Completed
    }

    /// Returns the error that aborted the operation, if any.
    pub fn error(&self) -> Option<&str> {
        match &self.result {
            OperationResult::Completed => None,
            OperationResult::Reverted { error } | OperationResult::RevertFailed { error, .. } => {
                Some(error)
            }
        }
    }
}
