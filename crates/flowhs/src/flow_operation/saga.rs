//! The flow operation saga.

use std::fmt;
use std::sync::Arc;

use flowhs_common::RetryPolicy;
use log::{debug, info, warn};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::carrier::Carrier;
use crate::history::{HistoryEntry, HistoryRecorder, HistorySink};
use crate::path_computer::PathComputer;
use crate::persistence::FlowRepository;
use crate::rules::SpeakerResponse;

use super::actions::{self, Effects};
use super::context::FlowOperationContext;
use super::fsm::{self, FsmError};
use super::reconciler::{reconcile, PhaseOutcome};
use super::types::{
    Action, Event, FlowOperationOutcome, FlowOperationRequest, OperationResult, Phase, State,
};

/// External collaborators shared by every saga.
#[derive(Clone)]
pub struct SagaCollaborators {
    pub carrier: Arc<dyn Carrier>,
    pub repository: Arc<dyn FlowRepository>,
    pub path_computer: Arc<dyn PathComputer>,
    pub history: Arc<dyn HistorySink>,
}

impl fmt::Debug for SagaCollaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaCollaborators").finish_non_exhaustive()
    }
}

/// Drives one flow operation from request to a terminal state.
///
/// The saga is passive: it only moves when [`start`](Self::start) or
/// [`handle_response`](Self::handle_response) is called, and handles one
/// input at a time.
#[derive(Debug)]
pub struct FlowOperationSaga {
    state: State,
    context: FlowOperationContext,
    collaborators: SagaCollaborators,
    history: HistoryRecorder,
}

impl FlowOperationSaga {
    pub fn new(
        request: FlowOperationRequest,
        retry_policy: RetryPolicy,
        collaborators: SagaCollaborators,
    ) -> Self {
        let context = FlowOperationContext::new(request, retry_policy);
        let history = HistoryRecorder::new(context.flow_id.clone(), Arc::clone(&collaborators.history));
        Self {
            state: State::Initialized,
            context,
            collaborators,
            history,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn context(&self) -> &FlowOperationContext {
        &self.context
    }

    /// Returns the history recorded so far.
    pub fn history(&self) -> &[crate::history::HistoryRecord] {
        self.history.trail()
    }

    /// Kicks the saga off. Runs until the first phase awaits responses.
    pub fn start(&mut self) -> Result<(), FsmError> {
        let kind = self.context.kind();
        info!("Starting flow {} for {}", kind, self.context.flow_id);
        audit_log!(AuditRecord::new(AuditCategory::FlowOperation, "FlowOperationSaga", format!("flow_{}", kind))
            .with_outcome(AuditOutcome::InProgress)
            .with_object_id(self.context.flow_id.as_str())
            .with_object_type("flow")
            .with_correlation_id(self.context.flow_id.as_str()));

        self.history
            .record(HistoryEntry::action(format!("Started flow {}", kind), ""));
        self.fire(Event::Start, None)
    }

    /// Feeds one speaker response into the saga.
    ///
    /// Responses arriving while no phase is waiting are discarded.
    pub fn handle_response(&mut self, response: &SpeakerResponse) -> Result<(), FsmError> {
        let phase = match self.state.phase() {
            Some(phase) => phase,
            None => {
                info!(
                    "Discarding response for command {} of flow {} in state {}",
                    response.command_id, self.context.flow_id, self.state
                );
                return Ok(());
            }
        };

        let result = reconcile(&mut self.context.ledger, self.context.retry_policy, phase, response);
        self.history.record_all(result.history);
        for request in result.requests {
            self.collaborators.carrier.send_speaker_request(request);
        }

        match result.outcome {
            Some(PhaseOutcome::Succeeded) => self.fire(phase.success_event(), None),
            Some(PhaseOutcome::Failed { message }) => self.fire(Event::Error, Some(message)),
            None => Ok(()),
        }
    }

    /// Returns the terminal outcome, once the saga reached a terminal state.
    pub fn outcome(&self) -> Option<FlowOperationOutcome> {
        let result = match self.state {
            State::Completed => OperationResult::Completed,
            State::Reverted => {
                let error = self
                    .context
                    .terminal_error
                    .clone()
                    .unwrap_or_else(|| "Flow operation failed".to_string());
                match &self.context.revert_error {
                    Some(revert_error) => OperationResult::RevertFailed {
                        error,
                        revert_error: revert_error.clone(),
                    },
                    None => OperationResult::Reverted { error },
                }
            }
            _ => return None,
        };
        Some(FlowOperationOutcome {
            flow_id: self.context.flow_id.clone(),
            kind: self.context.kind(),
            result,
            warnings: self.context.warnings.clone(),
            history: self.history.trail().to_vec(),
        })
    }

    /// Fires `event` and every event the entered states resolve synchronously.
    fn fire(&mut self, event: Event, error: Option<String>) -> Result<(), FsmError> {
        let mut next = Some((event, error));
        while let Some((event, error)) = next.take() {
            if let Some(message) = error {
                warn!("Flow {} failed in state {}: {}", self.context.flow_id, self.state, message);
                if self.state == State::Reverting {
                    self.context.revert_error = Some(message);
                } else {
                    self.context.record_error(message);
                }
            }

            let transition = fsm::transition(self.state, event)?;
            debug!(
                "Flow {}: {} --{}--> {}",
                self.context.flow_id, transition.from, event, transition.to
            );
            self.history.record(HistoryEntry::action(
                format!("State changed to {}", transition.to),
                format!("{} on {}", transition.from, event),
            ));
            self.state = transition.to;

            let effects = self.run(transition.action);
            self.history.record_all(effects.history);
            self.context.warnings.extend(effects.warnings);
            for request in effects.requests {
                self.collaborators.carrier.send_speaker_request(request);
            }
            next = effects.event.map(|event| (event, effects.error));
        }

        if self.is_terminal() {
            self.report();
        }
        Ok(())
    }

    fn run(&mut self, action: Action) -> Effects {
        let repository = self.collaborators.repository.as_ref();
        match action {
            Action::ComputePath => actions::compute_path(
                &mut self.context,
                repository,
                self.collaborators.path_computer.as_ref(),
            ),
            Action::InstallNewRules => actions::dispatch_phase(&mut self.context, Phase::Install),
            Action::ValidateNewRules => actions::validate_new_rules(&self.context, repository),
            Action::RemoveOldRules => actions::dispatch_phase(&mut self.context, Phase::Remove),
            Action::CompleteOperation => actions::complete_operation(&self.context, repository),
            Action::RevertRules => actions::dispatch_phase(&mut self.context, Phase::Revert),
            Action::FinishRevert => actions::finish_revert(&self.context, repository),
        }
    }

    fn report(&self) {
        let kind = self.context.kind();
        let action = format!("flow_{}", kind);
        let record = AuditRecord::new(AuditCategory::FlowOperation, "FlowOperationSaga", action)
            .with_object_id(self.context.flow_id.as_str())
            .with_object_type("flow")
            .with_correlation_id(self.context.flow_id.as_str())
            .with_details(serde_json::json!({
                "final_state": self.state.to_string(),
                "history_entries": self.history.trail().len(),
                "warnings": self.context.warnings,
            }));

        match (&self.context.terminal_error, &self.context.revert_error) {
            (None, None) if self.state == State::Completed => {
                if self.context.warnings.is_empty() {
                    info!("Flow {} for {} completed", kind, self.context.flow_id);
                } else {
                    warn!(
                        "Flow {} for {} completed with {} warning(s)",
                        kind,
                        self.context.flow_id,
                        self.context.warnings.len()
                    );
                }
                audit_log!(record.with_outcome(AuditOutcome::Success));
            }
            (_, Some(revert_error)) => {
                warn!(
                    "Flow {} for {} failed and could not be reverted: {}",
                    kind, self.context.flow_id, revert_error
                );
                audit_log!(AuditRecord {
                    category: AuditCategory::Revert,
                    ..record
                }
                .with_error(revert_error.clone()));
            }
            (error, None) => {
                let error = error.clone().unwrap_or_default();
                info!("Flow {} for {} reverted: {}", kind, self.context.flow_id, error);
                audit_log!(record.with_error(error));
            }
        }
    }
}
