//! Speaker response reconciliation.
//!
//! [`reconcile`] folds one [`SpeakerResponse`] into the phase ledger and
//! returns what the saga has to do about it: history entries to append,
//! requests to re-dispatch and, once nothing is pending any more, the
//! outcome of the whole phase. It never sends or records anything itself.

use std::sync::Arc;

use flowhs_common::{CommandId, CommandKind, RetryDecision, RetryPolicy};
use log::{debug, info, warn};

use crate::history::HistoryEntry;
use crate::rules::{FlowSegmentRequest, FlowSegmentRequestFactory, RuleDescriptor, SpeakerResponse};

use super::context::RuleLedger;
use super::types::Phase;

/// Outcome of a phase whose commands all resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Succeeded,
    Failed { message: String },
}

/// Effects of reconciling one response.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub history: Vec<HistoryEntry>,
    pub requests: Vec<FlowSegmentRequest>,
    /// Set when the response resolved the last pending command.
    pub outcome: Option<PhaseOutcome>,
}

impl Reconciliation {
    /// Returns true if the response changed nothing.
    pub fn is_noop(&self) -> bool {
        self.history.is_empty() && self.requests.is_empty() && self.outcome.is_none()
    }
}

/// History wording for one kind of command within one phase.
struct Wording {
    success: &'static str,
    failure: &'static str,
    verb: &'static str,
}

impl Wording {
    fn of(phase: Phase, kind: CommandKind) -> Self {
        match (phase, kind) {
            (Phase::Revert, CommandKind::Install) => Wording {
                success: "Rule was re-installed (reverted)",
                failure: "Failed to re-install (revert) rule",
                verb: "re-install",
            },
            (Phase::Revert, CommandKind::Remove) => Wording {
                success: "Rule was deleted (reverted)",
                failure: "Failed to remove (revert) rule",
                verb: "remove",
            },
            (_, CommandKind::Install) => Wording {
                success: "Rule was installed",
                failure: "Failed to install rule",
                verb: "install",
            },
            (_, CommandKind::Remove) => Wording {
                success: "Rule was deleted",
                failure: "Failed to remove rule",
                verb: "remove",
            },
        }
    }
}

/// Applies one response to the ledger of `phase`.
///
/// Responses for commands that are not pending (unknown, already acked,
/// already failed or from an earlier phase) are logged and discarded
/// without touching the ledger.
pub fn reconcile(
    ledger: &mut RuleLedger,
    policy: RetryPolicy,
    phase: Phase,
    response: &SpeakerResponse,
) -> Reconciliation {
    let mut result = Reconciliation::default();
    let id = response.command_id;

    let (kind, descriptor) = match ledger.command(&id) {
        Some(command) if ledger.is_pending(&id) => (command.kind, Arc::clone(&command.descriptor)),
        _ => {
            info!(
                "Received response for unexpected command {} from switch {}, discarding",
                id, response.switch_id
            );
            return result;
        }
    };
    let wording = Wording::of(phase, kind);

    match &response.error {
        None => {
            if ledger.ack(&id).is_ok() {
                debug!("{} {} acknowledged by switch {}", kind, id, descriptor.switch_id);
                result.history.push(HistoryEntry::action(
                    wording.success,
                    format!(
                        "The rule was {}: commandId {}, switch {}, cookie {}",
                        past_tense(wording.verb),
                        id,
                        descriptor.switch_id,
                        descriptor.cookie
                    ),
                ));
            }
        }
        Some(error) => match policy.decide(ledger.retry_count(&id)) {
            RetryDecision::Retry { attempt } => {
                if ledger.bump_retry(&id).is_ok() {
                    warn!(
                        "Retrying {} command {} on switch {} (attempt {}): {}",
                        kind, id, descriptor.switch_id, attempt, error
                    );
                    result.history.push(HistoryEntry::error(
                        wording.failure,
                        format!(
                            "Failed to {} the rule: commandId {}, switch {}, cookie {}. Error {}. Retrying (attempt {})",
                            wording.verb, id, descriptor.switch_id, descriptor.cookie, error, attempt
                        ),
                    ));
                    result.requests.push(descriptor.make_request(kind, id));
                }
            }
            RetryDecision::Exhausted { retries } => {
                if ledger.fail(&id, error.clone()).is_ok() {
                    warn!(
                        "{} command {} on switch {} failed after {} retries: {}",
                        kind, id, descriptor.switch_id, retries, error
                    );
                    result.history.push(HistoryEntry::error(
                        wording.failure,
                        format!(
                            "Failed to {} the rule: commandId {}, switch {}, cookie {}. Error: {}",
                            wording.verb, id, descriptor.switch_id, descriptor.cookie, error
                        ),
                    ));
                }
            }
        },
    }

    result.outcome = phase_outcome(ledger, phase);
    if let Some(PhaseOutcome::Failed { message }) = &result.outcome {
        result.history.push(HistoryEntry::error(message.clone(), ""));
    }
    result
}

/// Returns the phase outcome if no command of the phase is pending.
pub fn phase_outcome(ledger: &RuleLedger, phase: Phase) -> Option<PhaseOutcome> {
    if !ledger.is_phase_complete() {
        return None;
    }
    match ledger.failed_count() {
        0 => Some(PhaseOutcome::Succeeded),
        failed => Some(PhaseOutcome::Failed {
            message: format!(
                "Received error response(s) for {} {} command(s)",
                failed,
                phase.noun()
            ),
        }),
    }
}

fn past_tense(verb: &str) -> &'static str {
    match verb {
        "install" => "installed",
        "re-install" => "re-installed",
        _ => "deleted",
    }
}

/// Returns the ids of the commands still awaiting a response.
pub fn pending_commands(ledger: &RuleLedger) -> Vec<CommandId> {
    let mut pending: Vec<CommandId> = ledger.pending().copied().collect();
    pending.sort();
    pending
}
