//! Per-saga state.

use std::sync::Arc;

use flowhs_common::{CommandLedger, RetryPolicy};
use flowhs_types::FlowId;

use crate::model::{Flow, FlowPath};
use crate::rules::{RuleDescriptor, SpeakerError};

use super::types::{FlowOperationKind, FlowOperationRequest};

/// Ledger of the commands of the running phase.
pub type RuleLedger = CommandLedger<Arc<RuleDescriptor>, SpeakerError>;

/// Everything one flow operation needs between events.
///
/// Owned by exactly one saga and dropped with it.
#[derive(Debug)]
pub struct FlowOperationContext {
    pub flow_id: FlowId,
    pub request: FlowOperationRequest,
    /// The flow as stored before the operation, if it existed.
    pub original_flow: Option<Flow>,
    /// The flow definition the operation converges to (absent for delete).
    pub target_flow: Option<Flow>,
    pub target_path: Option<FlowPath>,
    /// Path installed before the operation, restored on revert.
    pub previous_path: Option<FlowPath>,
    pub new_rules: Vec<Arc<RuleDescriptor>>,
    pub old_rules: Vec<Arc<RuleDescriptor>>,
    pub ledger: RuleLedger,
    pub retry_policy: RetryPolicy,
    /// Set once the stored flow was marked in progress.
    pub flow_touched: bool,
    pub new_rules_dispatched: bool,
    pub old_rules_dispatched: bool,
    /// First error that sent the saga into revert.
    pub terminal_error: Option<String>,
    /// Error raised by the revert phase itself.
    pub revert_error: Option<String>,
    /// Non-fatal problems reported with the outcome.
    pub warnings: Vec<String>,
}

impl FlowOperationContext {
    pub fn new(request: FlowOperationRequest, retry_policy: RetryPolicy) -> Self {
        Self {
            flow_id: request.flow_id().clone(),
            request,
            original_flow: None,
            target_flow: None,
            target_path: None,
            previous_path: None,
            new_rules: Vec::new(),
            old_rules: Vec::new(),
            ledger: RuleLedger::new(),
            retry_policy,
            flow_touched: false,
            new_rules_dispatched: false,
            old_rules_dispatched: false,
            terminal_error: None,
            warnings: Vec::new(),
            revert_error: None,
        }
    }

    pub fn kind(&self) -> FlowOperationKind {
        self.request.kind()
    }

    /// Keeps the first error; later ones are only logged by the caller.
    pub fn record_error(&mut self, message: String) {
        if self.terminal_error.is_none() {
            self.terminal_error = Some(message);
        }
    }
}
