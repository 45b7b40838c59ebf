//! Flow operation saga.
//!
//! A flow change (create, update, reroute, delete) runs through the same
//! sequence of states:
//!
//! ```text
//! Initialized -> ComputingPath -> InstallingNewRules -> ValidatingNewRules
//!             -> RemovingOldRules -> Completed
//!
//! any forward state --Error--> Reverting -> Reverted
//! ```
//!
//! [`fsm::transition`] is the pure transition table. Entering a state runs
//! one [`Action`] from [`actions`], and [`reconciler::reconcile`] folds
//! speaker responses into the phase ledger. Both return their effects to
//! [`FlowOperationSaga`], which applies them.

pub mod actions;
pub mod context;
pub mod fsm;
pub mod reconciler;
pub mod saga;
pub mod types;

pub use context::{FlowOperationContext, RuleLedger};
pub use fsm::{transition, FsmError, Transition};
pub use reconciler::{reconcile, PhaseOutcome, Reconciliation};
pub use saga::{FlowOperationSaga, SagaCollaborators};
pub use types::{
    Action, Event, FlowOperationKind, FlowOperationOutcome, FlowOperationRequest, OperationResult,
    Phase, State,
};
