//! Common orchestration abstractions for FlowHS.
//!
//! This crate provides the bookkeeping types shared by every flow
//! operation saga:
//!
//! - [`Command`]: one dispatched install/remove request awaiting a response
//! - [`CommandLedger`]: per-phase pending / retried / failed views
//! - [`RetryPolicy`]: the bounded per-command retry rule
//!
//! # Architecture
//!
//! A saga emits one [`Command`] per rule in the current phase and tracks it
//! in a [`CommandLedger`]. Responses are reconciled one at a time:
//!
//! 1. A success acks the command (it leaves the pending view)
//! 2. A failure bumps the retry counter and re-dispatches while the
//!    [`RetryPolicy`] allows it
//! 3. An exhausted failure moves the command to the failed view
//! 4. Once nothing is pending the phase is complete
//!
//! # Example
//!
//! ```
//! use flowhs_common::{Command, CommandId, CommandKind, CommandLedger};
//! use flowhs_types::SwitchId;
//!
//! let mut ledger: CommandLedger<&str, String> = CommandLedger::new();
//! let id = CommandId::new();
//! ledger
//!     .track(Command::new(id, CommandKind::Install, "ingress", SwitchId::new(1)))
//!     .unwrap();
//! assert!(!ledger.is_phase_complete());
//!
//! ledger.ack(&id).unwrap();
//! assert!(ledger.is_phase_complete());
//! ```

mod command;
mod ledger;
mod retry;

pub use command::{Command, CommandId, CommandKind};
pub use ledger::{CommandLedger, LedgerError, LedgerResult};
pub use retry::{InvalidRetryLimit, RetryDecision, RetryPolicy};
