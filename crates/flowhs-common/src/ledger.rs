//! Per-phase command ledger.
//!
//! The ledger keeps three disjoint views over the commands of the current
//! phase:
//!
//! - *pending*: dispatched, awaiting a response
//! - *retried*: command id to retry count (never decreases within a phase)
//! - *failed*: command id to the last error, only for exhausted commands
//!
//! A command id is in exactly one of pending, acked or failed. Lookups
//! never create entries: every mutation on an unknown or finalized id is
//! an explicit [`LedgerError`].

use std::collections::{HashMap, HashSet};

use log::debug;
use thiserror::Error;

use crate::command::{Command, CommandId};

/// Error type for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Command already tracked: {0}")]
    AlreadyTracked(CommandId),

    #[error("Command not pending: {0}")]
    NotPending(CommandId),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Bookkeeping of the commands belonging to one saga phase.
///
/// `D` is the rule descriptor a command was generated from, `E` the error
/// payload kept for commands that exhausted their retries.
#[derive(Debug, Clone)]
pub struct CommandLedger<D, E> {
    /// Every command tracked since the last reset, by id.
    commands: HashMap<CommandId, Command<D>>,
    pending: HashSet<CommandId>,
    retried: HashMap<CommandId, u32>,
    failed: HashMap<CommandId, E>,
    acked: HashSet<CommandId>,
}

impl<D, E> CommandLedger<D, E> {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            pending: HashSet::new(),
            retried: HashMap::new(),
            failed: HashMap::new(),
            acked: HashSet::new(),
        }
    }

    /// Starts tracking a freshly dispatched command.
    pub fn track(&mut self, command: Command<D>) -> LedgerResult<()> {
        if self.commands.contains_key(&command.id) {
            return Err(LedgerError::AlreadyTracked(command.id));
        }
        self.pending.insert(command.id);
        self.commands.insert(command.id, command);
        Ok(())
    }

    /// Marks a pending command as succeeded.
    pub fn ack(&mut self, id: &CommandId) -> LedgerResult<&Command<D>> {
        if !self.pending.remove(id) {
            return Err(LedgerError::NotPending(*id));
        }
        self.acked.insert(*id);
        self.commands.get(id).ok_or(LedgerError::NotPending(*id))
    }

    /// Increments the retry counter of a pending command.
    ///
    /// Returns the new count. The command stays pending.
    pub fn bump_retry(&mut self, id: &CommandId) -> LedgerResult<u32> {
        if !self.pending.contains(id) {
            return Err(LedgerError::NotPending(*id));
        }
        let count = self.retried.entry(*id).or_insert(0);
        *count += 1;
        let count = *count;
        if let Some(command) = self.commands.get_mut(id) {
            command.retry_count = count;
        }
        debug!("Command {} retry count is now {}", id, count);
        Ok(count)
    }

    /// Moves a pending command to the failed view.
    pub fn fail(&mut self, id: &CommandId, error: E) -> LedgerResult<()> {
        if !self.pending.remove(id) {
            return Err(LedgerError::NotPending(*id));
        }
        self.failed.insert(*id, error);
        Ok(())
    }

    /// Returns true iff no command of the phase is awaiting a response.
    pub fn is_phase_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns true if the command is awaiting a response.
    pub fn is_pending(&self, id: &CommandId) -> bool {
        self.pending.contains(id)
    }

    /// Returns true if the command exhausted its retries.
    pub fn is_failed(&self, id: &CommandId) -> bool {
        self.failed.contains_key(id)
    }

    /// Returns the tracked command, whatever view it is in.
    pub fn command(&self, id: &CommandId) -> Option<&Command<D>> {
        self.commands.get(id)
    }

    /// Returns how many times the command has been retried.
    pub fn retry_count(&self, id: &CommandId) -> u32 {
        self.retried.get(id).copied().unwrap_or(0)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn acked_count(&self) -> usize {
        self.acked.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Total number of retries recorded in this phase.
    pub fn total_retries(&self) -> u32 {
        self.retried.values().sum()
    }

    /// Iterates over the pending command ids.
    pub fn pending(&self) -> impl Iterator<Item = &CommandId> {
        self.pending.iter()
    }

    /// Iterates over the failed commands and their last error.
    pub fn failed(&self) -> impl Iterator<Item = (&CommandId, &E)> {
        self.failed.iter()
    }

    /// Iterates over the retry counters.
    pub fn retried(&self) -> impl Iterator<Item = (&CommandId, u32)> {
        self.retried.iter().map(|(id, count)| (id, *count))
    }

    /// Clears every view. Called when a new phase starts.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.pending.clear();
        self.retried.clear();
        self.failed.clear();
        self.acked.clear();
    }
}

impl<D, E> Default for CommandLedger<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use flowhs_types::SwitchId;
    use pretty_assertions::assert_eq;

    fn command(kind: CommandKind) -> Command<&'static str> {
        Command::new(CommandId::new(), kind, "rule", SwitchId::new(1))
    }

    fn ledger() -> CommandLedger<&'static str, String> {
        CommandLedger::new()
    }

    #[test]
    fn test_track_and_ack() {
        let mut ledger = ledger();
        let cmd = command(CommandKind::Install);
        let id = cmd.id;

        ledger.track(cmd).unwrap();
        assert!(ledger.is_pending(&id));
        assert!(!ledger.is_phase_complete());

        let acked = ledger.ack(&id).unwrap();
        assert_eq!(acked.kind, CommandKind::Install);
        assert!(ledger.is_phase_complete());
        assert_eq!(ledger.acked_count(), 1);
    }

    #[test]
    fn test_track_twice_is_rejected() {
        let mut ledger = ledger();
        let cmd = command(CommandKind::Install);
        let id = cmd.id;
        ledger.track(cmd.clone()).unwrap();
        assert_eq!(ledger.track(cmd), Err(LedgerError::AlreadyTracked(id)));
    }

    #[test]
    fn test_ack_unknown_does_not_create_entry() {
        let mut ledger = ledger();
        let id = CommandId::new();
        assert!(matches!(ledger.ack(&id), Err(LedgerError::NotPending(_))));
        assert!(ledger.command(&id).is_none());
        assert!(ledger.is_phase_complete());
    }

    #[test]
    fn test_bump_retry_keeps_command_pending() {
        let mut ledger = ledger();
        let cmd = command(CommandKind::Remove);
        let id = cmd.id;
        ledger.track(cmd).unwrap();

        assert_eq!(ledger.bump_retry(&id).unwrap(), 1);
        assert_eq!(ledger.bump_retry(&id).unwrap(), 2);
        assert!(ledger.is_pending(&id));
        assert_eq!(ledger.retry_count(&id), 2);
        assert_eq!(ledger.command(&id).unwrap().retry_count, 2);
        assert_eq!(ledger.total_retries(), 2);
    }

    #[test]
    fn test_fail_moves_out_of_pending() {
        let mut ledger = ledger();
        let cmd = command(CommandKind::Remove);
        let id = cmd.id;
        ledger.track(cmd).unwrap();

        ledger.fail(&id, "timeout".to_string()).unwrap();
        assert!(!ledger.is_pending(&id));
        assert!(ledger.is_failed(&id));
        assert!(ledger.is_phase_complete());
        assert_eq!(ledger.failed().next().map(|(_, e)| e.as_str()), Some("timeout"));
    }

    #[test]
    fn test_finalized_command_rejects_further_updates() {
        let mut ledger = ledger();
        let cmd = command(CommandKind::Remove);
        let id = cmd.id;
        ledger.track(cmd).unwrap();
        ledger.fail(&id, "boom".to_string()).unwrap();

        assert_eq!(ledger.bump_retry(&id), Err(LedgerError::NotPending(id)));
        assert_eq!(ledger.fail(&id, "again".to_string()), Err(LedgerError::NotPending(id)));
        assert!(matches!(ledger.ack(&id), Err(LedgerError::NotPending(_))));
        assert_eq!(ledger.failed_count(), 1);
        assert_eq!(ledger.acked_count(), 0);
    }

    #[test]
    fn test_pending_and_failed_stay_disjoint() {
        let mut ledger = ledger();
        let ids: Vec<CommandId> = (0..4)
            .map(|_| {
                let cmd = command(CommandKind::Install);
                let id = cmd.id;
                ledger.track(cmd).unwrap();
                id
            })
            .collect();

        ledger.fail(&ids[0], "e0".to_string()).unwrap();
        ledger.bump_retry(&ids[1]).unwrap();
        ledger.ack(&ids[2]).unwrap();

        for (id, _) in ledger.failed() {
            assert!(!ledger.is_pending(id));
        }
        assert_eq!(ledger.pending_count(), 2);
    }

    #[test]
    fn test_phase_completion_is_monotonic() {
        let mut ledger = ledger();
        let cmd = command(CommandKind::Install);
        let id = cmd.id;
        ledger.track(cmd).unwrap();
        ledger.ack(&id).unwrap();
        assert!(ledger.is_phase_complete());

        // Late duplicate responses cannot reopen the phase.
        let _ = ledger.ack(&id);
        let _ = ledger.bump_retry(&id);
        let _ = ledger.fail(&id, "late".to_string());
        assert!(ledger.is_phase_complete());
    }

    #[test]
    fn test_reset_clears_all_views() {
        let mut ledger = ledger();
        let a = command(CommandKind::Install);
        let b = command(CommandKind::Install);
        let (a_id, b_id) = (a.id, b.id);
        ledger.track(a).unwrap();
        ledger.track(b).unwrap();
        ledger.bump_retry(&a_id).unwrap();
        ledger.fail(&b_id, "x".to_string()).unwrap();

        ledger.reset();
        assert!(ledger.is_phase_complete());
        assert_eq!(ledger.failed_count(), 0);
        assert_eq!(ledger.total_retries(), 0);
        assert!(ledger.command(&a_id).is_none());
    }
}
