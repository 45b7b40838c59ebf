//! Outstanding remote commands.

use flowhs_types::SwitchId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier correlating a request with its response.
///
/// A fresh id is generated for every command a saga emits; retries reuse
/// the id of the command they retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(Uuid);

impl CommandId {
    /// Generates a new random command id.
    pub fn new() -> Self {
        CommandId(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CommandId {
    fn from(uuid: Uuid) -> Self {
        CommandId(uuid)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a command installs or removes its rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Install,
    Remove,
}

impl CommandKind {
    /// Returns the compensating operation.
    pub fn opposite(&self) -> Self {
        match self {
            CommandKind::Install => CommandKind::Remove,
            CommandKind::Remove => CommandKind::Install,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Install => write!(f, "install"),
            CommandKind::Remove => write!(f, "remove"),
        }
    }
}

/// One outstanding remote operation generated from a rule descriptor `D`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<D> {
    pub id: CommandId,
    pub kind: CommandKind,
    pub descriptor: D,
    pub switch_id: SwitchId,
    /// Number of re-dispatches so far.
    pub retry_count: u32,
}

impl<D> Command<D> {
    /// Creates a command with a zero retry count.
    pub fn new(id: CommandId, kind: CommandKind, descriptor: D, switch_id: SwitchId) -> Self {
        Self {
            id,
            kind,
            descriptor,
            switch_id,
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids_are_unique() {
        assert_ne!(CommandId::new(), CommandId::new());
    }

    #[test]
    fn test_kind_opposite() {
        assert_eq!(CommandKind::Install.opposite(), CommandKind::Remove);
        assert_eq!(CommandKind::Remove.opposite(), CommandKind::Install);
    }

    #[test]
    fn test_new_command_has_no_retries() {
        let cmd = Command::new(CommandId::new(), CommandKind::Remove, (), SwitchId::new(3));
        assert_eq!(cmd.retry_count, 0);
        assert_eq!(cmd.switch_id, SwitchId::new(3));
    }
}
