//! Flow and flow path identifiers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a provisioned flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowId(String);

impl FlowId {
    /// Creates a flow id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or whitespace only.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ParseError::EmptyIdentifier);
        }
        Ok(FlowId(id))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FlowId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowId::new(s)
    }
}

impl TryFrom<String> for FlowId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        FlowId::new(s)
    }
}

impl From<FlowId> for String {
    fn from(id: FlowId) -> String {
        id.0
    }
}

/// Identifier of one flow path (a concrete route realizing a flow).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(String);

impl PathId {
    /// Creates a path id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        PathId(id.into())
    }

    /// Derives a path id for a flow, tagged with a caller-supplied suffix.
    pub fn for_flow(flow_id: &FlowId, suffix: impl fmt::Display) -> Self {
        PathId(format!("{}_{}", flow_id, suffix))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_id_rejects_empty() {
        assert_eq!(FlowId::new("  "), Err(ParseError::EmptyIdentifier));
        assert_eq!(FlowId::new("flow-1").unwrap().as_str(), "flow-1");
    }

    #[test]
    fn test_path_id_for_flow() {
        let flow = FlowId::new("flow-1").unwrap();
        assert_eq!(PathId::for_flow(&flow, 3).as_str(), "flow-1_3");
    }
}
