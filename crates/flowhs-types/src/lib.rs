//! Common FlowHS types for flow orchestration.
//!
//! This crate provides type-safe representations of the identifiers
//! shared by the flow orchestrator and its collaborators:
//!
//! - [`SwitchId`]: 64-bit OpenFlow datapath identifiers
//! - [`FlowId`] / [`PathId`]: flow and flow path identifiers
//! - [`Cookie`]: rule identifiers installed on switches
//! - [`MeterId`]: per-switch meter identifiers
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers

mod cookie;
mod ids;
mod switch;
mod vlan;

pub use cookie::{Cookie, MeterId};
pub use ids::{FlowId, PathId};
pub use switch::{PortNumber, SwitchId};
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid switch id format: {0}")]
    InvalidSwitchId(String),

    #[error("invalid cookie: {0}")]
    InvalidCookie(String),

    #[error("invalid meter id: {0} (must be >= {min})", min = MeterId::MIN_FLOW_METER_ID)]
    InvalidMeterId(u32),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("identifier must not be empty")]
    EmptyIdentifier,
}
