//! Flow operation host service and its message boundary.

mod flowhs_daemon;
mod messages;

pub use flowhs_daemon::{DaemonStats, FlowHsDaemon, FlowHsDaemonConfig};
pub use messages::{InboundMessage, OutboundMessage};
