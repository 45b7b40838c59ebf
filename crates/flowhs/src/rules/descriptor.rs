//! Rule descriptors derived from flow paths.

use std::fmt;

use flowhs_types::{Cookie, FlowId, MeterId, PortNumber, SwitchId, VlanId};
use serde::{Deserialize, Serialize};

use crate::model::{Flow, FlowPath};

/// Position of a rule along the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleRole {
    /// First switch: matches customer traffic, applies the meter.
    Ingress,
    /// Intermediate switch: forwards encapsulated traffic.
    Transit,
    /// Last switch: restores customer tags and delivers.
    Egress,
    /// Source and destination on the same switch.
    OneSwitch,
}

impl fmt::Display for RuleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleRole::Ingress => write!(f, "ingress"),
            RuleRole::Transit => write!(f, "transit"),
            RuleRole::Egress => write!(f, "egress"),
            RuleRole::OneSwitch => write!(f, "one-switch"),
        }
    }
}

/// Meter attached to an ingress rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeterConfig {
    pub meter_id: MeterId,
    /// Rate in kbps.
    pub bandwidth: u64,
}

/// Immutable description of one rule on one switch.
///
/// Shared read-only by every retry of every command generated from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub flow_id: FlowId,
    pub switch_id: SwitchId,
    pub cookie: Cookie,
    pub role: RuleRole,
    pub in_port: PortNumber,
    pub out_port: PortNumber,
    /// VLAN stack matched on `in_port`, outermost first.
    pub match_vlans: Vec<VlanId>,
    /// VLAN stack the packet leaves with on `out_port`, outermost first.
    pub output_vlans: Vec<VlanId>,
    pub meter: Option<MeterConfig>,
}

impl RuleDescriptor {
    /// Builds the descriptors needed to realize `path` for `flow`.
    ///
    /// Produces one ingress rule, one transit rule per intermediate switch and
    /// one egress rule, or a single one-switch rule when the path has no
    /// segments. Only the ingress (or one-switch) rule carries the meter.
    pub fn for_path(flow: &Flow, path: &FlowPath) -> Vec<RuleDescriptor> {
        let meter = path.meter_id.map(|meter_id| MeterConfig {
            meter_id,
            bandwidth: flow.bandwidth,
        });
        let rule = |switch_id, role, in_port, out_port, match_vlans, output_vlans, meter| {
            RuleDescriptor {
                flow_id: flow.flow_id.clone(),
                switch_id,
                cookie: path.cookie,
                role,
                in_port,
                out_port,
                match_vlans,
                output_vlans,
                meter,
            }
        };

        let segments = path.segments();
        let (first, last) = match (segments.first(), segments.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return vec![rule(
                    path.src_switch,
                    RuleRole::OneSwitch,
                    flow.source.port,
                    flow.destination.port,
                    flow.source.vlan_stack(),
                    flow.destination.vlan_stack(),
                    meter,
                )];
            }
        };

        let transit: Vec<VlanId> = path.transit_vlan.into_iter().collect();
        let mut rules = Vec::with_capacity(segments.len() + 1);

        rules.push(rule(
            path.src_switch,
            RuleRole::Ingress,
            flow.source.port,
            first.src_port,
            flow.source.vlan_stack(),
            transit.clone(),
            meter,
        ));

        for pair in segments.windows(2) {
            let (inbound, outbound) = (&pair[0], &pair[1]);
            rules.push(rule(
                inbound.dest_switch,
                RuleRole::Transit,
                inbound.dest_port,
                outbound.src_port,
                transit.clone(),
                transit.clone(),
                None,
            ));
        }

        rules.push(rule(
            path.dest_switch,
            RuleRole::Egress,
            last.dest_port,
            flow.destination.port,
            transit,
            flow.destination.vlan_stack(),
            None,
        ));

        rules
    }
}

impl fmt::Display for RuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rule of flow {} on switch {} (cookie {})",
            self.role, self.flow_id, self.switch_id, self.cookie
        )
    }
}
