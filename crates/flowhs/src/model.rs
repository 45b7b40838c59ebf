//! Persisted flow, path and switch entities.
//!
//! These mirror what the persistence collaborator stores. The orchestrator
//! reads them through [`crate::persistence::FlowRepository`] and never
//! touches the storage format.

use std::fmt;

use flowhs_types::{Cookie, FlowId, MeterId, PathId, PortNumber, SwitchId, VlanId};
use serde::{Deserialize, Serialize};

/// One end of a flow: a switch port plus the customer VLAN tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEndpoint {
    pub switch_id: SwitchId,
    pub port: PortNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_vlan: Option<VlanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_vlan: Option<VlanId>,
}

impl FlowEndpoint {
    /// Creates an untagged endpoint.
    pub fn new(switch_id: SwitchId, port: PortNumber) -> Self {
        Self {
            switch_id,
            port,
            outer_vlan: None,
            inner_vlan: None,
        }
    }

    /// Sets the outer VLAN tag.
    pub fn with_outer_vlan(mut self, vlan: VlanId) -> Self {
        self.outer_vlan = Some(vlan);
        self
    }

    /// Sets the inner VLAN tag.
    pub fn with_inner_vlan(mut self, vlan: VlanId) -> Self {
        self.inner_vlan = Some(vlan);
        self
    }

    /// Returns the VLAN tag stack, outermost first.
    pub fn vlan_stack(&self) -> Vec<VlanId> {
        VlanId::stack(self.outer_vlan, self.inner_vlan)
    }
}

impl fmt::Display for FlowEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.switch_id, self.port)?;
        if let Some(vlan) = self.outer_vlan {
            write!(f, ":{}", vlan)?;
        }
        Ok(())
    }
}

/// Flow status as seen by the northbound API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Up,
    InProgress,
    Down,
}

/// A provisioned end-to-end forwarding intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub flow_id: FlowId,
    pub source: FlowEndpoint,
    pub destination: FlowEndpoint,
    /// Bandwidth in kbps; 0 means unmetered.
    #[serde(default)]
    pub bandwidth: u64,
    pub status: FlowStatus,
    /// Path currently realizing the flow, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_id: Option<PathId>,
}

impl Flow {
    /// Creates a flow in the `Down` status with no path.
    pub fn new(flow_id: FlowId, source: FlowEndpoint, destination: FlowEndpoint) -> Self {
        Self {
            flow_id,
            source,
            destination,
            bandwidth: 0,
            status: FlowStatus::Down,
            path_id: None,
        }
    }

    pub fn with_bandwidth(mut self, bandwidth: u64) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Returns true if both endpoints are on the same switch.
    pub fn is_one_switch(&self) -> bool {
        self.source.switch_id == self.destination.switch_id
    }
}

/// Lifecycle status of a flow path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPathStatus {
    Active,
    InProgress,
    Inactive,
}

/// One hop of a path: the link between two switch ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    pub src_switch: SwitchId,
    pub src_port: PortNumber,
    pub dest_switch: SwitchId,
    pub dest_port: PortNumber,
    #[serde(default)]
    pub seq_id: u32,
}

impl PathSegment {
    pub fn new(
        src_switch: SwitchId,
        src_port: PortNumber,
        dest_switch: SwitchId,
        dest_port: PortNumber,
    ) -> Self {
        Self {
            src_switch,
            src_port,
            dest_switch,
            dest_port,
            seq_id: 0,
        }
    }
}

/// A concrete route realizing a flow, with the resources its rules use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredFlowPath")]
pub struct FlowPath {
    pub path_id: PathId,
    pub flow_id: FlowId,
    pub cookie: Cookie,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter_id: Option<MeterId>,
    /// Encapsulation tag used between ingress and egress switches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit_vlan: Option<VlanId>,
    pub src_switch: SwitchId,
    pub dest_switch: SwitchId,
    segments: Vec<PathSegment>,
    pub status: FlowPathStatus,
}

impl FlowPath {
    /// Creates a path in the `InProgress` status.
    ///
    /// Segment sequence ids are renumbered in the given order.
    pub fn new(
        path_id: PathId,
        flow_id: FlowId,
        cookie: Cookie,
        src_switch: SwitchId,
        dest_switch: SwitchId,
        segments: Vec<PathSegment>,
    ) -> Self {
        let mut path = Self {
            path_id,
            flow_id,
            cookie,
            meter_id: None,
            transit_vlan: None,
            src_switch,
            dest_switch,
            segments: Vec::new(),
            status: FlowPathStatus::InProgress,
        };
        path.set_segments(segments);
        path
    }

    pub fn with_meter(mut self, meter_id: MeterId) -> Self {
        self.meter_id = Some(meter_id);
        self
    }

    pub fn with_transit_vlan(mut self, vlan: VlanId) -> Self {
        self.transit_vlan = Some(vlan);
        self
    }

    /// Returns the segments ordered by sequence id.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Replaces the segments, assigning sequence ids 0..n.
    pub fn set_segments(&mut self, segments: Vec<PathSegment>) {
        self.segments = segments
            .into_iter()
            .enumerate()
            .map(|(idx, mut segment)| {
                segment.seq_id = idx as u32;
                segment
            })
            .collect();
    }

    /// Returns true if the path never leaves its source switch.
    pub fn is_one_switch(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns every switch the path visits, in order.
    pub fn switches(&self) -> Vec<SwitchId> {
        let mut switches = vec![self.src_switch];
        for segment in &self.segments {
            if switches.last() != Some(&segment.dest_switch) {
                switches.push(segment.dest_switch);
            }
        }
        switches
    }
}

/// Wire form of [`FlowPath`]. Segments are put in `seq_id` order and
/// renumbered when converted.
#[derive(Deserialize)]
struct StoredFlowPath {
    path_id: PathId,
    flow_id: FlowId,
    cookie: Cookie,
    #[serde(default)]
    meter_id: Option<MeterId>,
    #[serde(default)]
    transit_vlan: Option<VlanId>,
    src_switch: SwitchId,
    dest_switch: SwitchId,
    #[serde(default)]
    segments: Vec<PathSegment>,
    status: FlowPathStatus,
}

impl From<StoredFlowPath> for FlowPath {
    fn from(stored: StoredFlowPath) -> Self {
        let mut segments = stored.segments;
        segments.sort_by_key(|segment| segment.seq_id);
        let mut path = FlowPath::new(
            stored.path_id,
            stored.flow_id,
            stored.cookie,
            stored.src_switch,
            stored.dest_switch,
            segments,
        );
        path.meter_id = stored.meter_id;
        path.transit_vlan = stored.transit_vlan;
        path.status = stored.status;
        path
    }
}

/// Administrative status of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchStatus {
    Active,
    Inactive,
}

/// A switch known to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switch {
    pub switch_id: SwitchId,
    pub status: SwitchStatus,
}

impl Switch {
    pub fn active(switch_id: SwitchId) -> Self {
        Self {
            switch_id,
            status: SwitchStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SwitchStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sw(id: u64) -> SwitchId {
        SwitchId::new(id)
    }

    #[test]
    fn test_deserialized_path_is_renumbered() {
        let raw = serde_json::json!({
            "path_id": "f1-p1",
            "flow_id": "f1",
            "cookie": Cookie::forward(1),
            "src_switch": "00:00:00:00:00:00:00:01",
            "dest_switch": "00:00:00:00:00:00:00:03",
            "segments": [
                { "src_switch": "00:00:00:00:00:00:00:02", "src_port": 7,
                  "dest_switch": "00:00:00:00:00:00:00:03", "dest_port": 8, "seq_id": 9 },
                { "src_switch": "00:00:00:00:00:00:00:01", "src_port": 5,
                  "dest_switch": "00:00:00:00:00:00:00:02", "dest_port": 6, "seq_id": 4 }
            ],
            "status": "active"
        });
        let path: FlowPath = serde_json::from_value(raw).unwrap();

        let order: Vec<(SwitchId, u32)> = path
            .segments()
            .iter()
            .map(|segment| (segment.src_switch, segment.seq_id))
            .collect();
        assert_eq!(order, vec![(sw(1), 0), (sw(2), 1)]);
        assert_eq!(path.switches(), vec![sw(1), sw(2), sw(3)]);
        assert_eq!(path.status, FlowPathStatus::Active);

        let again: FlowPath = serde_json::from_value(serde_json::to_value(&path).unwrap()).unwrap();
        assert_eq!(again, path);
    }

    #[test]
    fn test_set_segments_renumbers() {
        let flow_id = FlowId::new("f1").unwrap();
        let mut seg = PathSegment::new(sw(1), 2, sw(2), 1);
        seg.seq_id = 7;
        let path = FlowPath::new(
            PathId::new("p1"),
            flow_id,
            Cookie::forward(1),
            sw(1),
            sw(3),
            vec![seg, PathSegment::new(sw(2), 2, sw(3), 1)],
        );
        let ids: Vec<u32> = path.segments().iter().map(|s| s.seq_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(path.status, FlowPathStatus::InProgress);
    }

    #[test]
    fn test_path_switches() {
        let path = FlowPath::new(
            PathId::new("p1"),
            FlowId::new("f1").unwrap(),
            Cookie::forward(1),
            sw(1),
            sw(3),
            vec![
                PathSegment::new(sw(1), 2, sw(2), 1),
                PathSegment::new(sw(2), 2, sw(3), 1),
            ],
        );
        assert_eq!(path.switches(), vec![sw(1), sw(2), sw(3)]);
        assert!(!path.is_one_switch());
    }

    #[test]
    fn test_endpoint_display() {
        let ep = FlowEndpoint::new(sw(1), 5).with_outer_vlan(VlanId::new(100).unwrap());
        assert_eq!(ep.to_string(), "00:00:00:00:00:00:00:01_5:100");
    }

    #[test]
    fn test_flow_serde() {
        let flow = Flow::new(
            FlowId::new("f1").unwrap(),
            FlowEndpoint::new(sw(1), 1),
            FlowEndpoint::new(sw(2), 1),
        )
        .with_bandwidth(1000);
        let json = serde_json::to_string(&flow).unwrap();
        assert!(json.contains("\"status\":\"down\""));
        let back: Flow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flow);
    }
}
