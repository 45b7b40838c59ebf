//! Speaker requests and responses.

use std::fmt;

use flowhs_common::{CommandId, CommandKind};
use flowhs_types::{Cookie, FlowId, MeterId, PortNumber, SwitchId, VlanId};
use serde::{Deserialize, Serialize};

use super::descriptor::{MeterConfig, RuleDescriptor, RuleRole};

/// Everything the speaker needs to install a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallInstructions {
    pub role: RuleRole,
    pub in_port: PortNumber,
    pub match_vlans: Vec<VlanId>,
    pub out_port: PortNumber,
    pub output_vlans: Vec<VlanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter: Option<MeterConfig>,
}

/// What the speaker needs to find and delete a rule (and its meter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveCriteria {
    pub in_port: PortNumber,
    pub match_vlans: Vec<VlanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter_id: Option<MeterId>,
}

/// The operation carried by a [`FlowSegmentRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum FlowSegmentOperation {
    Install(InstallInstructions),
    Remove(RemoveCriteria),
}

impl FlowSegmentOperation {
    pub fn kind(&self) -> CommandKind {
        match self {
            FlowSegmentOperation::Install(_) => CommandKind::Install,
            FlowSegmentOperation::Remove(_) => CommandKind::Remove,
        }
    }
}

/// A request sent to the speaker owning `switch_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSegmentRequest {
    pub command_id: CommandId,
    pub flow_id: FlowId,
    pub switch_id: SwitchId,
    pub cookie: Cookie,
    #[serde(flatten)]
    pub operation: FlowSegmentOperation,
}

impl FlowSegmentRequest {
    pub fn kind(&self) -> CommandKind {
        self.operation.kind()
    }
}

/// Renders install and remove requests for one rule.
///
/// Implementations must be deterministic and side-effect free: two
/// requests of the same kind rendered from the same factory differ only in
/// their command id.
pub trait FlowSegmentRequestFactory {
    fn switch_id(&self) -> SwitchId;

    fn cookie(&self) -> Cookie;

    fn make_install_request(&self, command_id: CommandId) -> FlowSegmentRequest;

    fn make_remove_request(&self, command_id: CommandId) -> FlowSegmentRequest;

    /// Renders the request for the given command kind.
    fn make_request(&self, kind: CommandKind, command_id: CommandId) -> FlowSegmentRequest {
        match kind {
            CommandKind::Install => self.make_install_request(command_id),
            CommandKind::Remove => self.make_remove_request(command_id),
        }
    }
}

impl RuleDescriptor {
    fn request(&self, command_id: CommandId, operation: FlowSegmentOperation) -> FlowSegmentRequest {
        FlowSegmentRequest {
            command_id,
            flow_id: self.flow_id.clone(),
            switch_id: self.switch_id,
            cookie: self.cookie,
            operation,
        }
    }
}

impl FlowSegmentRequestFactory for RuleDescriptor {
    fn switch_id(&self) -> SwitchId {
        self.switch_id
    }

    fn cookie(&self) -> Cookie {
        self.cookie
    }

    fn make_install_request(&self, command_id: CommandId) -> FlowSegmentRequest {
        self.request(
            command_id,
            FlowSegmentOperation::Install(InstallInstructions {
                role: self.role,
                in_port: self.in_port,
                match_vlans: self.match_vlans.clone(),
                out_port: self.out_port,
                output_vlans: self.output_vlans.clone(),
                meter: self.meter,
            }),
        )
    }

    fn make_remove_request(&self, command_id: CommandId) -> FlowSegmentRequest {
        self.request(
            command_id,
            FlowSegmentOperation::Remove(RemoveCriteria {
                in_port: self.in_port,
                match_vlans: self.match_vlans.clone(),
                meter_id: self.meter.map(|m| m.meter_id),
            }),
        )
    }
}

/// Classification of a speaker-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerErrorCode {
    SwitchUnavailable,
    MissingRule,
    MeterConflict,
    BadRequest,
    Timeout,
    Unknown,
}

impl fmt::Display for SpeakerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpeakerErrorCode::SwitchUnavailable => "SWITCH_UNAVAILABLE",
            SpeakerErrorCode::MissingRule => "MISSING_RULE",
            SpeakerErrorCode::MeterConflict => "METER_CONFLICT",
            SpeakerErrorCode::BadRequest => "BAD_REQUEST",
            SpeakerErrorCode::Timeout => "TIMEOUT",
            SpeakerErrorCode::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Error payload of a failed speaker response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerError {
    pub code: SpeakerErrorCode,
    #[serde(default)]
    pub description: String,
}

impl SpeakerError {
    pub fn new(code: SpeakerErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

impl fmt::Display for SpeakerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.description)
        }
    }
}

/// The speaker's answer to exactly one [`FlowSegmentRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerResponse {
    pub command_id: CommandId,
    pub flow_id: FlowId,
    pub switch_id: SwitchId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SpeakerError>,
}

impl SpeakerResponse {
    /// Builds a success response for a request.
    pub fn success(request: &FlowSegmentRequest) -> Self {
        Self {
            command_id: request.command_id,
            flow_id: request.flow_id.clone(),
            switch_id: request.switch_id,
            error: None,
        }
    }

    /// Builds an error response for a request.
    pub fn failure(request: &FlowSegmentRequest, error: SpeakerError) -> Self {
        Self {
            error: Some(error),
            ..Self::success(request)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor() -> RuleDescriptor {
        RuleDescriptor {
            flow_id: FlowId::new("flow-1").unwrap(),
            switch_id: SwitchId::new(1),
            cookie: Cookie::forward(5),
            role: RuleRole::Ingress,
            in_port: 10,
            out_port: 2,
            match_vlans: vec![VlanId::new(100).unwrap()],
            output_vlans: vec![VlanId::new(1001).unwrap()],
            meter: Some(MeterConfig {
                meter_id: MeterId::new(40).unwrap(),
                bandwidth: 1000,
            }),
        }
    }

    fn without_command_id(request: &FlowSegmentRequest) -> serde_json::Value {
        let mut value = serde_json::to_value(request).unwrap();
        value.as_object_mut().unwrap().remove("command_id");
        value
    }

    #[test]
    fn test_install_requests_differ_only_in_command_id() {
        let d = descriptor();
        let (c1, c2) = (CommandId::new(), CommandId::new());
        let r1 = d.make_install_request(c1);
        let r2 = d.make_install_request(c2);

        assert_eq!(r1.command_id, c1);
        assert_eq!(r2.command_id, c2);
        assert_eq!(without_command_id(&r1), without_command_id(&r2));
    }

    #[test]
    fn test_same_command_id_is_byte_identical() {
        let d = descriptor();
        let id = CommandId::new();
        assert_eq!(
            serde_json::to_vec(&d.make_remove_request(id)).unwrap(),
            serde_json::to_vec(&d.make_remove_request(id)).unwrap()
        );
    }

    #[test]
    fn test_install_and_remove_share_cookie_and_match() {
        let d = descriptor();
        let install = d.make_request(CommandKind::Install, CommandId::new());
        let remove = d.make_request(CommandKind::Remove, CommandId::new());

        assert_eq!(install.kind(), CommandKind::Install);
        assert_eq!(remove.kind(), CommandKind::Remove);
        assert_eq!(install.cookie, remove.cookie);
        match (&install.operation, &remove.operation) {
            (FlowSegmentOperation::Install(i), FlowSegmentOperation::Remove(r)) => {
                assert_eq!(i.in_port, r.in_port);
                assert_eq!(i.match_vlans, r.match_vlans);
                assert_eq!(r.meter_id, i.meter.map(|m| m.meter_id));
            }
            other => panic!("unexpected operations: {:?}", other),
        }
    }

    #[test]
    fn test_request_wire_format() {
        let request = descriptor().make_remove_request(CommandId::new());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["operation"], "remove");
        assert_eq!(value["switch_id"], "00:00:00:00:00:00:00:01");
        let back: FlowSegmentRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_response_constructors() {
        let request = descriptor().make_install_request(CommandId::new());
        assert!(SpeakerResponse::success(&request).is_success());

        let failed = SpeakerResponse::failure(
            &request,
            SpeakerError::new(SpeakerErrorCode::Timeout, "no reply"),
        );
        assert!(!failed.is_success());
        assert_eq!(failed.command_id, request.command_id);
        assert_eq!(failed.error.unwrap().to_string(), "TIMEOUT: no reply");
    }
}
