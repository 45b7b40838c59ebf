//! JSON messages crossing the daemon boundary.

use serde::{Deserialize, Serialize};

use crate::error::{FlowHsError, Result};
use crate::flow_operation::{FlowOperationOutcome, FlowOperationRequest};
use crate::rules::{FlowSegmentRequest, SpeakerResponse};

/// A message read by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundMessage {
    FlowRequest(FlowOperationRequest),
    SpeakerResponse(SpeakerResponse),
}

/// A message written by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundMessage {
    SpeakerRequest(FlowSegmentRequest),
    FlowOutcome(FlowOperationOutcome),
}

impl InboundMessage {
    /// Decodes one JSON message; anything malformed or unknown is an invalid request.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| FlowHsError::InvalidRequest(e.to_string()))
    }
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_flow_request() {
        let raw = r#"{"type":"flow_request","payload":{"operation":"delete","flow_id":"f1"}}"#;
        match InboundMessage::decode(raw).unwrap() {
            InboundMessage::FlowRequest(request) => assert_eq!(request.flow_id().as_str(), "f1"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_invalid() {
        let raw = r#"{"type":"flow_stats","payload":{}}"#;
        assert!(matches!(
            InboundMessage::decode(raw),
            Err(FlowHsError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_malformed_json_is_invalid() {
        assert!(matches!(
            InboundMessage::decode("{not json"),
            Err(FlowHsError::InvalidRequest(_))
        ));
        assert!(matches!(
            InboundMessage::decode(r#"{"type":"flow_request","payload":{"operation":"delete","flow_id":""}}"#),
            Err(FlowHsError::InvalidRequest(_))
        ));
    }
}
