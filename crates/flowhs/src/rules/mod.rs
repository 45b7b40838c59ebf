//! Rule descriptors and the speaker request/response contract.
//!
//! A [`RuleDescriptor`] describes one rule on one switch. Through the
//! [`FlowSegmentRequestFactory`] trait it renders itself into an install or a
//! remove [`FlowSegmentRequest`] for any command id. Both renderings share
//! the cookie and match criteria so that re-applying either one on the
//! switch is idempotent.

mod descriptor;
mod request;

pub use descriptor::{MeterConfig, RuleDescriptor, RuleRole};
pub use request::{
    FlowSegmentOperation, FlowSegmentRequest, FlowSegmentRequestFactory, InstallInstructions,
    RemoveCriteria, SpeakerError, SpeakerErrorCode, SpeakerResponse,
};
