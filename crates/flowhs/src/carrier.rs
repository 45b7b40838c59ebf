//! Outbound transport towards the speakers.

use std::sync::Mutex;

use log::{debug, error};
use tokio::sync::mpsc;

use crate::rules::FlowSegmentRequest;

/// Fire-and-forget dispatch of speaker requests.
///
/// Every request eventually yields exactly one
/// [`SpeakerResponse`](crate::rules::SpeakerResponse), delivered out of band
/// to the daemon.
pub trait Carrier: Send + Sync {
    fn send_speaker_request(&self, request: FlowSegmentRequest);
}

/// Forwards requests into a tokio channel drained by the transport task.
#[derive(Debug, Clone)]
pub struct ChannelCarrier {
    tx: mpsc::UnboundedSender<FlowSegmentRequest>,
}

impl ChannelCarrier {
    /// Creates a carrier and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FlowSegmentRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Carrier for ChannelCarrier {
    fn send_speaker_request(&self, request: FlowSegmentRequest) {
        debug!(
            "Dispatching {} command {} to switch {}",
            request.kind(),
            request.command_id,
            request.switch_id
        );
        if let Err(e) = self.tx.send(request) {
            error!(
                "Transport channel closed, dropping command {} for switch {}",
                e.0.command_id, e.0.switch_id
            );
        }
    }
}

/// Keeps every request for later inspection.
#[derive(Debug, Default)]
pub struct RecordingCarrier {
    requests: Mutex<Vec<FlowSegmentRequest>>,
}

impl RecordingCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every request sent so far.
    pub fn requests(&self) -> Vec<FlowSegmentRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Drains the requests sent so far.
    pub fn take(&self) -> Vec<FlowSegmentRequest> {
        match self.requests.lock() {
            Ok(mut requests) => std::mem::take(&mut *requests),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.requests().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Carrier for RecordingCarrier {
    fn send_speaker_request(&self, request: FlowSegmentRequest) {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }
    }
}
