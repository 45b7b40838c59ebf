//! FlowHsDaemon implementation.
//!
//! The daemon hosts the running flow operation sagas. It:
//! - starts one tokio task per accepted flow request
//! - keeps at most one saga per flow id
//! - routes speaker responses to the saga owning the flow
//! - hands the terminal outcome back to the requester

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use flowhs_common::RetryPolicy;
use flowhs_types::FlowId;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::FlowHsConfig;
use crate::error::{FlowHsError, Result};
use crate::flow_operation::{
    FlowOperationOutcome, FlowOperationRequest, FlowOperationSaga, OperationResult,
    SagaCollaborators,
};
use crate::rules::SpeakerResponse;

use super::messages::InboundMessage;

/// Configuration for the FlowHsDaemon.
#[derive(Debug, Clone, Copy)]
pub struct FlowHsDaemonConfig {
    pub retry_policy: RetryPolicy,
    /// Depth of each saga's response queue
    pub response_channel_capacity: usize,
}

impl Default for FlowHsDaemonConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            response_channel_capacity: 1024,
        }
    }
}

impl FlowHsDaemonConfig {
    /// Builds the daemon settings from a validated file configuration.
    pub fn from_config(config: &FlowHsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            retry_policy: config.retry_policy()?,
            response_channel_capacity: config.daemon.response_channel_capacity,
        })
    }
}

/// Counters of the daemon's activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaemonStats {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub reverted: u64,
    pub revert_failed: u64,
    pub discarded_responses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    reverted: AtomicU64,
    revert_failed: AtomicU64,
    discarded_responses: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: &FlowOperationOutcome) {
        match outcome.result {
            OperationResult::Completed => Self::bump(&self.completed),
            OperationResult::Reverted { .. } => Self::bump(&self.reverted),
            OperationResult::RevertFailed { .. } => Self::bump(&self.revert_failed),
        }
    }

    fn snapshot(&self) -> DaemonStats {
        DaemonStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            reverted: self.reverted.load(Ordering::Relaxed),
            revert_failed: self.revert_failed.load(Ordering::Relaxed),
            discarded_responses: self.discarded_responses.load(Ordering::Relaxed),
        }
    }
}

type SagaRoutes = HashMap<FlowId, mpsc::Sender<SpeakerResponse>>;

/// Drops the route of `flow_id` if it still belongs to the channel `own`
/// was taken from. Returns true if the route was removed.
async fn release_route(
    active: &RwLock<SagaRoutes>,
    flow_id: &FlowId,
    own: &mpsc::WeakSender<SpeakerResponse>,
) -> bool {
    let mut active = active.write().await;
    let owned = match (active.get(flow_id), own.upgrade()) {
        (Some(route), Some(own)) => route.same_channel(&own),
        _ => false,
    };
    if owned {
        active.remove(flow_id);
    } else {
        debug!("Route of flow {} belongs to another saga, leaving it", flow_id);
    }
    owned
}

/// Host service running flow operation sagas concurrently.
#[derive(Debug, Clone)]
pub struct FlowHsDaemon {
    config: FlowHsDaemonConfig,
    collaborators: SagaCollaborators,
    /// Response channel of every running saga, by flow
    active: Arc<RwLock<SagaRoutes>>,
    counters: Arc<Counters>,
    shutting_down: Arc<AtomicBool>,
}

impl FlowHsDaemon {
    pub fn new(config: FlowHsDaemonConfig, collaborators: SagaCollaborators) -> Self {
        Self {
            config,
            collaborators,
            active: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &FlowHsDaemonConfig {
        &self.config
    }

    /// Starts a saga for `request`.
    ///
    /// Fails with [`FlowHsError::FlowInProgress`] if the flow already has a
    /// running saga, and with [`FlowHsError::ShuttingDown`] once
    /// [`shutdown`](Self::shutdown) was called. The returned receiver yields
    /// the terminal outcome.
    pub async fn submit(
        &self,
        request: FlowOperationRequest,
    ) -> Result<oneshot::Receiver<FlowOperationOutcome>> {
        let flow_id = request.flow_id().clone();
        let kind = request.kind();
        let (response_tx, mut response_rx) =
            mpsc::channel::<SpeakerResponse>(self.config.response_channel_capacity);
        let own_route = response_tx.downgrade();

        {
            let mut active = self.active.write().await;
            if self.shutting_down.load(Ordering::SeqCst) {
                Counters::bump(&self.counters.rejected);
                warn!("Rejecting flow {} for {}: daemon is shutting down", kind, flow_id);
                audit_log!(AuditRecord::new(AuditCategory::FlowOperation, "FlowHsDaemon", format!("submit_{}", kind))
                    .with_outcome(AuditOutcome::Denied)
                    .with_object_id(flow_id.as_str())
                    .with_object_type("flow")
                    .with_error("daemon is shutting down"));
                return Err(FlowHsError::ShuttingDown);
            }
            if active.contains_key(&flow_id) {
                Counters::bump(&self.counters.rejected);
                warn!("Rejecting flow {} for {}: operation in progress", kind, flow_id);
                audit_log!(AuditRecord::new(AuditCategory::FlowOperation, "FlowHsDaemon", format!("submit_{}", kind))
                    .with_outcome(AuditOutcome::Denied)
                    .with_object_id(flow_id.as_str())
                    .with_object_type("flow")
                    .with_error("operation in progress"));
                return Err(FlowHsError::FlowInProgress(flow_id));
            }
            active.insert(flow_id.clone(), response_tx);
        }
        Counters::bump(&self.counters.submitted);

        let record = AuditRecord::new(AuditCategory::FlowOperation, "FlowHsDaemon", format!("submit_{}", kind))
            .with_outcome(AuditOutcome::Success)
            .with_object_id(flow_id.as_str())
            .with_object_type("flow")
            .with_correlation_id(flow_id.as_str());
        audit_log!(record);

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let mut saga = FlowOperationSaga::new(
            request,
            self.config.retry_policy,
            self.collaborators.clone(),
        );
        let active = Arc::clone(&self.active);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            if let Err(e) = saga.start() {
                error!("Flow {} saga rejected its start: {}", flow_id, e);
            }

            while !saga.is_terminal() {
                let Some(response) = response_rx.recv().await else {
                    warn!("Response channel of flow {} closed in state {}", flow_id, saga.state());
                    break;
                };
                if let Err(e) = saga.handle_response(&response) {
                    error!("Flow {} saga failed to handle a response: {}", flow_id, e);
                    break;
                }
            }

            release_route(&active, &flow_id, &own_route).await;

            match saga.outcome() {
                Some(outcome) => {
                    counters.record_outcome(&outcome);
                    if outcome_tx.send(outcome).is_err() {
                        debug!("Requester of flow {} is gone, outcome dropped", flow_id);
                    }
                }
                None => error!("Flow {} saga stopped in non-terminal state {}", flow_id, saga.state()),
            }
        });

        Ok(outcome_rx)
    }

    /// Routes a speaker response to the saga owning its flow.
    ///
    /// Returns false if no saga is running for the flow; the response is
    /// discarded.
    pub async fn dispatch_response(&self, response: SpeakerResponse) -> bool {
        let sender = self.active.read().await.get(&response.flow_id).cloned();
        let delivered = match sender {
            Some(sender) => sender.send(response.clone()).await.is_ok(),
            None => false,
        };
        if !delivered {
            Counters::bump(&self.counters.discarded_responses);
            info!(
                "No running operation for flow {}, discarding response for command {}",
                response.flow_id, response.command_id
            );
        }
        delivered
    }

    /// Decodes and handles one raw JSON message.
    ///
    /// Flow requests yield the receiver of their outcome.
    pub async fn handle_message(
        &self,
        raw: &str,
    ) -> Result<Option<oneshot::Receiver<FlowOperationOutcome>>> {
        match InboundMessage::decode(raw) {
            Ok(InboundMessage::FlowRequest(request)) => self.submit(request).await.map(Some),
            Ok(InboundMessage::SpeakerResponse(response)) => {
                self.dispatch_response(response).await;
                Ok(None)
            }
            Err(e) => {
                Counters::bump(&self.counters.rejected);
                audit_log!(AuditRecord::new(AuditCategory::ErrorCondition, "FlowHsDaemon", "decode_message")
                    .with_error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Returns the flows with a running saga, sorted.
    pub async fn active_flows(&self) -> Vec<FlowId> {
        let mut flows: Vec<FlowId> = self.active.read().await.keys().cloned().collect();
        flows.sort();
        flows
    }

    pub fn stats(&self) -> DaemonStats {
        self.counters.snapshot()
    }

    /// Stops accepting requests and closes every saga's response channel.
    ///
    /// Running sagas stop where they are and their requesters see the
    /// outcome channel close.
    pub async fn shutdown(&self) {
        let mut active = self.active.write().await;
        self.shutting_down.store(true, Ordering::SeqCst);
        info!("Shutting down FlowHsDaemon with {} running operation(s)", active.len());
        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "FlowHsDaemon", "shutdown")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({ "running_operations": active.len() })));
        active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::RecordingCarrier;
    use crate::history::InMemoryHistorySink;
    use crate::model::{Flow, FlowEndpoint, Switch};
    use crate::path_computer::StaticPathComputer;
    use crate::persistence::{FlowRepository, InMemoryFlowRepository};
    use flowhs_types::SwitchId;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn daemon() -> (FlowHsDaemon, Arc<RecordingCarrier>) {
        let carrier = Arc::new(RecordingCarrier::new());
        let repository = Arc::new(InMemoryFlowRepository::new());
        repository.save_switch(Switch::active(SwitchId::new(1))).unwrap();
        let collaborators = SagaCollaborators {
            carrier: carrier.clone(),
            repository,
            path_computer: Arc::new(StaticPathComputer::new()),
            history: Arc::new(InMemoryHistorySink::new()),
        };
        (FlowHsDaemon::new(FlowHsDaemonConfig::default(), collaborators), carrier)
    }

    fn one_switch_flow(id: &str) -> FlowOperationRequest {
        FlowOperationRequest::Create {
            flow: Flow::new(
                FlowId::new(id).unwrap(),
                FlowEndpoint::new(SwitchId::new(1), 1),
                FlowEndpoint::new(SwitchId::new(1), 2),
            ),
        }
    }

    async fn wait_for_requests(carrier: &RecordingCarrier, count: usize) {
        for _ in 0..200 {
            if carrier.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} request(s), got {}", count, carrier.len());
    }

    #[tokio::test]
    async fn test_submit_rejects_second_operation() {
        let (daemon, carrier) = daemon();
        let outcome = daemon.submit(one_switch_flow("f1")).await.unwrap();
        let err = daemon.submit(one_switch_flow("f1")).await.unwrap_err();
        assert!(matches!(err, FlowHsError::FlowInProgress(_)));
        assert_eq!(daemon.active_flows().await, vec![FlowId::new("f1").unwrap()]);

        wait_for_requests(&carrier, 1).await;
        for request in carrier.take() {
            assert!(daemon.dispatch_response(SpeakerResponse::success(&request)).await);
        }

        let outcome = outcome.await.unwrap();
        assert!(outcome.is_success());
        assert!(daemon.active_flows().await.is_empty());
        assert_eq!(
            daemon.stats(),
            DaemonStats {
                submitted: 1,
                rejected: 1,
                completed: 1,
                ..DaemonStats::default()
            }
        );
    }

    #[tokio::test]
    async fn test_response_without_saga_is_discarded() {
        let (daemon, carrier) = daemon();
        let outcome = daemon.submit(one_switch_flow("f1")).await.unwrap();
        wait_for_requests(&carrier, 1).await;
        let request = carrier.take().remove(0);
        daemon.dispatch_response(SpeakerResponse::success(&request)).await;
        outcome.await.unwrap();

        assert!(!daemon.dispatch_response(SpeakerResponse::success(&request)).await);
        assert_eq!(daemon.stats().discarded_responses, 1);
    }

    #[tokio::test]
    async fn test_handle_message_rejects_garbage() {
        let (daemon, _) = daemon();
        let err = daemon.handle_message(r#"{"type":"nope"}"#).await.unwrap_err();
        assert!(matches!(err, FlowHsError::InvalidRequest(_)));
        assert_eq!(daemon.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_running_sagas() {
        let (daemon, carrier) = daemon();
        let outcome = daemon.submit(one_switch_flow("f1")).await.unwrap();
        wait_for_requests(&carrier, 1).await;

        daemon.shutdown().await;
        assert!(outcome.await.is_err());
        assert!(daemon.active_flows().await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let (daemon, carrier) = daemon();
        let first = daemon.submit(one_switch_flow("f1")).await.unwrap();
        wait_for_requests(&carrier, 1).await;
        carrier.take();

        daemon.shutdown().await;
        let err = daemon
            .submit(FlowOperationRequest::Reroute {
                flow_id: FlowId::new("f1").unwrap(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FlowHsError::ShuttingDown));
        assert!(matches!(
            daemon.submit(one_switch_flow("f2")).await,
            Err(FlowHsError::ShuttingDown)
        ));

        assert!(first.await.is_err());
        tokio::task::yield_now().await;
        assert!(carrier.is_empty());
        assert!(daemon.active_flows().await.is_empty());
        assert_eq!(daemon.stats().rejected, 2);
    }

    #[tokio::test]
    async fn test_stale_saga_leaves_newer_route() {
        let active = RwLock::new(SagaRoutes::new());
        let flow_id = FlowId::new("f1").unwrap();
        let (stale_tx, _stale_rx) = mpsc::channel::<SpeakerResponse>(1);
        let stale = stale_tx.downgrade();
        let (current_tx, mut current_rx) = mpsc::channel::<SpeakerResponse>(1);
        let current = current_tx.downgrade();
        active.write().await.insert(flow_id.clone(), current_tx);

        assert!(!release_route(&active, &flow_id, &stale).await);
        let route = active.read().await.get(&flow_id).cloned().unwrap();
        let response = SpeakerResponse {
            command_id: flowhs_common::CommandId::new(),
            flow_id: flow_id.clone(),
            switch_id: SwitchId::new(1),
            error: None,
        };
        route.send(response).await.unwrap();
        assert_eq!(current_rx.recv().await.unwrap().flow_id, flow_id);
        drop(route);

        assert!(release_route(&active, &flow_id, &current).await);
        assert!(active.read().await.is_empty());
    }

    #[test]
    fn test_config_from_file_config() {
        let mut config = FlowHsConfig::default();
        config.orchestrator.speaker_command_retries_limit = 4;
        let daemon_config = FlowHsDaemonConfig::from_config(&config).unwrap();
        assert_eq!(daemon_config.retry_policy.limit(), 4);

        config.orchestrator.speaker_command_retries_limit = 0;
        assert!(matches!(
            FlowHsDaemonConfig::from_config(&config),
            Err(FlowHsError::Config(_))
        ));
    }
}
