//! Work performed on entering each saga state.
//!
//! Actions read and update the [`FlowOperationContext`] and the repository,
//! but never send requests or write history directly: they return
//! [`Effects`] the saga applies in order.

use std::collections::HashSet;
use std::sync::Arc;

use flowhs_common::{Command, CommandId, CommandKind};
use flowhs_types::{Cookie, SwitchId};
use log::{debug, error, info, warn};

use crate::history::HistoryEntry;
use crate::model::{Flow, FlowPath, FlowPathStatus, FlowStatus};
use crate::path_computer::PathComputer;
use crate::persistence::FlowRepository;
use crate::rules::{FlowSegmentRequest, FlowSegmentRequestFactory, RuleDescriptor};

use super::context::FlowOperationContext;
use super::reconciler::{phase_outcome, PhaseOutcome};
use super::types::{Event, FlowOperationKind, FlowOperationRequest, Phase};

/// What the saga applies after running an action.
#[derive(Debug, Default)]
pub struct Effects {
    pub history: Vec<HistoryEntry>,
    pub requests: Vec<FlowSegmentRequest>,
    /// Event to fire next, if the action resolved synchronously.
    pub event: Option<Event>,
    /// Error message carried by an `Event::Error`.
    pub error: Option<String>,
    /// Problems to report with the outcome without failing the operation.
    pub warnings: Vec<String>,
}

impl Effects {
    fn advance(mut self, event: Event) -> Self {
        self.event = Some(event);
        self
    }

    fn fail(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.history.push(HistoryEntry::error(message.clone(), ""));
        self.event = Some(Event::Error);
        self.error = Some(message);
        self
    }

    fn note(mut self, title: impl Into<String>, details: impl Into<String>) -> Self {
        self.history.push(HistoryEntry::action(title, details));
        self
    }
}

/// Loads the flow and its current path, asks for a new path and derives
/// the rules of both.
pub fn compute_path(
    ctx: &mut FlowOperationContext,
    repository: &dyn FlowRepository,
    path_computer: &dyn PathComputer,
) -> Effects {
    let effects = Effects::default();

    let stored = match repository.find_flow(&ctx.flow_id) {
        Ok(stored) => stored,
        Err(e) => return effects.fail(format!("Failed to load flow {}: {}", ctx.flow_id, e)),
    };

    let target = match (&ctx.request, stored) {
        (FlowOperationRequest::Create { .. }, Some(_)) => {
            return effects.fail(format!("Flow {} already exists", ctx.flow_id));
        }
        (FlowOperationRequest::Create { flow }, None) => {
            let mut flow = flow.clone();
            flow.path_id = None;
            Some(flow)
        }
        (_, None) => return effects.fail(format!("Flow {} not found", ctx.flow_id)),
        (FlowOperationRequest::Update { flow }, Some(existing)) => {
            let mut flow = flow.clone();
            flow.path_id = existing.path_id.clone();
            ctx.original_flow = Some(existing);
            Some(flow)
        }
        (FlowOperationRequest::Reroute { .. }, Some(existing)) => {
            ctx.original_flow = Some(existing.clone());
            Some(existing)
        }
        (FlowOperationRequest::Delete { .. }, Some(existing)) => {
            ctx.original_flow = Some(existing);
            None
        }
    };

    let effects = match load_previous_path(ctx, repository) {
        Ok(effects) => effects,
        Err(message) => return effects.fail(message),
    };

    let mut effects = effects;
    if let Some(flow) = target {
        let path = match path_computer.compute(&flow) {
            Ok(path) => path,
            Err(e) => return effects.fail(format!("Failed to compute path for flow {}: {}", ctx.flow_id, e)),
        };
        ctx.new_rules = RuleDescriptor::for_path(&flow, &path)
            .into_iter()
            .map(Arc::new)
            .collect();
        effects = effects.note(
            "New path was computed",
            format!(
                "Path {} over {} switch(es), cookie {}, {} rule(s)",
                path.path_id,
                path.switches().len(),
                path.cookie,
                ctx.new_rules.len()
            ),
        );
        ctx.target_path = Some(path);
        ctx.target_flow = Some(flow);
    }

    if let Err(message) = mark_in_progress(ctx, repository) {
        return effects.fail(message);
    }
    effects.advance(Event::PathComputed)
}

fn load_previous_path(
    ctx: &mut FlowOperationContext,
    repository: &dyn FlowRepository,
) -> Result<Effects, String> {
    let effects = Effects::default();
    let (flow, path_id) = match &ctx.original_flow {
        Some(flow) => match &flow.path_id {
            Some(path_id) => (flow.clone(), path_id.clone()),
            None => return Ok(effects),
        },
        None => return Ok(effects),
    };

    match repository.find_path(&path_id) {
        Ok(Some(path)) => {
            ctx.old_rules = RuleDescriptor::for_path(&flow, &path)
                .into_iter()
                .map(Arc::new)
                .collect();
            ctx.previous_path = Some(path);
            Ok(effects)
        }
        Ok(None) => {
            warn!("Flow {} refers to missing path {}", ctx.flow_id, path_id);
            Ok(effects.note(
                "Previous path is missing",
                format!("Path {} is not stored, no old rules to remove", path_id),
            ))
        }
        Err(e) => Err(format!("Failed to load path {}: {}", path_id, e)),
    }
}

fn mark_in_progress(
    ctx: &mut FlowOperationContext,
    repository: &dyn FlowRepository,
) -> Result<(), String> {
    let mut flow = match (&ctx.original_flow, &ctx.target_flow) {
        (Some(original), _) => original.clone(),
        (None, Some(target)) => target.clone(),
        (None, None) => return Ok(()),
    };
    flow.status = FlowStatus::InProgress;
    repository
        .save_flow(flow)
        .map_err(|e| format!("Failed to save flow {}: {}", ctx.flow_id, e))?;
    ctx.flow_touched = true;
    Ok(())
}

/// Resets the ledger and dispatches one command per rule of the phase.
///
/// A phase without rules fires its success event right away.
pub fn dispatch_phase(ctx: &mut FlowOperationContext, phase: Phase) -> Effects {
    let mut plan: Vec<(CommandKind, Arc<RuleDescriptor>)> = Vec::new();
    match phase {
        Phase::Install => {
            ctx.new_rules_dispatched = true;
            plan.extend(ctx.new_rules.iter().map(|r| (CommandKind::Install, Arc::clone(r))));
        }
        Phase::Remove => {
            ctx.old_rules_dispatched = true;
            plan.extend(ctx.old_rules.iter().map(|r| (CommandKind::Remove, Arc::clone(r))));
        }
        Phase::Revert => {
            if ctx.new_rules_dispatched {
                plan.extend(ctx.new_rules.iter().map(|r| (CommandKind::Remove, Arc::clone(r))));
            }
            if ctx.old_rules_dispatched {
                plan.extend(ctx.old_rules.iter().map(|r| (CommandKind::Install, Arc::clone(r))));
            }
        }
    }

    ctx.ledger.reset();
    let mut effects = Effects::default();

    for (kind, descriptor) in plan {
        let id = CommandId::new();
        let request = descriptor.make_request(kind, id);
        let switch_id = descriptor.switch_id;
        if let Err(e) = ctx.ledger.track(Command::new(id, kind, descriptor, switch_id)) {
            error!("Failed to track command {}: {}", id, e);
            return effects.fail(format!("Failed to dispatch {} command: {}", kind, e));
        }
        effects.requests.push(request);
    }

    let count = effects.requests.len();
    debug!("Dispatching {} command(s) for the {:?} phase of flow {}", count, phase, ctx.flow_id);

    match phase_outcome(&ctx.ledger, phase) {
        Some(PhaseOutcome::Succeeded) => effects
            .note(format!("No rules to {}", phase.noun()), "")
            .advance(phase.success_event()),
        Some(PhaseOutcome::Failed { message }) => effects.fail(message),
        None => effects.note(
            format!("Sent {} {} command(s)", count, phase.noun()),
            "",
        ),
    }
}

/// Checks that the new path is consistent and fully covered by the
/// installed rules.
pub fn validate_new_rules(ctx: &FlowOperationContext, repository: &dyn FlowRepository) -> Effects {
    let effects = Effects::default();
    let (flow, path) = match (&ctx.target_flow, &ctx.target_path) {
        (Some(flow), Some(path)) => (flow, path),
        _ => {
            return effects
                .note("No new rules to validate", "")
                .advance(Event::RulesValidated)
        }
    };

    let problems = path_problems(flow, path)
        .into_iter()
        .chain(coverage_problems(path, &ctx.new_rules))
        .chain(switch_problems(path, repository))
        .chain(cookie_conflicts(&ctx.new_rules, &ctx.old_rules))
        .collect::<Vec<_>>();

    if problems.is_empty() {
        return effects
            .note(
                "New rules were validated",
                format!("{} rule(s) on path {}", ctx.new_rules.len(), path.path_id),
            )
            .advance(Event::RulesValidated);
    }

    let mut effects = effects;
    for problem in &problems {
        effects.history.push(HistoryEntry::error("Validation problem", problem.clone()));
    }
    effects.fail(format!(
        "Validation of path {} failed with {} problem(s)",
        path.path_id,
        problems.len()
    ))
}

fn path_problems(flow: &Flow, path: &FlowPath) -> Vec<String> {
    let mut problems = Vec::new();
    if path.src_switch != flow.source.switch_id {
        problems.push(format!(
            "Path starts on {} but the flow source is on {}",
            path.src_switch, flow.source.switch_id
        ));
    }
    if path.dest_switch != flow.destination.switch_id {
        problems.push(format!(
            "Path ends on {} but the flow destination is on {}",
            path.dest_switch, flow.destination.switch_id
        ));
    }

    let segments = path.segments();
    match (segments.first(), segments.last()) {
        (Some(first), Some(last)) => {
            if first.src_switch != path.src_switch {
                problems.push(format!(
                    "First segment leaves {} instead of {}",
                    first.src_switch, path.src_switch
                ));
            }
            if last.dest_switch != path.dest_switch {
                problems.push(format!(
                    "Last segment reaches {} instead of {}",
                    last.dest_switch, path.dest_switch
                ));
            }
        }
        _ => {
            if path.src_switch != path.dest_switch {
                problems.push(format!(
                    "Path between {} and {} has no segments",
                    path.src_switch, path.dest_switch
                ));
            }
        }
    }

    for pair in segments.windows(2) {
        if pair[0].dest_switch != pair[1].src_switch {
            problems.push(format!(
                "Segment {} ends on {} but segment {} starts on {}",
                pair[0].seq_id, pair[0].dest_switch, pair[1].seq_id, pair[1].src_switch
            ));
        }
    }
    problems
}

fn coverage_problems(path: &FlowPath, rules: &[Arc<RuleDescriptor>]) -> Vec<String> {
    let covered: HashSet<SwitchId> = rules.iter().map(|r| r.switch_id).collect();
    path.switches()
        .into_iter()
        .filter(|sw| !covered.contains(sw))
        .map(|sw| format!("No rule for switch {}", sw))
        .collect()
}

fn switch_problems(path: &FlowPath, repository: &dyn FlowRepository) -> Vec<String> {
    path.switches()
        .into_iter()
        .filter_map(|sw| match repository.find_switch(&sw) {
            Ok(Some(switch)) if switch.is_active() => None,
            Ok(Some(_)) => Some(format!("Switch {} is not active", sw)),
            Ok(None) => Some(format!("Switch {} is not known", sw)),
            Err(e) => Some(format!("Failed to load switch {}: {}", sw, e)),
        })
        .collect()
}

fn cookie_conflicts(new_rules: &[Arc<RuleDescriptor>], old_rules: &[Arc<RuleDescriptor>]) -> Vec<String> {
    let old: HashSet<(SwitchId, Cookie)> = old_rules.iter().map(|r| (r.switch_id, r.cookie)).collect();
    new_rules
        .iter()
        .filter(|r| old.contains(&(r.switch_id, r.cookie)))
        .map(|r| format!("Cookie {} is already used by the old path on switch {}", r.cookie, r.switch_id))
        .collect()
}

/// Persists the result of a successful operation.
///
/// Persistence failures are recorded but do not change the outcome: the
/// network already reflects the change.
pub fn complete_operation(ctx: &FlowOperationContext, repository: &dyn FlowRepository) -> Effects {
    let mut effects = Effects::default();
    let mut failures = Vec::new();

    if ctx.kind() == FlowOperationKind::Delete {
        if let Err(e) = repository.remove_flow(&ctx.flow_id) {
            failures.push(format!("Failed to remove flow {}: {}", ctx.flow_id, e));
        }
    } else if let (Some(flow), Some(path)) = (&ctx.target_flow, &ctx.target_path) {
        let mut path = path.clone();
        path.status = FlowPathStatus::Active;
        let mut flow = flow.clone();
        flow.status = FlowStatus::Up;
        flow.path_id = Some(path.path_id.clone());

        if let Err(e) = repository.save_path(path) {
            failures.push(format!("Failed to save path: {}", e));
        }
        if let Err(e) = repository.save_flow(flow) {
            failures.push(format!("Failed to save flow {}: {}", ctx.flow_id, e));
        }
    }

    if let Some(previous) = &ctx.previous_path {
        if let Err(e) = repository.remove_path(&previous.path_id) {
            failures.push(format!("Failed to remove path {}: {}", previous.path_id, e));
        }
    }

    for failure in failures {
        error!("{}", failure);
        effects
            .history
            .push(HistoryEntry::error("Failed to persist operation result", failure.clone()));
        effects.warnings.push(failure);
    }

    info!("Flow {} {} completed", ctx.flow_id, ctx.kind());
    effects.note(format!("Flow {} completed", ctx.kind()), "")
}

/// Restores the stored flow after a rollback.
///
/// A flow being created, or one whose rollback failed, is left `Down`.
pub fn finish_revert(ctx: &FlowOperationContext, repository: &dyn FlowRepository) -> Effects {
    let effects = Effects::default();
    if !ctx.flow_touched {
        return effects.note("Flow was not modified", "");
    }

    let mut flow = match (&ctx.original_flow, &ctx.target_flow) {
        (Some(original), _) => original.clone(),
        (None, Some(target)) => target.clone(),
        (None, None) => return effects,
    };
    if ctx.revert_error.is_some() || ctx.original_flow.is_none() {
        flow.status = FlowStatus::Down;
    }
    let status = flow.status;

    match repository.save_flow(flow) {
        Ok(()) => effects.note("Flow status was restored", format!("{:?}", status)),
        Err(e) => {
            error!("Failed to restore flow {}: {}", ctx.flow_id, e);
            let mut effects = effects;
            effects.history.push(HistoryEntry::error(
                "Failed to restore flow status",
                e.to_string(),
            ));
            effects
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlowEndpoint, PathSegment, Switch, SwitchStatus};
    use crate::path_computer::StaticPathComputer;
    use crate::persistence::InMemoryFlowRepository;
    use flowhs_common::RetryPolicy;
    use flowhs_types::{FlowId, PathId};
    use pretty_assertions::assert_eq;

    fn sw(id: u64) -> SwitchId {
        SwitchId::new(id)
    }

    fn flow() -> Flow {
        Flow::new(
            FlowId::new("f1").unwrap(),
            FlowEndpoint::new(sw(1), 10),
            FlowEndpoint::new(sw(3), 20),
        )
    }

    fn setup() -> (InMemoryFlowRepository, StaticPathComputer) {
        let repo = InMemoryFlowRepository::new();
        for id in 1..=3 {
            repo.save_switch(Switch::active(sw(id))).unwrap();
        }
        let computer = StaticPathComputer::new();
        computer.add_route(
            sw(1),
            sw(3),
            vec![PathSegment::new(sw(1), 2, sw(2), 1), PathSegment::new(sw(2), 2, sw(3), 1)],
        );
        (repo, computer)
    }

    fn context(request: FlowOperationRequest) -> FlowOperationContext {
        FlowOperationContext::new(request, RetryPolicy::new(3).unwrap())
    }

    #[test]
    fn test_compute_for_create() {
        let (repo, computer) = setup();
        let mut ctx = context(FlowOperationRequest::Create { flow: flow() });

        let effects = compute_path(&mut ctx, &repo, &computer);
        assert_eq!(effects.event, Some(Event::PathComputed));
        assert_eq!(ctx.new_rules.len(), 3);
        assert!(ctx.old_rules.is_empty());
        assert!(ctx.flow_touched);
        let stored = repo.find_flow(&ctx.flow_id).unwrap().unwrap();
        assert_eq!(stored.status, FlowStatus::InProgress);
    }

    #[test]
    fn test_compute_rejects_existing_flow_on_create() {
        let (repo, computer) = setup();
        repo.save_flow(flow()).unwrap();
        let mut ctx = context(FlowOperationRequest::Create { flow: flow() });

        let effects = compute_path(&mut ctx, &repo, &computer);
        assert_eq!(effects.event, Some(Event::Error));
        assert_eq!(effects.error.as_deref(), Some("Flow f1 already exists"));
        assert!(!ctx.flow_touched);
    }

    #[test]
    fn test_compute_for_delete_has_no_target() {
        let (repo, computer) = setup();
        let mut ctx = context(FlowOperationRequest::Create { flow: flow() });
        compute_path(&mut ctx, &repo, &computer);
        let path = ctx.target_path.clone().unwrap();
        repo.save_path(path.clone()).unwrap();
        let mut stored = flow();
        stored.status = FlowStatus::Up;
        stored.path_id = Some(path.path_id.clone());
        repo.save_flow(stored).unwrap();

        let mut ctx = context(FlowOperationRequest::Delete {
            flow_id: FlowId::new("f1").unwrap(),
        });
        let effects = compute_path(&mut ctx, &repo, &computer);
        assert_eq!(effects.event, Some(Event::PathComputed));
        assert!(ctx.target_path.is_none());
        assert!(ctx.new_rules.is_empty());
        assert_eq!(ctx.old_rules.len(), 3);
        assert_eq!(ctx.previous_path.map(|p| p.path_id), Some(path.path_id));
    }

    #[test]
    fn test_empty_phase_advances() {
        let mut ctx = context(FlowOperationRequest::Delete {
            flow_id: FlowId::new("f1").unwrap(),
        });
        let effects = dispatch_phase(&mut ctx, Phase::Install);
        assert!(effects.requests.is_empty());
        assert_eq!(effects.event, Some(Event::RulesInstalled));
        assert!(ctx.new_rules_dispatched);
    }

    #[test]
    fn test_revert_plan_follows_entered_phases() {
        let (repo, computer) = setup();
        let mut ctx = context(FlowOperationRequest::Create { flow: flow() });
        compute_path(&mut ctx, &repo, &computer);

        let install = dispatch_phase(&mut ctx, Phase::Install);
        assert_eq!(install.requests.len(), 3);
        assert_eq!(install.event, None);
        assert_eq!(ctx.ledger.pending_count(), 3);

        let revert = dispatch_phase(&mut ctx, Phase::Revert);
        assert_eq!(revert.requests.len(), 3);
        assert!(revert.requests.iter().all(|r| r.kind() == CommandKind::Remove));
        assert_eq!(ctx.ledger.pending_count(), 3);
    }

    #[test]
    fn test_validation_detects_inactive_switch_and_gap() {
        let (repo, computer) = setup();
        let mut ctx = context(FlowOperationRequest::Create { flow: flow() });
        compute_path(&mut ctx, &repo, &computer);
        assert_eq!(validate_new_rules(&ctx, &repo).event, Some(Event::RulesValidated));

        repo.save_switch(Switch {
            switch_id: sw(2),
            status: SwitchStatus::Inactive,
        })
        .unwrap();
        if let Some(path) = ctx.target_path.as_mut() {
            path.set_segments(vec![
                PathSegment::new(sw(1), 2, sw(2), 1),
                PathSegment::new(sw(4), 2, sw(3), 1),
            ]);
        }

        let effects = validate_new_rules(&ctx, &repo);
        assert_eq!(effects.event, Some(Event::Error));
        let problems: Vec<&str> = effects
            .history
            .iter()
            .filter(|e| e.title == "Validation problem")
            .map(|e| e.details.as_str())
            .collect();
        assert!(problems.iter().any(|p| p.contains("is not active")));
        assert!(problems.iter().any(|p| p.starts_with("Segment 0 ends on")));
    }

    #[test]
    fn test_cookie_conflict() {
        let rule = Arc::new(RuleDescriptor::for_path(
            &flow(),
            &FlowPath::new(PathId::new("p"), FlowId::new("f1").unwrap(), Cookie::forward(1), sw(1), sw(1), vec![]),
        )
        .remove(0));
        assert_eq!(cookie_conflicts(&[rule.clone()], &[rule]).len(), 1);
    }

    #[test]
    fn test_complete_and_finish_revert() {
        let (repo, computer) = setup();
        let mut ctx = context(FlowOperationRequest::Create { flow: flow() });
        compute_path(&mut ctx, &repo, &computer);

        complete_operation(&ctx, &repo);
        let stored = repo.find_flow(&ctx.flow_id).unwrap().unwrap();
        assert_eq!(stored.status, FlowStatus::Up);
        let path_id = stored.path_id.unwrap();
        assert_eq!(
            repo.find_path(&path_id).unwrap().map(|p| p.status),
            Some(FlowPathStatus::Active)
        );

        let effects = finish_revert(&ctx, &repo);
        assert_eq!(effects.history[0].title, "Flow status was restored");
        assert_eq!(
            repo.find_flow(&ctx.flow_id).unwrap().map(|f| f.status),
            Some(FlowStatus::Down)
        );
    }
}
