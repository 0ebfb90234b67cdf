use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::principal::Principal;
use crate::domain::request::{Request, RequestStatus};
use crate::domain::step::{ApprovalStep, DecisionOutcome, StepId, StepStatus};
use crate::errors::WorkflowError;

/// A single approver decision on one chain step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub step_id: StepId,
    pub outcome: DecisionOutcome,
    pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
}

/// Validated result of a decision, ready to be persisted. `idempotent_replay`
/// marks a duplicate of an identical prior decision; nothing must be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionApplied {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub step_id: StepId,
    pub step_status: StepStatus,
    pub is_final_approval: bool,
    pub idempotent_replay: bool,
}

/// Current step of a chain round: the lowest-sequence step still pending.
/// Once any step carries a negative outcome the chain has no current step,
/// the remaining pending rows are historical leftovers.
pub fn current_step(steps: &[ApprovalStep]) -> Option<&ApprovalStep> {
    if steps
        .iter()
        .any(|step| matches!(step.status, StepStatus::Rejected | StepStatus::RevisionRequested))
    {
        return None;
    }
    steps.iter().filter(|step| step.status == StepStatus::Pending).min_by_key(|step| step.sequence)
}

/// Deterministic projection of request status from the current round's steps.
/// Persisted `Request.status` must always equal this for non-cancelled
/// requests. An empty chain projects straight to final approval.
pub fn derive_status(steps: &[ApprovalStep]) -> RequestStatus {
    if steps.iter().any(|step| step.status == StepStatus::Rejected) {
        return RequestStatus::Rejected;
    }
    if steps.iter().any(|step| step.status == StepStatus::RevisionRequested) {
        return RequestStatus::RevisionRequested;
    }
    match current_step(steps) {
        Some(step) => RequestStatus::StepPending(step.sequence),
        None => RequestStatus::ApprovedFinal,
    }
}

fn recorded_outcome(status: StepStatus) -> DecisionOutcome {
    match status {
        StepStatus::Approved => DecisionOutcome::Approve,
        StepStatus::Rejected => DecisionOutcome::Reject,
        // Pending never reaches here; callers branch on it first.
        StepStatus::Pending | StepStatus::RevisionRequested => DecisionOutcome::RequestRevision,
    }
}

/// Pure transition rules. Owns no state; persistence loads the request and its
/// current-round steps, asks the engine to validate, then writes the outcome.
#[derive(Clone, Debug, Default)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    /// Status a freshly built chain starts in.
    pub fn initial_status(&self, chain_len: usize) -> RequestStatus {
        if chain_len == 0 {
            RequestStatus::ApprovedFinal
        } else {
            RequestStatus::StepPending(1)
        }
    }

    pub fn decide(
        &self,
        request: &Request,
        steps: &[ApprovalStep],
        principal: &Principal,
        decision: &Decision,
    ) -> Result<DecisionApplied, WorkflowError> {
        let step = steps.iter().find(|step| step.id == decision.step_id).ok_or_else(|| {
            WorkflowError::NotFound(format!(
                "step `{}` in round {} of request `{}`",
                decision.step_id.0, request.round, request.id.0
            ))
        })?;

        // Authorization comes first: even a replay of an already-decided step
        // is only answered for a principal holding the step's bound role.
        if !principal.holds(step.approver_role) {
            return Err(WorkflowError::Authorization {
                principal_id: principal.id.clone(),
                reason: format!(
                    "step {} requires role `{}`",
                    step.sequence,
                    step.approver_role.as_str()
                ),
            });
        }

        if step.status != StepStatus::Pending {
            if decision.outcome.step_status() == step.status {
                return Ok(DecisionApplied {
                    from: request.status.clone(),
                    to: request.status.clone(),
                    step_id: step.id.clone(),
                    step_status: step.status,
                    is_final_approval: false,
                    idempotent_replay: true,
                });
            }
            return Err(WorkflowError::DuplicateDecision {
                existing: recorded_outcome(step.status),
                requested: decision.outcome,
            });
        }

        if !matches!(request.status, RequestStatus::StepPending(_)) {
            return Err(WorkflowError::IllegalTransition {
                status: request.status.clone(),
                event: "decide",
            });
        }

        let current = current_step(steps).ok_or(WorkflowError::StaleState)?;
        if step.sequence != current.sequence {
            return Err(WorkflowError::OrderingViolation {
                step_sequence: step.sequence,
                current_sequence: current.sequence,
            });
        }

        let last_sequence = steps.iter().map(|step| step.sequence).max().unwrap_or(0);
        let to = match decision.outcome {
            DecisionOutcome::Approve if step.sequence == last_sequence => {
                RequestStatus::ApprovedFinal
            }
            DecisionOutcome::Approve => RequestStatus::StepPending(step.sequence + 1),
            DecisionOutcome::Reject => RequestStatus::Rejected,
            DecisionOutcome::RequestRevision => RequestStatus::RevisionRequested,
        };

        Ok(DecisionApplied {
            from: request.status.clone(),
            is_final_approval: to == RequestStatus::ApprovedFinal,
            to,
            step_id: step.id.clone(),
            step_status: decision.outcome.step_status(),
            idempotent_replay: false,
        })
    }

    pub fn decide_with_audit<S>(
        &self,
        request: &Request,
        steps: &[ApprovalStep],
        principal: &Principal,
        decision: &Decision,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<DecisionApplied, WorkflowError>
    where
        S: AuditSink,
    {
        let result = self.decide(request, steps, principal, decision);
        match &result {
            Ok(applied) if applied.idempotent_replay => {
                sink.emit(
                    AuditEvent::new(
                        audit.request_id.clone(),
                        audit.correlation_id.clone(),
                        "workflow.decision_replayed",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("step_id", decision.step_id.0.clone())
                    .with_metadata("outcome", decision.outcome.as_str()),
                );
            }
            Ok(applied) => {
                sink.emit(
                    AuditEvent::new(
                        audit.request_id.clone(),
                        audit.correlation_id.clone(),
                        "workflow.transition_applied",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", applied.from.encode())
                    .with_metadata("to", applied.to.encode())
                    .with_metadata("step_id", applied.step_id.0.clone())
                    .with_metadata("outcome", decision.outcome.as_str()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.request_id.clone(),
                        audit.correlation_id.clone(),
                        "workflow.transition_rejected",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    /// Cancel is requester-initiated (or admin on their behalf) and legal only
    /// while the request is still in flight; post-terminal reversal is a
    /// separate business process, not a transition.
    pub fn cancel(
        &self,
        request: &Request,
        principal: &Principal,
    ) -> Result<TransitionOutcome, WorkflowError> {
        if !request.status.is_cancellable() {
            return Err(WorkflowError::IllegalTransition {
                status: request.status.clone(),
                event: "cancel",
            });
        }
        if principal.id != request.subject_id && !principal.admin {
            return Err(WorkflowError::Authorization {
                principal_id: principal.id.clone(),
                reason: "only the requester or an admin may cancel".to_owned(),
            });
        }
        Ok(TransitionOutcome { from: request.status.clone(), to: RequestStatus::Cancelled })
    }

    /// Resubmission restarts the chain from sequence 1 with fresh rows; the
    /// subject and type are immutable, only the payload may change.
    pub fn resubmit(
        &self,
        request: &Request,
        principal: &Principal,
        chain_len: usize,
    ) -> Result<TransitionOutcome, WorkflowError> {
        if request.status != RequestStatus::RevisionRequested {
            return Err(WorkflowError::IllegalTransition {
                status: request.status.clone(),
                event: "resubmit",
            });
        }
        if principal.id != request.subject_id {
            return Err(WorkflowError::Authorization {
                principal_id: principal.id.clone(),
                reason: "only the requester may resubmit".to_owned(),
            });
        }
        Ok(TransitionOutcome { from: request.status.clone(), to: self.initial_status(chain_len) })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{current_step, derive_status, Decision, WorkflowEngine};
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::principal::Principal;
    use crate::domain::request::{Request, RequestId, RequestStatus, RequestType};
    use crate::domain::step::{
        ApprovalStep, ApproverRole, DecisionOutcome, StepId, StepStatus,
    };
    use crate::errors::WorkflowError;

    const CHAIN: [ApproverRole; 4] = [
        ApproverRole::UnitHead,
        ApproverRole::DivisionHead,
        ApproverRole::PersonnelValidation,
        ApproverRole::FinalApprover,
    ];

    fn request(status: RequestStatus) -> Request {
        let now = Utc::now();
        Request {
            id: RequestId("req-1".to_owned()),
            subject_id: "emp-1".to_owned(),
            request_type: RequestType::Leave,
            status,
            round: 1,
            version: 1,
            payload: json!({"reason": "annual leave", "days": 5}),
            final_note: None,
            document_ref: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    fn chain(roles: &[ApproverRole]) -> Vec<ApprovalStep> {
        roles
            .iter()
            .enumerate()
            .map(|(index, role)| ApprovalStep {
                id: StepId(format!("step-{}", index + 1)),
                request_id: RequestId("req-1".to_owned()),
                round: 1,
                sequence: index as u32 + 1,
                approver_role: *role,
                status: StepStatus::Pending,
                decided_by: None,
                decided_by_name: None,
                decided_at: None,
                note: None,
                created_at: Utc::now(),
            })
            .collect()
    }

    fn approver(role: ApproverRole) -> Principal {
        Principal::new(format!("{}-1", role.as_str()), role.as_str()).with_role(role)
    }

    fn apply(steps: &mut [ApprovalStep], sequence: u32, status: StepStatus) {
        let step = steps.iter_mut().find(|step| step.sequence == sequence).expect("step exists");
        step.status = status;
        step.decided_by = Some("someone".to_owned());
        step.decided_at = Some(Utc::now());
    }

    #[test]
    fn approving_every_step_in_order_reaches_final_approval() {
        let engine = WorkflowEngine;
        let mut steps = chain(&CHAIN);
        let mut req = request(RequestStatus::StepPending(1));

        for sequence in 1..=4u32 {
            let step_id = steps[(sequence - 1) as usize].id.clone();
            let role = steps[(sequence - 1) as usize].approver_role;
            let applied = engine
                .decide(
                    &req,
                    &steps,
                    &approver(role),
                    &Decision { step_id, outcome: DecisionOutcome::Approve, note: None },
                )
                .expect("in-order approval");

            apply(&mut steps, sequence, StepStatus::Approved);
            req.status = applied.to.clone();

            if sequence < 4 {
                assert_eq!(applied.to, RequestStatus::StepPending(sequence + 1));
                assert!(!applied.is_final_approval);
            } else {
                assert_eq!(applied.to, RequestStatus::ApprovedFinal);
                assert!(applied.is_final_approval);
            }
            assert_eq!(derive_status(&steps), req.status);
        }

        assert!(steps.iter().all(|step| step.status == StepStatus::Approved));
    }

    #[test]
    fn rejection_at_any_step_terminates_and_later_steps_stay_pending() {
        let engine = WorkflowEngine;
        let mut steps = chain(&CHAIN);
        apply(&mut steps, 1, StepStatus::Approved);
        let req = request(RequestStatus::StepPending(2));

        let applied = engine
            .decide(
                &req,
                &steps,
                &approver(ApproverRole::DivisionHead),
                &Decision {
                    step_id: steps[1].id.clone(),
                    outcome: DecisionOutcome::Reject,
                    note: Some("incomplete attachment".to_owned()),
                },
            )
            .expect("reject is valid on the current step");

        assert_eq!(applied.to, RequestStatus::Rejected);
        apply(&mut steps, 2, StepStatus::Rejected);
        assert_eq!(derive_status(&steps), RequestStatus::Rejected);
        assert!(steps[2..].iter().all(|step| step.status == StepStatus::Pending));
        assert!(current_step(&steps).is_none());
    }

    #[test]
    fn revision_request_returns_control_to_requester() {
        let engine = WorkflowEngine;
        let mut steps = chain(&CHAIN);
        apply(&mut steps, 1, StepStatus::Approved);
        let req = request(RequestStatus::StepPending(2));

        let applied = engine
            .decide(
                &req,
                &steps,
                &approver(ApproverRole::DivisionHead),
                &Decision {
                    step_id: steps[1].id.clone(),
                    outcome: DecisionOutcome::RequestRevision,
                    note: None,
                },
            )
            .expect("revision request is valid");

        assert_eq!(applied.to, RequestStatus::RevisionRequested);
        assert!(!applied.to.is_terminal());
    }

    #[test]
    fn deciding_out_of_order_is_an_ordering_violation() {
        let engine = WorkflowEngine;
        let steps = chain(&CHAIN);
        let req = request(RequestStatus::StepPending(1));

        let error = engine
            .decide(
                &req,
                &steps,
                &approver(ApproverRole::PersonnelValidation),
                &Decision {
                    step_id: steps[2].id.clone(),
                    outcome: DecisionOutcome::Approve,
                    note: None,
                },
            )
            .expect_err("step 3 cannot be decided while step 1 is pending");

        assert_eq!(
            error,
            WorkflowError::OrderingViolation { step_sequence: 3, current_sequence: 1 }
        );
    }

    #[test]
    fn principal_without_the_bound_role_is_rejected() {
        let engine = WorkflowEngine;
        let steps = chain(&CHAIN);
        let req = request(RequestStatus::StepPending(1));

        let error = engine
            .decide(
                &req,
                &steps,
                &approver(ApproverRole::FinalApprover),
                &Decision {
                    step_id: steps[0].id.clone(),
                    outcome: DecisionOutcome::Approve,
                    note: None,
                },
            )
            .expect_err("final approver does not hold unit_head");

        assert!(matches!(error, WorkflowError::Authorization { .. }));
    }

    #[test]
    fn duplicate_identical_decision_is_an_idempotent_replay() {
        let engine = WorkflowEngine;
        let mut steps = chain(&CHAIN);
        apply(&mut steps, 1, StepStatus::Approved);
        let req = request(RequestStatus::StepPending(2));

        let applied = engine
            .decide(
                &req,
                &steps,
                &approver(ApproverRole::UnitHead),
                &Decision {
                    step_id: steps[0].id.clone(),
                    outcome: DecisionOutcome::Approve,
                    note: None,
                },
            )
            .expect("identical duplicate returns the prior result");

        assert!(applied.idempotent_replay);
        assert_eq!(applied.from, applied.to);
    }

    #[test]
    fn duplicate_conflicting_decision_is_an_error() {
        let engine = WorkflowEngine;
        let mut steps = chain(&CHAIN);
        apply(&mut steps, 1, StepStatus::Approved);
        let req = request(RequestStatus::StepPending(2));

        let error = engine
            .decide(
                &req,
                &steps,
                &approver(ApproverRole::UnitHead),
                &Decision {
                    step_id: steps[0].id.clone(),
                    outcome: DecisionOutcome::Reject,
                    note: None,
                },
            )
            .expect_err("conflicting duplicate must surface");

        assert_eq!(
            error,
            WorkflowError::DuplicateDecision {
                existing: DecisionOutcome::Approve,
                requested: DecisionOutcome::Reject,
            }
        );
    }

    #[test]
    fn replay_of_a_decided_step_still_requires_the_bound_role() {
        let engine = WorkflowEngine;
        let mut steps = chain(&CHAIN);
        apply(&mut steps, 1, StepStatus::Approved);
        let req = request(RequestStatus::StepPending(2));

        let error = engine
            .decide(
                &req,
                &steps,
                &approver(ApproverRole::FinalApprover),
                &Decision {
                    step_id: steps[0].id.clone(),
                    outcome: DecisionOutcome::Approve,
                    note: None,
                },
            )
            .expect_err("duplicate of step 1 without the unit_head role");

        assert!(matches!(error, WorkflowError::Authorization { .. }));
    }

    #[test]
    fn deciding_a_terminal_request_is_illegal() {
        let engine = WorkflowEngine;
        let steps = chain(&CHAIN);
        let req = request(RequestStatus::Cancelled);

        let error = engine
            .decide(
                &req,
                &steps,
                &approver(ApproverRole::UnitHead),
                &Decision {
                    step_id: steps[0].id.clone(),
                    outcome: DecisionOutcome::Approve,
                    note: None,
                },
            )
            .expect_err("cancelled requests accept no decisions");

        assert!(matches!(error, WorkflowError::IllegalTransition { event: "decide", .. }));
    }

    #[test]
    fn cancel_is_legal_from_submitted_and_any_pending_step() {
        let engine = WorkflowEngine;
        let requester = Principal::new("emp-1", "Requester");

        for status in [
            RequestStatus::Submitted,
            RequestStatus::StepPending(1),
            RequestStatus::StepPending(3),
        ] {
            let outcome =
                engine.cancel(&request(status), &requester).expect("cancel while in flight");
            assert_eq!(outcome.to, RequestStatus::Cancelled);
        }

        for status in
            [RequestStatus::ApprovedFinal, RequestStatus::Rejected, RequestStatus::Cancelled]
        {
            let error = engine
                .cancel(&request(status), &requester)
                .expect_err("terminal requests cannot be cancelled");
            assert!(matches!(error, WorkflowError::IllegalTransition { event: "cancel", .. }));
        }
    }

    #[test]
    fn cancel_by_a_stranger_requires_admin() {
        let engine = WorkflowEngine;
        let req = request(RequestStatus::StepPending(1));

        let stranger = Principal::new("emp-2", "Someone Else");
        let error = engine.cancel(&req, &stranger).expect_err("not the requester");
        assert!(matches!(error, WorkflowError::Authorization { .. }));

        let admin = Principal::new("emp-2", "Personnel Admin").as_admin();
        let outcome = engine.cancel(&req, &admin).expect("admin may cancel");
        assert_eq!(outcome.to, RequestStatus::Cancelled);
    }

    #[test]
    fn resubmit_only_from_revision_requested_and_only_by_requester() {
        let engine = WorkflowEngine;
        let requester = Principal::new("emp-1", "Requester");

        let outcome = engine
            .resubmit(&request(RequestStatus::RevisionRequested), &requester, 4)
            .expect("requester resubmits");
        assert_eq!(outcome.to, RequestStatus::StepPending(1));

        let error = engine
            .resubmit(&request(RequestStatus::StepPending(2)), &requester, 4)
            .expect_err("resubmit requires a revision request");
        assert!(matches!(error, WorkflowError::IllegalTransition { event: "resubmit", .. }));

        let stranger = Principal::new("emp-9", "Someone Else");
        let error = engine
            .resubmit(&request(RequestStatus::RevisionRequested), &stranger, 4)
            .expect_err("only the requester may resubmit");
        assert!(matches!(error, WorkflowError::Authorization { .. }));
    }

    #[test]
    fn empty_chain_starts_terminally_approved() {
        let engine = WorkflowEngine;
        assert_eq!(engine.initial_status(0), RequestStatus::ApprovedFinal);
        assert_eq!(engine.initial_status(4), RequestStatus::StepPending(1));
        assert_eq!(derive_status(&[]), RequestStatus::ApprovedFinal);
    }

    #[test]
    fn derived_status_is_the_lowest_pending_sequence() {
        let mut steps = chain(&CHAIN);
        assert_eq!(derive_status(&steps), RequestStatus::StepPending(1));

        apply(&mut steps, 1, StepStatus::Approved);
        assert_eq!(derive_status(&steps), RequestStatus::StepPending(2));
        assert_eq!(current_step(&steps).map(|step| step.sequence), Some(2));

        apply(&mut steps, 2, StepStatus::Approved);
        apply(&mut steps, 3, StepStatus::Approved);
        apply(&mut steps, 4, StepStatus::Approved);
        assert_eq!(derive_status(&steps), RequestStatus::ApprovedFinal);
        assert!(current_step(&steps).is_none());
    }

    #[test]
    fn decision_emits_audit_events_for_applied_and_rejected_transitions() {
        let engine = WorkflowEngine;
        let sink = InMemoryAuditSink::default();
        let steps = chain(&CHAIN);
        let req = request(RequestStatus::StepPending(1));
        let audit = AuditContext::new(Some(req.id.clone()), "corr-7", "unit-head-1");

        let _ = engine
            .decide_with_audit(
                &req,
                &steps,
                &approver(ApproverRole::UnitHead),
                &Decision {
                    step_id: steps[0].id.clone(),
                    outcome: DecisionOutcome::Approve,
                    note: None,
                },
                &sink,
                &audit,
            )
            .expect("valid decision");

        let _ = engine.decide_with_audit(
            &req,
            &steps,
            &approver(ApproverRole::FinalApprover),
            &Decision { step_id: steps[0].id.clone(), outcome: DecisionOutcome::Approve, note: None },
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "workflow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("step_pending_2"));
        assert_eq!(events[1].event_type, "workflow.transition_rejected");
    }
}
