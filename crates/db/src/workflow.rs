use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use alur_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use alur_core::chain::{ChainBuilder, ChainPolicy, ChainStep};
use alur_core::domain::principal::Principal;
use alur_core::domain::request::{Request, RequestId, RequestStatus, RequestType};
use alur_core::domain::step::{ApprovalStep, DecisionOutcome, StepId, StepStatus};
use alur_core::engine::{Decision, WorkflowEngine};
use alur_core::errors::WorkflowError;
use alur_core::notify::{NotificationDispatch, TransitionNotice};
use alur_core::org::OrgResolver;

use crate::repositories::request::{fetch_request, insert_request, update_request_versioned};
use crate::repositories::step::{fetch_step, fetch_steps_for_round, insert_step, record_step_decision};
use crate::repositories::RepositoryError;
use crate::DbPool;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> Self {
        if is_lock_contention(&error) {
            return Self::Workflow(WorkflowError::StaleState);
        }
        Self::Database(error.to_string())
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => error.into(),
            other => Self::Database(other.to_string()),
        }
    }
}

/// SQLITE_BUSY/SQLITE_LOCKED, primary codes 5 and 6 including extended
/// variants such as 517 (BUSY_SNAPSHOT): a concurrent writer committed first.
/// The caller's view is stale, so this is `StaleState`, not a transport
/// failure.
fn is_lock_contention(error: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_error) = error else {
        return false;
    };
    db_error
        .code()
        .and_then(|code| code.parse::<u32>().ok())
        .is_some_and(|code| matches!(code & 0xff, 5 | 6))
}

/// A new request as the requester hands it in.
#[derive(Clone, Debug)]
pub struct SubmitIntent {
    pub subject_id: String,
    pub request_type: RequestType,
    pub payload: Value,
}

/// Transactional workflow operations. Each operation loads state, lets the
/// engine validate the transition, and persists the outcome in one
/// transaction; audit and notification happen only after commit.
pub struct WorkflowService {
    pool: DbPool,
    engine: WorkflowEngine,
    chains: ChainBuilder<Arc<dyn OrgResolver>>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationDispatch>,
}

impl WorkflowService {
    pub fn new(
        pool: DbPool,
        policy: ChainPolicy,
        resolver: Arc<dyn OrgResolver>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationDispatch>,
    ) -> Self {
        Self {
            pool,
            engine: WorkflowEngine,
            chains: ChainBuilder::new(policy, resolver),
            audit,
            notifier,
        }
    }

    pub fn chain_policy(&self) -> &ChainPolicy {
        self.chains.policy()
    }

    pub async fn submit(
        &self,
        intent: SubmitIntent,
        actor: &Principal,
    ) -> Result<Request, ServiceError> {
        if intent.subject_id.trim().is_empty() {
            return Err(WorkflowError::Validation("subject_id must not be empty".to_owned()).into());
        }
        if !intent.payload.is_object() {
            return Err(WorkflowError::Validation("payload must be a JSON object".to_owned()).into());
        }
        if actor.id != intent.subject_id && !actor.admin {
            return Err(WorkflowError::Authorization {
                principal_id: actor.id.clone(),
                reason: "requests may only be submitted by the subject or an admin".to_owned(),
            }
            .into());
        }

        let chain = self.chains.build(intent.request_type, &intent.subject_id)?;
        let now = Utc::now();
        let id = RequestId(Uuid::new_v4().to_string());
        let status = self.engine.initial_status(chain.len());

        let mut request = Request {
            id: id.clone(),
            subject_id: intent.subject_id,
            request_type: intent.request_type,
            status: status.clone(),
            round: 1,
            version: 1,
            payload: intent.payload,
            final_note: None,
            document_ref: None,
            submitted_at: now,
            updated_at: now,
        };
        if status == RequestStatus::ApprovedFinal {
            request.document_ref = Some(document_ref(&request));
        }

        let mut tx = self.pool.begin().await?;
        insert_request(&mut *tx, &request).await?;
        for step in materialize_steps(&id, 1, &chain) {
            insert_step(&mut *tx, &step).await?;
        }
        tx.commit().await?;

        let context = AuditContext::new(Some(id), correlation_id(), actor.id.clone());
        self.audit.emit(
            AuditEvent::new(
                context.request_id.clone(),
                context.correlation_id.clone(),
                "workflow.request_submitted",
                AuditCategory::Workflow,
                context.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("request_type", request.request_type.as_str())
            .with_metadata("status", request.status.encode())
            .with_metadata("chain_len", chain.len().to_string()),
        );
        self.notify_from(&request, RequestStatus::Draft, actor);

        Ok(request)
    }

    pub async fn decide(
        &self,
        step_id: &StepId,
        outcome: DecisionOutcome,
        note: Option<String>,
        actor: &Principal,
    ) -> Result<Request, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let step = fetch_step(&mut *tx, step_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("step `{}`", step_id.0)))?;
        let mut request = fetch_request(&mut *tx, &step.request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("request `{}`", step.request_id.0)))?;

        // The step's own round, not the request's: a replay against a decided
        // step from an earlier round must still be recognized as idempotent.
        let round_steps = fetch_steps_for_round(&mut *tx, &request.id, step.round).await?;

        let context = AuditContext::new(Some(request.id.clone()), correlation_id(), actor.id.clone());
        let decision = Decision { step_id: step_id.clone(), outcome, note: note.clone() };
        let applied = self.engine.decide_with_audit(
            &request,
            &round_steps,
            actor,
            &decision,
            &self.audit,
            &context,
        )?;

        if applied.idempotent_replay {
            return Ok(request);
        }

        let now = Utc::now();
        let mut decided = step;
        decided.status = applied.step_status;
        decided.decided_by = Some(actor.id.clone());
        decided.decided_by_name = Some(actor.display_name.clone());
        decided.decided_at = Some(now);
        decided.note = note.clone();
        if !record_step_decision(&mut *tx, &decided).await? {
            return Err(WorkflowError::StaleState.into());
        }

        let expected_version = request.version;
        request.status = applied.to.clone();
        request.version += 1;
        request.updated_at = now;
        if applied.is_final_approval {
            request.document_ref = Some(document_ref(&request));
            request.final_note = note;
        }
        if !update_request_versioned(&mut *tx, &request, expected_version).await? {
            return Err(WorkflowError::StaleState.into());
        }

        tx.commit().await?;
        self.notify_from(&request, applied.from, actor);

        Ok(request)
    }

    pub async fn cancel(
        &self,
        request_id: &RequestId,
        actor: &Principal,
    ) -> Result<Request, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let mut request = fetch_request(&mut *tx, request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("request `{}`", request_id.0)))?;

        let outcome = self.engine.cancel(&request, actor)?;

        let expected_version = request.version;
        request.status = outcome.to;
        request.version += 1;
        request.updated_at = Utc::now();
        if !update_request_versioned(&mut *tx, &request, expected_version).await? {
            return Err(WorkflowError::StaleState.into());
        }

        tx.commit().await?;

        let context = AuditContext::new(Some(request.id.clone()), correlation_id(), actor.id.clone());
        self.audit.emit(
            AuditEvent::new(
                context.request_id.clone(),
                context.correlation_id.clone(),
                "workflow.request_cancelled",
                AuditCategory::Workflow,
                context.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("from", outcome.from.encode()),
        );
        self.notify_from(&request, outcome.from, actor);

        Ok(request)
    }

    /// Restarts a revision-requested request on a fresh round. The superseded
    /// round's rows are kept untouched as history.
    pub async fn resubmit(
        &self,
        request_id: &RequestId,
        payload: Option<Value>,
        actor: &Principal,
    ) -> Result<Request, ServiceError> {
        if let Some(ref payload) = payload {
            if !payload.is_object() {
                return Err(
                    WorkflowError::Validation("payload must be a JSON object".to_owned()).into()
                );
            }
        }

        let mut tx = self.pool.begin().await?;

        let mut request = fetch_request(&mut *tx, request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("request `{}`", request_id.0)))?;

        let chain = self.chains.build(request.request_type, &request.subject_id)?;
        let outcome = self.engine.resubmit(&request, actor, chain.len())?;

        let now = Utc::now();
        let expected_version = request.version;
        request.round += 1;
        request.status = outcome.to.clone();
        request.version += 1;
        request.updated_at = now;
        if let Some(payload) = payload {
            request.payload = payload;
        }
        if request.status == RequestStatus::ApprovedFinal {
            request.document_ref = Some(document_ref(&request));
        }

        for step in materialize_steps(&request.id, request.round, &chain) {
            insert_step(&mut *tx, &step).await?;
        }
        if !update_request_versioned(&mut *tx, &request, expected_version).await? {
            return Err(WorkflowError::StaleState.into());
        }

        tx.commit().await?;

        let context = AuditContext::new(Some(request.id.clone()), correlation_id(), actor.id.clone());
        self.audit.emit(
            AuditEvent::new(
                context.request_id.clone(),
                context.correlation_id.clone(),
                "workflow.request_resubmitted",
                AuditCategory::Workflow,
                context.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("round", request.round.to_string())
            .with_metadata("status", request.status.encode()),
        );
        self.notify_from(&request, outcome.from, actor);

        Ok(request)
    }

    fn notify_from(&self, request: &Request, from: RequestStatus, actor: &Principal) {
        self.notifier.dispatch(TransitionNotice {
            request_id: request.id.clone(),
            request_type: request.request_type,
            subject_id: request.subject_id.clone(),
            from,
            to: request.status.clone(),
            actor: actor.id.clone(),
            occurred_at: request.updated_at,
        });
    }
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Reference of the issued decree document, minted once on final approval.
fn document_ref(request: &Request) -> String {
    let short_id: String = request.id.0.chars().take(8).collect();
    format!("sk-{}-{}-r{}", request.request_type.as_str(), short_id, request.round)
}

fn materialize_steps(request_id: &RequestId, round: u32, chain: &[ChainStep]) -> Vec<ApprovalStep> {
    let now = Utc::now();
    chain
        .iter()
        .map(|slot| ApprovalStep {
            id: StepId(Uuid::new_v4().to_string()),
            request_id: request_id.clone(),
            round,
            sequence: slot.sequence,
            approver_role: slot.approver_role,
            status: StepStatus::Pending,
            decided_by: None,
            decided_by_name: None,
            decided_at: None,
            note: None,
            created_at: now,
        })
        .collect()
}
