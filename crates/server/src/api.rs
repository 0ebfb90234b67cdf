use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use alur_core::domain::principal::Principal;
use alur_core::domain::request::{Request, RequestId, RequestStatus, RequestType};
use alur_core::domain::step::{ApprovalStep, ApproverRole, DecisionOutcome, StepId};
use alur_core::errors::{ApplicationError, InterfaceError};
use alur_db::{ListFilter, Page, ServiceError, SubmitIntent, WorkflowQueries, WorkflowService};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<WorkflowService>,
    pub queries: Arc<WorkflowQueries>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/requests", post(submit_request).get(list_requests))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/cancel", post(cancel_request))
        .route("/api/v1/requests/{id}/resubmit", post(resubmit_request))
        .route("/api/v1/steps/{id}/decision", post(decide_step))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ActorBody {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub subject_id: String,
    pub request_type: String,
    pub payload: Value,
    pub actor: ActorBody,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub outcome: String,
    pub note: Option<String>,
    pub actor: ActorBody,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub actor: ActorBody,
}

#[derive(Debug, Deserialize)]
pub struct ResubmitBody {
    pub payload: Option<Value>,
    pub actor: ActorBody,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub subject_id: Option<String>,
    pub request_type: Option<String>,
    pub submitted_from: Option<DateTime<Utc>>,
    pub submitted_to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RequestView {
    pub id: String,
    pub subject_id: String,
    pub request_type: &'static str,
    pub status: String,
    pub round: u32,
    pub version: i64,
    pub payload: Value,
    pub final_note: Option<String>,
    pub document_ref: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StepView {
    pub id: String,
    pub round: u32,
    pub sequence: u32,
    pub approver_role: &'static str,
    pub status: &'static str,
    pub decided_by: Option<String>,
    pub decided_by_name: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetailView {
    pub request: RequestView,
    pub steps: Vec<StepView>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: &'static str,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

impl From<&Request> for RequestView {
    fn from(request: &Request) -> Self {
        Self {
            id: request.id.0.clone(),
            subject_id: request.subject_id.clone(),
            request_type: request.request_type.as_str(),
            status: request.status.encode(),
            round: request.round,
            version: request.version,
            payload: request.payload.clone(),
            final_note: request.final_note.clone(),
            document_ref: request.document_ref.clone(),
            submitted_at: request.submitted_at,
            updated_at: request.updated_at,
        }
    }
}

impl From<&ApprovalStep> for StepView {
    fn from(step: &ApprovalStep) -> Self {
        Self {
            id: step.id.0.clone(),
            round: step.round,
            sequence: step.sequence,
            approver_role: step.approver_role.as_str(),
            status: step.status.as_str(),
            decided_by: step.decided_by.clone(),
            decided_by_name: step.decided_by_name.clone(),
            decided_at: step.decided_at,
            note: step.note.clone(),
        }
    }
}

impl ActorBody {
    fn into_principal(self, correlation_id: &str) -> Result<Principal, ApiError> {
        let mut principal = Principal::new(self.id, self.display_name);
        for role in self.roles {
            let role = ApproverRole::from_str(&role)
                .map_err(|message| bad_request(message, correlation_id))?;
            principal = principal.with_role(role);
        }
        if self.admin {
            principal = principal.as_admin();
        }
        Ok(principal)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn submit_request(
    State(state): State<ApiState>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<RequestView>), ApiError> {
    let correlation_id = new_correlation_id();
    let request_type = RequestType::from_str(&body.request_type)
        .map_err(|message| bad_request(message, &correlation_id))?;
    let actor = body.actor.into_principal(&correlation_id)?;

    let request = state
        .service
        .submit(
            SubmitIntent { subject_id: body.subject_id, request_type, payload: body.payload },
            &actor,
        )
        .await
        .map_err(|error| service_error(error, &correlation_id))?;

    Ok((StatusCode::CREATED, Json(RequestView::from(&request))))
}

async fn decide_step(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> ApiResult<RequestView> {
    let correlation_id = new_correlation_id();
    let outcome = DecisionOutcome::from_str(&body.outcome)
        .map_err(|message| bad_request(message, &correlation_id))?;
    let actor = body.actor.into_principal(&correlation_id)?;

    let request = state
        .service
        .decide(&StepId(id), outcome, body.note, &actor)
        .await
        .map_err(|error| service_error(error, &correlation_id))?;

    Ok(Json(RequestView::from(&request)))
}

async fn cancel_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<CancelBody>,
) -> ApiResult<RequestView> {
    let correlation_id = new_correlation_id();
    let actor = body.actor.into_principal(&correlation_id)?;

    let request = state
        .service
        .cancel(&RequestId(id), &actor)
        .await
        .map_err(|error| service_error(error, &correlation_id))?;

    Ok(Json(RequestView::from(&request)))
}

async fn resubmit_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<ResubmitBody>,
) -> ApiResult<RequestView> {
    let correlation_id = new_correlation_id();
    let actor = body.actor.into_principal(&correlation_id)?;

    let request = state
        .service
        .resubmit(&RequestId(id), body.payload, &actor)
        .await
        .map_err(|error| service_error(error, &correlation_id))?;

    Ok(Json(RequestView::from(&request)))
}

async fn get_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<DetailView> {
    let correlation_id = new_correlation_id();

    let detail = state
        .queries
        .get_request(&RequestId(id.clone()))
        .await
        .map_err(|error| persistence_error(error.to_string(), &correlation_id))?
        .ok_or_else(|| {
            respond(
                ApplicationError::Workflow(alur_core::errors::WorkflowError::NotFound(format!(
                    "request `{id}`"
                )))
                .into_interface(correlation_id.clone()),
            )
        })?;

    Ok(Json(DetailView {
        request: RequestView::from(&detail.request),
        steps: detail.steps.iter().map(StepView::from).collect(),
    }))
}

async fn list_requests(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> ApiResult<alur_db::PageResult<alur_db::RequestSummary>> {
    let correlation_id = new_correlation_id();

    let status = match params.status {
        Some(ref raw) => Some(RequestStatus::decode(raw).ok_or_else(|| {
            bad_request(format!("unknown request status `{raw}`"), &correlation_id)
        })?),
        None => None,
    };
    let request_type = match params.request_type {
        Some(ref raw) => Some(
            RequestType::from_str(raw).map_err(|message| bad_request(message, &correlation_id))?,
        ),
        None => None,
    };

    let filter = ListFilter {
        status,
        subject_id: params.subject_id,
        request_type,
        submitted_from: params.submitted_from,
        submitted_to: params.submitted_to,
    };
    let page = Page {
        limit: params.limit.unwrap_or_else(|| Page::default().limit),
        offset: params.offset.unwrap_or(0),
    };

    let result = state
        .queries
        .list_requests(&filter, page)
        .await
        .map_err(|error| persistence_error(error.to_string(), &correlation_id))?;

    Ok(Json(result))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn bad_request(message: impl Into<String>, correlation_id: &str) -> ApiError {
    respond(InterfaceError::BadRequest {
        message: message.into(),
        correlation_id: correlation_id.to_owned(),
    })
}

fn service_error(error: ServiceError, correlation_id: &str) -> ApiError {
    let application = match error {
        ServiceError::Workflow(workflow) => ApplicationError::Workflow(workflow),
        ServiceError::Database(message) => ApplicationError::Persistence(message),
    };
    respond(application.into_interface(correlation_id))
}

fn persistence_error(message: String, correlation_id: &str) -> ApiError {
    respond(ApplicationError::Persistence(message).into_interface(correlation_id))
}

fn respond(error: InterfaceError) -> ApiError {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let correlation_id = match &error {
        InterfaceError::BadRequest { correlation_id, .. }
        | InterfaceError::Conflict { correlation_id, .. }
        | InterfaceError::Forbidden { correlation_id, .. }
        | InterfaceError::NotFound { correlation_id, .. }
        | InterfaceError::ServiceUnavailable { correlation_id, .. }
        | InterfaceError::Internal { correlation_id, .. } => correlation_id.clone(),
    };

    (
        status,
        Json(ErrorBody { error: error.to_string(), message: error.user_message(), correlation_id }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request as HttpRequest, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use alur_core::audit::InMemoryAuditSink;
    use alur_core::chain::ChainPolicy;
    use alur_core::notify::NoopNotifier;
    use alur_core::org::InMemoryOrgResolver;
    use alur_db::migrations::run_pending;
    use alur_db::{connect_with_settings, WorkflowQueries, WorkflowService};

    use super::{router, ApiState};

    async fn test_router() -> Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let service = WorkflowService::new(
            pool.clone(),
            ChainPolicy::default(),
            Arc::new(InMemoryOrgResolver::fully_staffed()),
            Arc::new(InMemoryAuditSink::default()),
            Arc::new(NoopNotifier),
        );

        router(ApiState {
            service: Arc::new(service),
            queries: Arc::new(WorkflowQueries::new(pool)),
        })
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => HttpRequest::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => HttpRequest::builder().method(method).uri(uri).body(Body::empty()).expect("request"),
        };

        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    fn requester_actor() -> Value {
        json!({"id": "emp-1", "display_name": "Siti Rahma"})
    }

    fn approver_actor(id: &str, role: &str) -> Value {
        json!({"id": id, "display_name": id, "roles": [role]})
    }

    fn submit_body() -> Value {
        json!({
            "subject_id": "emp-1",
            "request_type": "leave",
            "payload": {"reason": "annual leave", "days": 5},
            "actor": requester_actor(),
        })
    }

    #[tokio::test]
    async fn submit_creates_a_request_at_the_first_step() {
        let router = test_router().await;

        let (status, body) =
            call(&router, Method::POST, "/api/v1/requests", Some(submit_body())).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "step_pending_1");
        assert_eq!(body["round"], 1);
        assert_eq!(body["request_type"], "leave");
    }

    #[tokio::test]
    async fn decision_moves_the_request_and_detail_shows_the_chain() {
        let router = test_router().await;

        let (_, submitted) =
            call(&router, Method::POST, "/api/v1/requests", Some(submit_body())).await;
        let request_id = submitted["id"].as_str().expect("id").to_owned();

        let (status, detail) =
            call(&router, Method::GET, &format!("/api/v1/requests/{request_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let steps = detail["steps"].as_array().expect("steps");
        assert_eq!(steps.len(), 4);
        let first_step_id = steps[0]["id"].as_str().expect("step id").to_owned();

        let (status, decided) = call(
            &router,
            Method::POST,
            &format!("/api/v1/steps/{first_step_id}/decision"),
            Some(json!({
                "outcome": "approve",
                "actor": approver_actor("unit-head-1", "unit_head"),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decided["status"], "step_pending_2");
        assert_eq!(decided["version"], 2);
    }

    #[tokio::test]
    async fn workflow_violations_map_to_meaningful_status_codes() {
        let router = test_router().await;

        let (_, submitted) =
            call(&router, Method::POST, "/api/v1/requests", Some(submit_body())).await;
        let request_id = submitted["id"].as_str().expect("id").to_owned();
        let (_, detail) =
            call(&router, Method::GET, &format!("/api/v1/requests/{request_id}"), None).await;
        let steps = detail["steps"].as_array().expect("steps");

        // out-of-order decision
        let (status, body) = call(
            &router,
            Method::POST,
            &format!("/api/v1/steps/{}/decision", steps[2]["id"].as_str().expect("id")),
            Some(json!({
                "outcome": "approve",
                "actor": approver_actor("personnel-1", "personnel_validation"),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));

        // missing role
        let (status, _) = call(
            &router,
            Method::POST,
            &format!("/api/v1/steps/{}/decision", steps[0]["id"].as_str().expect("id")),
            Some(json!({"outcome": "approve", "actor": requester_actor()})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // conflicting duplicate
        let first_step = steps[0]["id"].as_str().expect("id");
        let approve = json!({
            "outcome": "approve",
            "actor": approver_actor("unit-head-1", "unit_head"),
        });
        let (status, _) = call(
            &router,
            Method::POST,
            &format!("/api/v1/steps/{first_step}/decision"),
            Some(approve),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(
            &router,
            Method::POST,
            &format!("/api/v1/steps/{first_step}/decision"),
            Some(json!({
                "outcome": "reject",
                "actor": approver_actor("unit-head-1", "unit_head"),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // unknown ids
        let (status, _) =
            call(&router, Method::GET, "/api/v1/requests/no-such-request", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_and_resubmit_round_trip_over_http() {
        let router = test_router().await;

        let (_, submitted) =
            call(&router, Method::POST, "/api/v1/requests", Some(submit_body())).await;
        let request_id = submitted["id"].as_str().expect("id").to_owned();
        let (_, detail) =
            call(&router, Method::GET, &format!("/api/v1/requests/{request_id}"), None).await;
        let first_step = detail["steps"][0]["id"].as_str().expect("id").to_owned();

        let (status, _) = call(
            &router,
            Method::POST,
            &format!("/api/v1/steps/{first_step}/decision"),
            Some(json!({
                "outcome": "request_revision",
                "note": "perbaiki tanggal",
                "actor": approver_actor("unit-head-1", "unit_head"),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, resubmitted) = call(
            &router,
            Method::POST,
            &format!("/api/v1/requests/{request_id}/resubmit"),
            Some(json!({
                "payload": {"reason": "annual leave", "days": 4},
                "actor": requester_actor(),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resubmitted["round"], 2);
        assert_eq!(resubmitted["status"], "step_pending_1");

        let (status, cancelled) = call(
            &router,
            Method::POST,
            &format!("/api/v1/requests/{request_id}/cancel"),
            Some(json!({"actor": requester_actor()})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled["status"], "cancelled");
    }

    #[tokio::test]
    async fn list_endpoint_honors_filters_and_rejects_malformed_ones() {
        let router = test_router().await;

        call(&router, Method::POST, "/api/v1/requests", Some(submit_body())).await;
        call(
            &router,
            Method::POST,
            "/api/v1/requests",
            Some(json!({
                "subject_id": "emp-1",
                "request_type": "marriage",
                "payload": {"spouse_name": "Rina Wati"},
                "actor": requester_actor(),
            })),
        )
        .await;

        let (status, listed) = call(
            &router,
            Method::GET,
            "/api/v1/requests?subject_id=emp-1&request_type=marriage",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["total"], 1);

        let (status, _) =
            call(&router, Method::GET, "/api/v1/requests?status=definitely_not_a_status", None)
                .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
