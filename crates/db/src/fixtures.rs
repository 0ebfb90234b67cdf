use chrono::{Duration, Utc};
use serde_json::json;

use alur_core::domain::request::{Request, RequestId, RequestStatus, RequestType};
use alur_core::domain::step::{ApprovalStep, ApproverRole, StepId, StepStatus};

use crate::connection::DbPool;
use crate::repositories::{
    RepositoryError, RequestRepository, SqlRequestRepository, SqlStepRepository, StepRepository,
};

/// Expected end state of one seeded demo request.
struct SeedRequestContract {
    request_id: &'static str,
    subject_id: &'static str,
    request_type: RequestType,
    status: &'static str,
    round: u32,
    expected_step_count: usize,
    description: &'static str,
}

const SEED_REQUESTS: &[SeedRequestContract] = &[
    SeedRequestContract {
        request_id: "req-leave-001",
        subject_id: "emp-1",
        request_type: RequestType::Leave,
        status: "step_pending_2",
        round: 1,
        expected_step_count: 4,
        description: "Annual leave, unit head approved, waiting on division head",
    },
    SeedRequestContract {
        request_id: "req-transfer-001",
        subject_id: "emp-2",
        request_type: RequestType::Transfer,
        status: "rejected",
        round: 1,
        expected_step_count: 4,
        description: "Transfer rejected by the division head",
    },
    SeedRequestContract {
        request_id: "req-marriage-001",
        subject_id: "emp-3",
        request_type: RequestType::Marriage,
        status: "step_pending_1",
        round: 2,
        expected_step_count: 4,
        description: "Marriage registration, resubmitted after a revision request",
    },
];

const SEED_REQUEST_IDS: &[&str] = &["req-leave-001", "req-transfer-001", "req-marriage-001"];

/// Deterministic demo dataset covering an in-flight, a rejected, and a
/// resubmitted request. Used by the operator CLI and end-to-end checks.
pub struct DemoSeedDataset;

#[derive(Debug)]
pub struct SeedResult {
    pub request_ids: Vec<String>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub passed: bool,
    pub failures: Vec<String>,
}

impl DemoSeedDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        Self::clean(pool).await?;

        let requests = SqlRequestRepository::new(pool.clone());
        let steps = SqlStepRepository::new(pool.clone());
        let base = Utc::now() - Duration::days(7);

        // Leave: step 1 approved, step 2 pending.
        requests
            .save(Request {
                id: RequestId("req-leave-001".to_owned()),
                subject_id: "emp-1".to_owned(),
                request_type: RequestType::Leave,
                status: RequestStatus::StepPending(2),
                round: 1,
                version: 2,
                payload: json!({"reason": "annual leave", "days": 5}),
                final_note: None,
                document_ref: None,
                submitted_at: base,
                updated_at: base + Duration::hours(4),
            })
            .await?;
        for (sequence, role, status, decided_by) in [
            (1, ApproverRole::UnitHead, StepStatus::Approved, Some("unit-head-1")),
            (2, ApproverRole::DivisionHead, StepStatus::Pending, None),
            (3, ApproverRole::PersonnelValidation, StepStatus::Pending, None),
            (4, ApproverRole::FinalApprover, StepStatus::Pending, None),
        ] {
            steps.save(seed_step("req-leave-001", 1, sequence, role, status, decided_by)).await?;
        }

        // Transfer: rejected at step 2; later rows stay pending as history.
        requests
            .save(Request {
                id: RequestId("req-transfer-001".to_owned()),
                subject_id: "emp-2".to_owned(),
                request_type: RequestType::Transfer,
                status: RequestStatus::Rejected,
                round: 1,
                version: 3,
                payload: json!({"destination_unit": "unit-7"}),
                final_note: None,
                document_ref: None,
                submitted_at: base + Duration::days(1),
                updated_at: base + Duration::days(2),
            })
            .await?;
        for (sequence, role, status, decided_by) in [
            (1, ApproverRole::UnitHead, StepStatus::Approved, Some("unit-head-1")),
            (2, ApproverRole::DivisionHead, StepStatus::Rejected, Some("division-head-1")),
            (3, ApproverRole::PersonnelValidation, StepStatus::Pending, None),
            (4, ApproverRole::FinalApprover, StepStatus::Pending, None),
        ] {
            steps
                .save(seed_step("req-transfer-001", 1, sequence, role, status, decided_by))
                .await?;
        }

        // Marriage: round 1 sent back for revision at step 1, round 2 restarted.
        // The default marriage chain has two roles; both rounds are present.
        requests
            .save(Request {
                id: RequestId("req-marriage-001".to_owned()),
                subject_id: "emp-3".to_owned(),
                request_type: RequestType::Marriage,
                status: RequestStatus::StepPending(1),
                round: 2,
                version: 3,
                payload: json!({"spouse_name": "Rina Wati", "marriage_date": "2026-07-12"}),
                final_note: None,
                document_ref: None,
                submitted_at: base + Duration::days(3),
                updated_at: base + Duration::days(5),
            })
            .await?;
        for (round, sequence, role, status, decided_by) in [
            (1, 1, ApproverRole::UnitHead, StepStatus::RevisionRequested, Some("unit-head-1")),
            (1, 2, ApproverRole::PersonnelValidation, StepStatus::Pending, None),
            (2, 1, ApproverRole::UnitHead, StepStatus::Pending, None),
            (2, 2, ApproverRole::PersonnelValidation, StepStatus::Pending, None),
        ] {
            steps
                .save(seed_step("req-marriage-001", round, sequence, role, status, decided_by))
                .await?;
        }

        Ok(SeedResult {
            request_ids: SEED_REQUEST_IDS.iter().map(|id| (*id).to_owned()).collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let requests = SqlRequestRepository::new(pool.clone());
        let steps = SqlStepRepository::new(pool.clone());
        let mut failures = Vec::new();

        for contract in SEED_REQUESTS {
            let id = RequestId(contract.request_id.to_owned());
            let request = match requests.find_by_id(&id).await? {
                Some(request) => request,
                None => {
                    failures.push(format!(
                        "{}: request row is missing ({})",
                        contract.request_id, contract.description
                    ));
                    continue;
                }
            };

            if request.status.encode() != contract.status {
                failures.push(format!(
                    "{}: expected status `{}`, found `{}`",
                    contract.request_id,
                    contract.status,
                    request.status.encode()
                ));
            }
            if request.subject_id != contract.subject_id {
                failures.push(format!(
                    "{}: expected subject `{}`, found `{}`",
                    contract.request_id, contract.subject_id, request.subject_id
                ));
            }
            if request.request_type != contract.request_type {
                failures.push(format!(
                    "{}: expected type `{}`, found `{}`",
                    contract.request_id,
                    contract.request_type.as_str(),
                    request.request_type.as_str()
                ));
            }
            if request.round != contract.round {
                failures.push(format!(
                    "{}: expected round {}, found {}",
                    contract.request_id, contract.round, request.round
                ));
            }

            let history = steps.list_all(&id).await?;
            if history.len() != contract.expected_step_count {
                failures.push(format!(
                    "{}: expected {} step rows, found {}",
                    contract.request_id,
                    contract.expected_step_count,
                    history.len()
                ));
            }
        }

        Ok(VerificationResult { passed: failures.is_empty(), failures })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        for id in SEED_REQUEST_IDS {
            // approval_step rows go with the request via ON DELETE CASCADE
            sqlx::query("DELETE FROM request WHERE id = ?").bind(id).execute(pool).await?;
        }
        Ok(())
    }
}

fn seed_step(
    request_id: &str,
    round: u32,
    sequence: u32,
    role: ApproverRole,
    status: StepStatus,
    decided_by: Option<&str>,
) -> ApprovalStep {
    let created_at = Utc::now() - Duration::days(7);
    ApprovalStep {
        id: StepId(format!("{request_id}-r{round}-s{sequence}")),
        request_id: RequestId(request_id.to_owned()),
        round,
        sequence,
        approver_role: role,
        status,
        decided_by: decided_by.map(str::to_owned),
        decided_by_name: decided_by.map(|_| "Seed Approver".to_owned()),
        decided_at: decided_by.map(|_| created_at + Duration::hours(1)),
        note: None,
        created_at,
    }
}
