use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

/// Organizational role bound to a chain step. Roles are policy data resolved to
/// a concrete principal by the org-structure collaborator, never a user id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    UnitHead,
    DivisionHead,
    PersonnelValidation,
    FinalApprover,
}

impl ApproverRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnitHead => "unit_head",
            Self::DivisionHead => "division_head",
            Self::PersonnelValidation => "personnel_validation",
            Self::FinalApprover => "final_approver",
        }
    }
}

impl std::str::FromStr for ApproverRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unit_head" => Ok(Self::UnitHead),
            "division_head" => Ok(Self::DivisionHead),
            "personnel_validation" => Ok(Self::PersonnelValidation),
            "final_approver" => Ok(Self::FinalApprover),
            other => Err(format!("unknown approver role `{other}`")),
        }
    }
}

/// Step-local status, distinct from the request status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    RevisionRequested,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::RevisionRequested => "revision_requested",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "revision_requested" => Some(Self::RevisionRequested),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approve,
    Reject,
    RequestRevision,
}

impl DecisionOutcome {
    /// Step status recorded when this outcome is applied.
    pub fn step_status(&self) -> StepStatus {
        match self {
            Self::Approve => StepStatus::Approved,
            Self::Reject => StepStatus::Rejected,
            Self::RequestRevision => StepStatus::RevisionRequested,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestRevision => "request_revision",
        }
    }
}

impl std::str::FromStr for DecisionOutcome {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "request_revision" => Ok(Self::RequestRevision),
            other => Err(format!("unknown decision outcome `{other}`")),
        }
    }
}

/// One ordered decision point in a request's approval chain. Audit fields are
/// populated only once the status leaves `Pending`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: StepId,
    pub request_id: RequestId,
    pub round: u32,
    pub sequence: u32,
    pub approver_role: ApproverRole,
    pub status: StepStatus,
    pub decided_by: Option<String>,
    pub decided_by_name: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
