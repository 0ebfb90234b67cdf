use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// The personnel module a request belongs to. Modules differ only in chain
/// configuration, never in transition logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Leave,
    Transfer,
    Marriage,
    Divorce,
    SalaryIncrement,
    StudyLeave,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::Transfer => "transfer",
            Self::Marriage => "marriage",
            Self::Divorce => "divorce",
            Self::SalaryIncrement => "salary_increment",
            Self::StudyLeave => "study_leave",
        }
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leave" => Ok(Self::Leave),
            "transfer" => Ok(Self::Transfer),
            "marriage" => Ok(Self::Marriage),
            "divorce" => Ok(Self::Divorce),
            "salary_increment" => Ok(Self::SalaryIncrement),
            "study_leave" => Ok(Self::StudyLeave),
            other => Err(format!("unknown request type `{other}`")),
        }
    }
}

/// Request lifecycle state. `StepPending(k)` carries the 1-based sequence of
/// the chain step currently awaiting a decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    Submitted,
    StepPending(u32),
    ApprovedFinal,
    Rejected,
    RevisionRequested,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ApprovedFinal | Self::Rejected | Self::Cancelled)
    }

    /// Cancellation is legal only while the request is still in flight.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Submitted | Self::StepPending(_))
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Draft => "draft".to_string(),
            Self::Submitted => "submitted".to_string(),
            Self::StepPending(sequence) => format!("step_pending_{sequence}"),
            Self::ApprovedFinal => "approved_final".to_string(),
            Self::Rejected => "rejected".to_string(),
            Self::RevisionRequested => "revision_requested".to_string(),
            Self::Cancelled => "cancelled".to_string(),
        }
    }

    pub fn decode(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "approved_final" => Some(Self::ApprovedFinal),
            "rejected" => Some(Self::Rejected),
            "revision_requested" => Some(Self::RevisionRequested),
            "cancelled" => Some(Self::Cancelled),
            other => {
                let sequence = other.strip_prefix("step_pending_")?.parse().ok()?;
                Some(Self::StepPending(sequence))
            }
        }
    }
}

/// One workflow instance. `round` counts resubmission cycles; `version` is the
/// optimistic-lock counter bumped on every mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub subject_id: String,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub round: u32,
    pub version: i64,
    pub payload: Value,
    pub final_note: Option<String>,
    pub document_ref: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::RequestStatus;

    #[test]
    fn status_encoding_round_trips_step_pending_sequences() {
        for status in [
            RequestStatus::Draft,
            RequestStatus::Submitted,
            RequestStatus::StepPending(1),
            RequestStatus::StepPending(14),
            RequestStatus::ApprovedFinal,
            RequestStatus::Rejected,
            RequestStatus::RevisionRequested,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(RequestStatus::decode(&status.encode()), Some(status));
        }
    }

    #[test]
    fn malformed_status_strings_decode_to_none() {
        assert_eq!(RequestStatus::decode("step_pending_"), None);
        assert_eq!(RequestStatus::decode("step_pending_x"), None);
        assert_eq!(RequestStatus::decode("approved"), None);
    }

    #[test]
    fn only_final_reject_and_cancel_are_terminal() {
        assert!(RequestStatus::ApprovedFinal.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::RevisionRequested.is_terminal());
        assert!(!RequestStatus::StepPending(3).is_terminal());
        assert!(!RequestStatus::Submitted.is_terminal());
    }

    #[test]
    fn cancellable_only_while_in_flight() {
        assert!(RequestStatus::Submitted.is_cancellable());
        assert!(RequestStatus::StepPending(2).is_cancellable());
        assert!(!RequestStatus::RevisionRequested.is_cancellable());
        assert!(!RequestStatus::ApprovedFinal.is_cancellable());
        assert!(!RequestStatus::Cancelled.is_cancellable());
    }
}
