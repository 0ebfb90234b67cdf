use thiserror::Error;

use crate::domain::request::RequestStatus;
use crate::domain::step::DecisionOutcome;

/// Transition-rule failures. All are synchronous, none are retried by the
/// engine; retrying (after a re-fetch) is the caller's decision.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("approval chain cannot be resolved: {0}")]
    ChainConfiguration(String),
    #[error("step {step_sequence} is not the current step (current is {current_sequence})")]
    OrderingViolation { step_sequence: u32, current_sequence: u32 },
    #[error("principal `{principal_id}` is not authorized: {reason}")]
    Authorization { principal_id: String, reason: String },
    #[error("step already decided as {existing:?}; conflicting outcome {requested:?}")]
    DuplicateDecision { existing: DecisionOutcome, requested: DecisionOutcome },
    #[error("request was modified concurrently; re-fetch and retry")]
    StaleState,
    #[error("illegal transition: cannot {event} a request in status {status:?}")]
    IllegalTransition { status: RequestStatus, event: &'static str },
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "The request state changed while you were deciding. Refresh and retry."
            }
            Self::Forbidden { .. } => "You are not authorized to perform this action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Workflow(workflow) => match workflow {
                WorkflowError::Validation(_)
                | WorkflowError::ChainConfiguration(_)
                | WorkflowError::OrderingViolation { .. }
                | WorkflowError::IllegalTransition { .. } => Self::BadRequest {
                    message: workflow.to_string(),
                    correlation_id: unassigned(),
                },
                WorkflowError::Authorization { .. } => Self::Forbidden {
                    message: workflow.to_string(),
                    correlation_id: unassigned(),
                },
                WorkflowError::DuplicateDecision { .. } | WorkflowError::StaleState => {
                    Self::Conflict { message: workflow.to_string(), correlation_id: unassigned() }
                }
                WorkflowError::NotFound(_) => {
                    Self::NotFound { message: workflow.to_string(), correlation_id: unassigned() }
                }
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplicationError, InterfaceError, WorkflowError};
    use crate::domain::step::DecisionOutcome;

    #[test]
    fn ordering_violation_maps_to_bad_request_with_correlation_id() {
        let interface = ApplicationError::from(WorkflowError::OrderingViolation {
            step_sequence: 3,
            current_sequence: 1,
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn authorization_maps_to_forbidden() {
        let interface = ApplicationError::from(WorkflowError::Authorization {
            principal_id: "emp-2".to_owned(),
            reason: "missing role unit_head".to_owned(),
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert_eq!(interface.user_message(), "You are not authorized to perform this action.");
    }

    #[test]
    fn race_losers_map_to_conflict() {
        for error in [
            WorkflowError::StaleState,
            WorkflowError::DuplicateDecision {
                existing: DecisionOutcome::Approve,
                requested: DecisionOutcome::Reject,
            },
        ] {
            let interface = ApplicationError::from(error).into_interface("req-3");
            assert!(matches!(interface, InterfaceError::Conflict { .. }));
        }
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }
}
