use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::request::RequestType;
use crate::domain::step::ApproverRole;
use crate::errors::WorkflowError;
use crate::org::OrgResolver;

/// One slot of a chain template, before any rows exist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub sequence: u32,
    pub approver_role: ApproverRole,
}

/// Role-per-step policy, keyed by module. Pure configuration data: modules
/// never get their own code path, only a different chain here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainPolicy {
    chains: HashMap<RequestType, Vec<ApproverRole>>,
}

impl ChainPolicy {
    pub fn empty() -> Self {
        Self { chains: HashMap::new() }
    }

    pub fn with_chain(mut self, request_type: RequestType, roles: Vec<ApproverRole>) -> Self {
        self.chains.insert(request_type, roles);
        self
    }

    /// Unknown types get an empty chain; submission then auto-approves, which
    /// is the documented behavior for modules configured without approvers.
    pub fn roles_for(&self, request_type: RequestType) -> &[ApproverRole] {
        self.chains.get(&request_type).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for ChainPolicy {
    fn default() -> Self {
        use ApproverRole::{DivisionHead, FinalApprover, PersonnelValidation, UnitHead};

        let full = vec![UnitHead, DivisionHead, PersonnelValidation, FinalApprover];
        let civil_registry = vec![UnitHead, PersonnelValidation];

        Self::empty()
            .with_chain(RequestType::Leave, full.clone())
            .with_chain(RequestType::Transfer, full.clone())
            .with_chain(RequestType::StudyLeave, full)
            .with_chain(
                RequestType::SalaryIncrement,
                vec![UnitHead, PersonnelValidation, FinalApprover],
            )
            .with_chain(RequestType::Marriage, civil_registry.clone())
            .with_chain(RequestType::Divorce, civil_registry)
    }
}

/// Materializes the ordered step template for a new request, verifying every
/// role resolves to an eligible principal before any row is created. A vacant
/// seat fails the whole submission rather than creating an undecidable step.
#[derive(Clone, Debug)]
pub struct ChainBuilder<R> {
    policy: ChainPolicy,
    resolver: R,
}

impl<R> ChainBuilder<R>
where
    R: OrgResolver,
{
    pub fn new(policy: ChainPolicy, resolver: R) -> Self {
        Self { policy, resolver }
    }

    pub fn policy(&self) -> &ChainPolicy {
        &self.policy
    }

    pub fn build(
        &self,
        request_type: RequestType,
        subject_id: &str,
    ) -> Result<Vec<ChainStep>, WorkflowError> {
        let roles = self.policy.roles_for(request_type);
        let mut steps = Vec::with_capacity(roles.len());

        for (index, role) in roles.iter().enumerate() {
            let resolved = self.resolver.resolve_approver(*role, subject_id).map_err(|error| {
                WorkflowError::ChainConfiguration(format!(
                    "org resolver failed for role `{}`: {error}",
                    role.as_str()
                ))
            })?;

            if resolved.is_none() {
                return Err(WorkflowError::ChainConfiguration(format!(
                    "no eligible approver for role `{}` (step {}) of `{}` requests",
                    role.as_str(),
                    index + 1,
                    request_type.as_str()
                )));
            }

            steps.push(ChainStep { sequence: index as u32 + 1, approver_role: *role });
        }

        Ok(steps)
    }
}
