use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::principal::Principal;
use crate::domain::step::ApproverRole;

/// Org-structure collaborator. Resolves a role-bound seat to the principal who
/// currently holds it for the requester's unit; `Ok(None)` means the seat is
/// vacant and a chain containing that role cannot be built.
pub trait OrgResolver: Send + Sync {
    fn resolve_approver(
        &self,
        role: ApproverRole,
        subject_id: &str,
    ) -> Result<Option<Principal>, String>;
}

impl<R: OrgResolver + ?Sized> OrgResolver for Arc<R> {
    fn resolve_approver(
        &self,
        role: ApproverRole,
        subject_id: &str,
    ) -> Result<Option<Principal>, String> {
        (**self).resolve_approver(role, subject_id)
    }
}

/// Static seat map, one holder per role. Backs tests and single-tenant
/// deployments configured from `[org]` seats; a live org-chart service plugs
/// in behind the same trait.
#[derive(Clone, Debug, Default)]
pub struct InMemoryOrgResolver {
    seats: HashMap<ApproverRole, Principal>,
}

impl InMemoryOrgResolver {
    pub fn with_seat(mut self, role: ApproverRole, holder: Principal) -> Self {
        self.seats.insert(role, holder);
        self
    }

    /// Convenience for a fully staffed four-role org used across tests.
    pub fn fully_staffed() -> Self {
        Self::default()
            .with_seat(
                ApproverRole::UnitHead,
                Principal::new("unit-head-1", "Kepala Unit").with_role(ApproverRole::UnitHead),
            )
            .with_seat(
                ApproverRole::DivisionHead,
                Principal::new("division-head-1", "Kepala Bidang")
                    .with_role(ApproverRole::DivisionHead),
            )
            .with_seat(
                ApproverRole::PersonnelValidation,
                Principal::new("personnel-1", "Validasi Kepegawaian")
                    .with_role(ApproverRole::PersonnelValidation),
            )
            .with_seat(
                ApproverRole::FinalApprover,
                Principal::new("final-1", "Pejabat Akhir").with_role(ApproverRole::FinalApprover),
            )
    }
}

impl OrgResolver for InMemoryOrgResolver {
    fn resolve_approver(
        &self,
        role: ApproverRole,
        _subject_id: &str,
    ) -> Result<Option<Principal>, String> {
        Ok(self.seats.get(&role).cloned())
    }
}
