use serde::{Deserialize, Serialize};

use crate::domain::step::ApproverRole;

/// Caller identity supplied by the external identity/session collaborator.
/// The engine trusts the roles carried here; it never resolves sessions itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub roles: Vec<ApproverRole>,
    pub admin: bool,
}

impl Principal {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self { id: id.into(), display_name: display_name.into(), roles: Vec::new(), admin: false }
    }

    pub fn with_role(mut self, role: ApproverRole) -> Self {
        self.roles.push(role);
        self
    }

    pub fn as_admin(mut self) -> Self {
        self.admin = true;
        self
    }

    pub fn holds(&self, role: ApproverRole) -> bool {
        self.roles.contains(&role)
    }
}
