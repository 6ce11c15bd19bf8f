//! Caller identity supplied by the identity collaborator

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Organization and user a call runs on behalf of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgContext {
    /// Current organization; scopes every query and mutation
    pub org_id: Uuid,
    /// Current user; stamped on audit entries
    pub user_id: Uuid,
}

impl OrgContext {
    /// Context for a user
    pub fn new(org_id: Uuid, user_id: Uuid) -> Self {
        Self { org_id, user_id }
    }

    /// Context for background jobs (nil user)
    pub fn system(org_id: Uuid) -> Self {
        Self {
            org_id,
            user_id: Uuid::nil(),
        }
    }

    /// Reject documents belonging to another org
    pub fn ensure_org(&self, entity: &'static str, org_id: Uuid) -> crate::Result<()> {
        if org_id != self.org_id {
            return Err(crate::Error::InvariantViolation(format!(
                "{} belongs to org {}, not {}",
                entity, org_id, self.org_id
            )));
        }
        Ok(())
    }
}
