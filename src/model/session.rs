use serde::{Deserialize, Serialize};

use crate::error::{LeadflowError, Result};
use crate::model::Role;

/// Identity of the caller, passed explicitly into every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub uid: String,
    pub name: String,
    pub role: Role,
    pub team_id: String,
}

impl Session {
    pub fn new(
        uid: impl Into<String>,
        name: impl Into<String>,
        role: Role,
        team_id: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            role,
            team_id: team_id.into(),
        }
    }

    pub fn is_supervisor(&self) -> bool {
        self.role.is_supervisor()
    }

    pub fn require_supervisor(&self, action: &str) -> Result<()> {
        if self.is_supervisor() {
            Ok(())
        } else {
            Err(LeadflowError::Forbidden(format!(
                "{} requires manager or admin role, caller is {}",
                action, self.role
            )))
        }
    }

    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(LeadflowError::Forbidden(format!(
                "{} requires admin role, caller is {}",
                action, self.role
            )))
        }
    }

    /// Admins act across teams; everyone else is confined to their own.
    pub fn require_team(&self, team_id: &str) -> Result<()> {
        if self.role == Role::Admin || self.team_id == team_id {
            Ok(())
        } else {
            Err(LeadflowError::Forbidden(format!(
                "team {} is outside the caller's team {}",
                team_id, self.team_id
            )))
        }
    }
}
