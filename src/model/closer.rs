use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DutyStatus {
    #[serde(rename = "On Duty")]
    OnDuty,
    #[serde(rename = "Off Duty")]
    OffDuty,
}

impl std::fmt::Display for DutyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DutyStatus::OnDuty => write!(f, "On Duty"),
            DutyStatus::OffDuty => write!(f, "Off Duty"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Setter,
    Closer,
    Manager,
    Admin,
}

impl Role {
    /// Managers and admins share supervisory permissions.
    pub fn is_supervisor(&self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }

    /// Roles that may stand in the closer rotation.
    pub fn can_close(&self) -> bool {
        matches!(self, Role::Closer | Role::Manager | Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Setter => write!(f, "setter"),
            Role::Closer => write!(f, "closer"),
            Role::Manager => write!(f, "manager"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "setter" => Ok(Role::Setter),
            "closer" => Ok(Role::Closer),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Closer {
    pub uid: String,
    pub name: String,
    pub status: DutyStatus,
    pub team_id: String,
    pub role: Role,
    pub lineup_order: i64,
    #[serde(default)]
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Closer {
    pub fn new(
        uid: impl Into<String>,
        name: impl Into<String>,
        team_id: impl Into<String>,
        lineup_order: i64,
    ) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            status: DutyStatus::OffDuty,
            team_id: team_id.into(),
            role: Role::Closer,
            lineup_order,
            last_assigned_at: None,
            updated_at: Utc::now(),
            version: 0,
        }
    }

    pub fn on_duty(mut self) -> Self {
        self.status = DutyStatus::OnDuty;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn is_on_duty(&self) -> bool {
        self.status == DutyStatus::OnDuty
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Team {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: Utc::now(),
            version: 0,
        }
    }
}
