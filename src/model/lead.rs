use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    WaitingAssignment,
    Scheduled,
    Rescheduled,
    Accepted,
    InProcess,
    Sold,
    NoSale,
    CreditFail,
    Canceled,
    Expired,
}

impl LeadStatus {
    /// Statuses watched by the scheduled-lead promoter.
    pub const SCHEDULED: [LeadStatus; 2] = [LeadStatus::Scheduled, LeadStatus::Rescheduled];

    /// Statuses that keep the assigned closer out of the available lineup.
    pub const OCCUPYING: [LeadStatus; 4] = [
        LeadStatus::WaitingAssignment,
        LeadStatus::Scheduled,
        LeadStatus::Accepted,
        LeadStatus::InProcess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::WaitingAssignment => "waiting_assignment",
            LeadStatus::Scheduled => "scheduled",
            LeadStatus::Rescheduled => "rescheduled",
            LeadStatus::Accepted => "accepted",
            LeadStatus::InProcess => "in_process",
            LeadStatus::Sold => "sold",
            LeadStatus::NoSale => "no_sale",
            LeadStatus::CreditFail => "credit_fail",
            LeadStatus::Canceled => "canceled",
            LeadStatus::Expired => "expired",
        }
    }

    pub fn is_scheduled(&self) -> bool {
        Self::SCHEDULED.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LeadStatus::Sold
                | LeadStatus::NoSale
                | LeadStatus::CreditFail
                | LeadStatus::Canceled
                | LeadStatus::Expired
        )
    }

    pub fn occupies_closer(&self) -> bool {
        Self::OCCUPYING.contains(self)
    }

    /// Final outcomes a closer can record.
    pub fn is_disposition(&self) -> bool {
        matches!(
            self,
            LeadStatus::Sold | LeadStatus::NoSale | LeadStatus::CreditFail
        )
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting_assignment" => Ok(LeadStatus::WaitingAssignment),
            "scheduled" => Ok(LeadStatus::Scheduled),
            "rescheduled" => Ok(LeadStatus::Rescheduled),
            "accepted" => Ok(LeadStatus::Accepted),
            "in_process" => Ok(LeadStatus::InProcess),
            "sold" => Ok(LeadStatus::Sold),
            "no_sale" => Ok(LeadStatus::NoSale),
            "credit_fail" => Ok(LeadStatus::CreditFail),
            "canceled" => Ok(LeadStatus::Canceled),
            "expired" => Ok(LeadStatus::Expired),
            other => Err(format!("unknown lead status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchType {
    #[default]
    Immediate,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub status: LeadStatus,
    pub team_id: String,
    #[serde(default)]
    pub dispatch_type: DispatchType,
    #[serde(default)]
    pub assigned_closer_id: Option<String>,
    #[serde(default)]
    pub assigned_closer_name: Option<String>,
    #[serde(default)]
    pub setter_id: Option<String>,
    #[serde(default)]
    pub setter_name: Option<String>,
    #[serde(default)]
    pub setter_verified: bool,
    #[serde(default, deserialize_with = "lenient_timestamp::deserialize")]
    pub scheduled_appointment_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every committed write.
    #[serde(default)]
    pub version: u64,
}

impl Lead {
    pub fn new(customer_name: impl Into<String>, team_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_name: customer_name.into(),
            customer_phone: None,
            customer_email: None,
            address: None,
            status: LeadStatus::WaitingAssignment,
            team_id: team_id.into(),
            dispatch_type: DispatchType::Immediate,
            assigned_closer_id: None,
            assigned_closer_name: None,
            setter_id: None,
            setter_name: None,
            setter_verified: false,
            scheduled_appointment_time: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// A lead booked for a later appointment. Starts unverified.
    pub fn scheduled(
        customer_name: impl Into<String>,
        team_id: impl Into<String>,
        appointment: DateTime<Utc>,
    ) -> Self {
        Self {
            status: LeadStatus::Scheduled,
            dispatch_type: DispatchType::Scheduled,
            scheduled_appointment_time: Some(appointment),
            ..Self::new(customer_name, team_id)
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn with_setter(mut self, setter_id: impl Into<String>, setter_name: impl Into<String>) -> Self {
        self.setter_id = Some(setter_id.into());
        self.setter_name = Some(setter_name.into());
        self
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_closer_id.is_some()
    }

    pub fn is_assigned_to(&self, uid: &str) -> bool {
        self.assigned_closer_id.as_deref() == Some(uid)
    }

    /// Eligible for the auto-assignment matcher.
    pub fn is_waiting(&self) -> bool {
        self.status == LeadStatus::WaitingAssignment && !self.is_assigned()
    }
}

/// Appointment times arrive from several writers; anything that does not
/// parse as RFC 3339 or epoch milliseconds becomes `None`.
pub mod lenient_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(parse))
    }

    pub fn parse(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
            _ => None,
        }
    }
}
