use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{Closer, DutyStatus, Lead, LeadStatus};

/// Optimistic-concurrency guard attached to each write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Document must exist; any version.
    Exists,
    /// Document must still be at the version the writer observed.
    Version(u64),
}

impl Precondition {
    pub(crate) fn check(&self, actual: u64) -> Result<(), u64> {
        match self {
            Precondition::Exists => Ok(()),
            Precondition::Version(expected) if *expected == actual => Ok(()),
            Precondition::Version(expected) => Err(*expected),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadPatch {
    pub status: Option<LeadStatus>,
    /// `Some(None)` clears the assignment.
    pub assigned_closer: Option<Option<(String, String)>>,
    pub setter_verified: Option<bool>,
    pub scheduled_appointment_time: Option<DateTime<Utc>>,
}

impl LeadPatch {
    pub fn status(status: LeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn assign(mut self, uid: impl Into<String>, name: impl Into<String>) -> Self {
        self.assigned_closer = Some(Some((uid.into(), name.into())));
        self
    }

    pub fn unassign(mut self) -> Self {
        self.assigned_closer = Some(None);
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.setter_verified = Some(verified);
        self
    }

    pub fn appointment(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_appointment_time = Some(at);
        self
    }

    pub(crate) fn apply(&self, lead: &mut Lead) {
        if let Some(status) = self.status {
            lead.status = status;
        }
        if let Some(ref assigned) = self.assigned_closer {
            match assigned {
                Some((uid, name)) => {
                    lead.assigned_closer_id = Some(uid.clone());
                    lead.assigned_closer_name = Some(name.clone());
                }
                None => {
                    lead.assigned_closer_id = None;
                    lead.assigned_closer_name = None;
                }
            }
        }
        if let Some(verified) = self.setter_verified {
            lead.setter_verified = verified;
        }
        if let Some(at) = self.scheduled_appointment_time {
            lead.scheduled_appointment_time = Some(at);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloserPatch {
    pub status: Option<DutyStatus>,
    pub lineup_order: Option<i64>,
    pub last_assigned_at: Option<DateTime<Utc>>,
}

impl CloserPatch {
    pub fn status(status: DutyStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn lineup_order(order: i64) -> Self {
        Self {
            lineup_order: Some(order),
            ..Default::default()
        }
    }

    pub fn assigned_at(at: DateTime<Utc>) -> Self {
        Self {
            last_assigned_at: Some(at),
            ..Default::default()
        }
    }

    pub(crate) fn apply(&self, closer: &mut Closer) {
        if let Some(status) = self.status {
            closer.status = status;
        }
        if let Some(order) = self.lineup_order {
            closer.lineup_order = order;
        }
        if let Some(at) = self.last_assigned_at {
            closer.last_assigned_at = Some(at);
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Write {
    Lead {
        id: Uuid,
        precondition: Precondition,
        patch: LeadPatch,
    },
    Closer {
        uid: String,
        precondition: Precondition,
        patch: CloserPatch,
    },
}

/// A group of patches committed atomically by [`Store::commit`](super::Store::commit).
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub(crate) writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_lead(&mut self, id: Uuid, precondition: Precondition, patch: LeadPatch) -> &mut Self {
        self.writes.push(Write::Lead {
            id,
            precondition,
            patch,
        });
        self
    }

    pub fn update_closer(
        &mut self,
        uid: impl Into<String>,
        precondition: Precondition,
        patch: CloserPatch,
    ) -> &mut Self {
        self.writes.push(Write::Closer {
            uid: uid.into(),
            precondition,
            patch,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}
