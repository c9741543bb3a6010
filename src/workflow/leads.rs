use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{LeadflowError, Result};
use crate::model::lead::lenient_timestamp;
use crate::model::{DispatchType, Lead, LeadStatus, Role, Session};
use crate::store::{LeadFilter, LeadPatch, Precondition, Store, WriteBatch};

/// Intake form for a new lead.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLead {
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// Defaults to the caller's team.
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub dispatch_type: DispatchType,
    #[serde(default, deserialize_with = "lenient_timestamp::deserialize")]
    pub scheduled_appointment_time: Option<DateTime<Utc>>,
}

impl NewLead {
    pub fn immediate(customer_name: impl Into<String>) -> Self {
        Self {
            customer_name: customer_name.into(),
            customer_phone: None,
            customer_email: None,
            address: None,
            team_id: None,
            dispatch_type: DispatchType::Immediate,
            scheduled_appointment_time: None,
        }
    }

    pub fn scheduled(customer_name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            dispatch_type: DispatchType::Scheduled,
            scheduled_appointment_time: Some(at),
            ..Self::immediate(customer_name)
        }
    }
}

fn require_setter(session: &Session, action: &str) -> Result<()> {
    if session.role == Role::Setter || session.is_supervisor() {
        Ok(())
    } else {
        Err(LeadflowError::Forbidden(format!(
            "{} requires setter, manager or admin role, caller is {}",
            action, session.role
        )))
    }
}

fn require_status(lead: &Lead, allowed: &[LeadStatus], to: LeadStatus) -> Result<()> {
    if allowed.contains(&lead.status) {
        Ok(())
    } else {
        Err(LeadflowError::InvalidTransition {
            from: lead.status,
            to,
        })
    }
}

/// Fetch a lead the caller is allowed to see.
pub async fn get_lead(store: &Store, session: &Session, id: Uuid) -> Result<Lead> {
    let lead = store
        .get_lead(&id)
        .await
        .ok_or(LeadflowError::LeadNotFound(id))?;
    session.require_team(&lead.team_id)?;
    Ok(lead)
}

/// Leads on the caller's team (every team for admins), oldest first.
pub async fn visible_leads(store: &Store, session: &Session, status: Option<LeadStatus>) -> Vec<Lead> {
    let mut filter = LeadFilter::all();
    if session.role != Role::Admin {
        filter = filter.team(session.team_id.clone());
    }
    if let Some(status) = status {
        filter = filter.statuses(&[status]);
    }
    store.leads(&filter).await
}

async fn commit_patch(store: &Store, lead: &Lead, patch: LeadPatch) -> Result<Lead> {
    let mut batch = WriteBatch::new();
    batch.update_lead(lead.id, Precondition::Version(lead.version), patch);
    store.commit(batch).await?;
    store
        .get_lead(&lead.id)
        .await
        .ok_or(LeadflowError::LeadNotFound(lead.id))
}

pub async fn create_lead(store: &Store, session: &Session, new: NewLead) -> Result<Lead> {
    require_setter(session, "Creating a lead")?;

    let customer_name = new.customer_name.trim();
    if customer_name.is_empty() {
        return Err(LeadflowError::Validation("customer name is required".to_string()));
    }

    let team_id = new.team_id.unwrap_or_else(|| session.team_id.clone());
    session.require_team(&team_id)?;

    let mut lead = match new.dispatch_type {
        DispatchType::Immediate => Lead::new(customer_name, team_id),
        DispatchType::Scheduled => {
            let at = new.scheduled_appointment_time.ok_or_else(|| {
                LeadflowError::Validation(
                    "scheduled leads need a valid scheduledAppointmentTime".to_string(),
                )
            })?;
            Lead::scheduled(customer_name, team_id, at)
        }
    };
    lead.customer_phone = new.customer_phone;
    lead.customer_email = new.customer_email;
    lead.address = new.address;
    let lead = lead.with_setter(session.uid.clone(), session.name.clone());

    let lead = store.insert_lead(lead).await?;
    tracing::info!(
        lead_id = %lead.id,
        team = %lead.team_id,
        status = %lead.status,
        setter = %session.uid,
        "Lead created"
    );
    Ok(lead)
}

/// Setter confirms a scheduled appointment is still on.
pub async fn verify_appointment(store: &Store, session: &Session, id: Uuid) -> Result<Lead> {
    require_setter(session, "Verifying an appointment")?;
    let lead = get_lead(store, session, id).await?;
    require_status(&lead, &LeadStatus::SCHEDULED, lead.status)?;

    let lead = commit_patch(store, &lead, LeadPatch::default().verified(true)).await?;
    tracing::info!(lead_id = %lead.id, setter = %session.uid, "Appointment verified");
    Ok(lead)
}

/// Book a new appointment time. Verification starts over.
pub async fn reschedule(store: &Store, session: &Session, id: Uuid, at: DateTime<Utc>) -> Result<Lead> {
    require_setter(session, "Rescheduling a lead")?;
    let lead = get_lead(store, session, id).await?;
    require_status(
        &lead,
        &[
            LeadStatus::Scheduled,
            LeadStatus::Rescheduled,
            LeadStatus::Canceled,
            LeadStatus::Expired,
        ],
        LeadStatus::Rescheduled,
    )?;

    let patch = LeadPatch::status(LeadStatus::Rescheduled)
        .appointment(at)
        .verified(false)
        .unassign();
    let lead = commit_patch(store, &lead, patch).await?;
    tracing::info!(lead_id = %lead.id, appointment = %at, "Lead rescheduled");
    Ok(lead)
}

/// Assigned closer picks up the lead.
pub async fn accept(store: &Store, session: &Session, id: Uuid) -> Result<Lead> {
    let lead = get_lead(store, session, id).await?;
    if !lead.is_assigned_to(&session.uid) {
        return Err(LeadflowError::Forbidden(format!(
            "lead {} is not assigned to {}",
            id, session.uid
        )));
    }
    require_status(&lead, &[LeadStatus::InProcess], LeadStatus::Accepted)?;

    let lead = commit_patch(store, &lead, LeadPatch::status(LeadStatus::Accepted)).await?;
    tracing::info!(lead_id = %lead.id, closer = %session.uid, "Lead accepted");
    Ok(lead)
}

/// Record the outcome of a sit. Frees the closer for the next lead.
pub async fn record_disposition(
    store: &Store,
    session: &Session,
    id: Uuid,
    outcome: LeadStatus,
) -> Result<Lead> {
    if !outcome.is_disposition() {
        return Err(LeadflowError::Validation(format!(
            "{} is not a disposition; expected sold, no_sale or credit_fail",
            outcome
        )));
    }
    let lead = get_lead(store, session, id).await?;
    if !lead.is_assigned_to(&session.uid) && !session.is_supervisor() {
        return Err(LeadflowError::Forbidden(format!(
            "lead {} is not assigned to {}",
            id, session.uid
        )));
    }
    if lead.status.is_terminal() {
        tracing::warn!(lead_id = %lead.id, status = %lead.status, outcome = %outcome, "Lead already finished");
        return Err(LeadflowError::InvalidTransition {
            from: lead.status,
            to: outcome,
        });
    }
    require_status(&lead, &[LeadStatus::InProcess, LeadStatus::Accepted], outcome)?;

    let lead = commit_patch(store, &lead, LeadPatch::status(outcome)).await?;
    tracing::info!(lead_id = %lead.id, outcome = %outcome, by = %session.uid, "Disposition recorded");
    Ok(lead)
}

pub async fn delete_lead(store: &Store, session: &Session, id: Uuid) -> Result<Lead> {
    session.require_admin("Deleting a lead")?;
    let lead = store.delete_lead(&id).await?;
    tracing::warn!(lead_id = %id, by = %session.uid, "Lead deleted");
    Ok(lead)
}
