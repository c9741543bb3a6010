use serde::Deserialize;

use crate::error::{LeadflowError, Result};
use crate::model::{Closer, DutyStatus, Role, Session, Team};
use crate::rotation::lineup::{self, LineupView};
use crate::store::{CloserPatch, LeadFilter, Precondition, Store, WriteBatch};

fn default_role() -> Role {
    Role::Closer
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCloser {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
    /// Defaults to one step behind the current last closer.
    #[serde(default)]
    pub lineup_order: Option<i64>,
    #[serde(default)]
    pub on_duty: bool,
}

impl NewCloser {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            team_id: None,
            role: Role::Closer,
            lineup_order: None,
            on_duty: false,
        }
    }
}

pub async fn register_closer(store: &Store, session: &Session, new: NewCloser) -> Result<Closer> {
    session.require_supervisor("Registering a closer")?;

    if new.uid.trim().is_empty() || new.name.trim().is_empty() {
        return Err(LeadflowError::Validation("closer uid and name are required".to_string()));
    }
    if !new.role.can_close() {
        return Err(LeadflowError::Validation(format!(
            "role {} cannot stand in the closer rotation",
            new.role
        )));
    }

    let team_id = new.team_id.unwrap_or_else(|| session.team_id.clone());
    session.require_team(&team_id)?;

    let lineup_order = match new.lineup_order {
        Some(order) => order,
        None => lineup::next_lineup_order(&store.closers(Some(team_id.as_str())).await),
    };

    let mut closer = Closer::new(new.uid.trim(), new.name.trim(), team_id, lineup_order).with_role(new.role);
    if new.on_duty {
        closer = closer.on_duty();
    }

    let closer = store.insert_closer(closer).await?;
    tracing::info!(
        closer = %closer.uid,
        team = %closer.team_id,
        lineup_order = closer.lineup_order,
        "Closer registered"
    );
    Ok(closer)
}

/// Clock a closer in or out. Closers may only change their own status.
pub async fn set_duty(store: &Store, session: &Session, uid: &str, status: DutyStatus) -> Result<Closer> {
    let closer = store
        .get_closer(uid)
        .await
        .ok_or_else(|| LeadflowError::CloserNotFound(uid.to_string()))?;
    session.require_team(&closer.team_id)?;
    if closer.uid != session.uid && !session.is_supervisor() {
        return Err(LeadflowError::Forbidden(format!(
            "{} cannot change duty status of {}",
            session.uid, uid
        )));
    }
    if closer.status == status {
        return Ok(closer);
    }

    let mut batch = WriteBatch::new();
    batch.update_closer(uid, Precondition::Version(closer.version), CloserPatch::status(status));
    store.commit(batch).await?;
    tracing::info!(closer = %uid, status = %status, by = %session.uid, "Duty status changed");

    store
        .get_closer(uid)
        .await
        .ok_or_else(|| LeadflowError::CloserNotFound(uid.to_string()))
}

pub async fn team_lineup(store: &Store, session: &Session) -> LineupView {
    let closers = store.closers(Some(session.team_id.as_str())).await;
    let leads = store.leads(&LeadFilter::all().team(session.team_id.clone())).await;
    lineup::project(session, &closers, &leads)
}

/// Manager-only: put `ordered` at the front of the team lineup.
pub async fn reorder_lineup(store: &Store, session: &Session, ordered: &[String]) -> Result<LineupView> {
    let closers = store.closers(Some(session.team_id.as_str())).await;
    let batch = lineup::reorder_batch(session, &closers, ordered)?;
    let writes = batch.len();
    store.commit(batch).await?;
    tracing::info!(team = %session.team_id, writes, by = %session.uid, "Lineup reordered");
    Ok(team_lineup(store, session).await)
}

/// Fetch a team the caller belongs to (any team for admins).
pub async fn get_team(store: &Store, session: &Session, id: &str) -> Result<Team> {
    session.require_team(id)?;
    store
        .get_team(id)
        .await
        .ok_or_else(|| LeadflowError::TeamNotFound(id.to_string()))
}

pub async fn create_team(store: &Store, session: &Session, id: &str, name: &str) -> Result<Team> {
    session.require_admin("Creating a team")?;
    if id.trim().is_empty() {
        return Err(LeadflowError::Validation("team id is required".to_string()));
    }
    let team = store.insert_team(Team::new(id.trim(), name.trim())).await?;
    tracing::info!(team = %team.id, "Team created");
    Ok(team)
}
