//! In-process document store for leads, closers and teams.
//!
//! Three keyed collections with per-document writes and change listeners:
//!
//! - **Versioned documents**: every committed write bumps the document's
//!   `version`.
//! - **Atomic batches with preconditions**: [`Store::commit`] checks every
//!   [`Precondition`] under one write lock and applies all patches or
//!   none. Two matchers racing for the same closer cannot both win.
//! - **Change feed**: [`Store::subscribe`] hands out a [`Subscription`]
//!   that wakes after each commit and can be dropped or unsubscribed.
//! - **Snapshots**: [`Store::save`] / [`Store::load`] persist the
//!   collections as JSON.

pub mod batch;
pub mod subscription;

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use crate::error::{LeadflowError, Result};
use crate::model::{Closer, Lead, LeadStatus, Team};

pub use batch::{CloserPatch, LeadPatch, Precondition, WriteBatch};
pub use subscription::Subscription;

use batch::Write;

/// Lead capacity used by [`Store::new`] and [`Store::load`].
pub const DEFAULT_MAX_LEADS: usize = 100_000;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collections {
    #[serde(default)]
    leads: HashMap<Uuid, Lead>,
    #[serde(default)]
    closers: HashMap<String, Closer>,
    #[serde(default)]
    teams: HashMap<String, Team>,
}

/// Read filter over the leads collection.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub team_id: Option<String>,
    pub statuses: Option<Vec<LeadStatus>>,
}

impl LeadFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn statuses(mut self, statuses: &[LeadStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    fn matches(&self, lead: &Lead) -> bool {
        if let Some(ref team) = self.team_id {
            if &lead.team_id != team {
                return false;
            }
        }
        if let Some(ref statuses) = self.statuses {
            if !statuses.contains(&lead.status) {
                return false;
            }
        }
        true
    }
}

/// Consistent view of leads and closers taken under a single read lock.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub revision: u64,
    pub leads: Vec<Lead>,
    pub closers: Vec<Closer>,
}

#[derive(Debug)]
pub struct Store {
    data: RwLock<Collections>,
    revision: watch::Sender<u64>,
    max_leads: usize,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_LEADS)
    }

    pub fn with_capacity(max_leads: usize) -> Self {
        Self::from_collections(Collections::default(), max_leads)
    }

    fn from_collections(collections: Collections, max_leads: usize) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            data: RwLock::new(collections),
            revision,
            max_leads,
        }
    }

    /// Publish a new revision to subscribers. Called with the write lock held
    /// so revisions are ordered with the writes they describe.
    fn bump_revision(&self) -> u64 {
        self.revision.send_modify(|r| *r += 1);
        *self.revision.borrow()
    }

    pub fn max_leads(&self) -> usize {
        self.max_leads
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.revision.subscribe())
    }

    // --- leads ---

    /// Insert a new lead. The stored copy starts at version 1.
    pub async fn insert_lead(&self, mut lead: Lead) -> Result<Lead> {
        let mut data = self.data.write().await;
        if data.leads.len() >= self.max_leads {
            return Err(LeadflowError::Validation(format!(
                "lead store at capacity ({})",
                self.max_leads
            )));
        }
        if data.leads.contains_key(&lead.id) {
            return Err(LeadflowError::Validation(format!(
                "lead {} already exists",
                lead.id
            )));
        }
        lead.version = 1;
        data.leads.insert(lead.id, lead.clone());
        self.bump_revision();
        tracing::debug!(lead_id = %lead.id, team = %lead.team_id, status = %lead.status, "Lead inserted");
        Ok(lead)
    }

    pub async fn get_lead(&self, id: &Uuid) -> Option<Lead> {
        self.data.read().await.leads.get(id).cloned()
    }

    /// Leads matching `filter`, oldest first.
    pub async fn leads(&self, filter: &LeadFilter) -> Vec<Lead> {
        let data = self.data.read().await;
        let mut leads: Vec<Lead> = data
            .leads
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        leads
    }

    pub async fn delete_lead(&self, id: &Uuid) -> Result<Lead> {
        let mut data = self.data.write().await;
        let removed = data
            .leads
            .remove(id)
            .ok_or(LeadflowError::LeadNotFound(*id))?;
        self.bump_revision();
        Ok(removed)
    }

    pub async fn lead_count(&self) -> usize {
        self.data.read().await.leads.len()
    }

    // --- closers ---

    pub async fn insert_closer(&self, mut closer: Closer) -> Result<Closer> {
        let mut data = self.data.write().await;
        if data.closers.contains_key(&closer.uid) {
            return Err(LeadflowError::Validation(format!(
                "closer {} already exists",
                closer.uid
            )));
        }
        closer.version = 1;
        closer.updated_at = Utc::now();
        data.closers.insert(closer.uid.clone(), closer.clone());
        self.bump_revision();
        tracing::debug!(closer = %closer.uid, team = %closer.team_id, "Closer inserted");
        Ok(closer)
    }

    pub async fn get_closer(&self, uid: &str) -> Option<Closer> {
        self.data.read().await.closers.get(uid).cloned()
    }

    /// Closers of one team (or all), in lineup order.
    pub async fn closers(&self, team_id: Option<&str>) -> Vec<Closer> {
        let data = self.data.read().await;
        let mut closers: Vec<Closer> = data
            .closers
            .values()
            .filter(|c| team_id.map_or(true, |t| c.team_id == t))
            .cloned()
            .collect();
        closers.sort_by(|a, b| {
            a.lineup_order
                .cmp(&b.lineup_order)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.uid.cmp(&b.uid))
        });
        closers
    }

    // --- teams ---

    pub async fn insert_team(&self, mut team: Team) -> Result<Team> {
        let mut data = self.data.write().await;
        if data.teams.contains_key(&team.id) {
            return Err(LeadflowError::Validation(format!(
                "team {} already exists",
                team.id
            )));
        }
        team.version = 1;
        data.teams.insert(team.id.clone(), team.clone());
        self.bump_revision();
        Ok(team)
    }

    pub async fn get_team(&self, id: &str) -> Option<Team> {
        self.data.read().await.teams.get(id).cloned()
    }

    pub async fn teams(&self) -> Vec<Team> {
        let mut teams: Vec<Team> = self.data.read().await.teams.values().cloned().collect();
        teams.sort_by(|a, b| a.id.cmp(&b.id));
        teams
    }

    // --- batches and snapshots ---

    pub async fn snapshot(&self) -> StoreSnapshot {
        let data = self.data.read().await;
        StoreSnapshot {
            revision: self.revision(),
            leads: data.leads.values().cloned().collect(),
            closers: data.closers.values().cloned().collect(),
        }
    }

    /// Apply every write in `batch`, or none of them.
    ///
    /// Returns the new store revision. An empty batch is a no-op and does
    /// not wake subscribers.
    pub async fn commit(&self, batch: WriteBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(self.revision());
        }

        let mut data = self.data.write().await;

        for write in &batch.writes {
            match write {
                Write::Lead {
                    id, precondition, ..
                } => {
                    let lead = data.leads.get(id).ok_or(LeadflowError::LeadNotFound(*id))?;
                    precondition
                        .check(lead.version)
                        .map_err(|expected| LeadflowError::Conflict {
                            document: format!("leads/{}", id),
                            expected,
                            actual: lead.version,
                        })?;
                }
                Write::Closer {
                    uid, precondition, ..
                } => {
                    let closer = data
                        .closers
                        .get(uid)
                        .ok_or_else(|| LeadflowError::CloserNotFound(uid.clone()))?;
                    precondition
                        .check(closer.version)
                        .map_err(|expected| LeadflowError::Conflict {
                            document: format!("closers/{}", uid),
                            expected,
                            actual: closer.version,
                        })?;
                }
            }
        }

        let now = Utc::now();
        for write in &batch.writes {
            match write {
                Write::Lead { id, patch, .. } => {
                    if let Some(lead) = data.leads.get_mut(id) {
                        patch.apply(lead);
                        lead.version += 1;
                        lead.updated_at = now;
                    }
                }
                Write::Closer { uid, patch, .. } => {
                    if let Some(closer) = data.closers.get_mut(uid) {
                        patch.apply(closer);
                        closer.version += 1;
                        closer.updated_at = now;
                    }
                }
            }
        }

        let revision = self.bump_revision();
        tracing::debug!(writes = batch.len(), revision, "Batch committed");
        Ok(revision)
    }

    // --- persistence ---

    /// Load a snapshot written by [`Store::save`] with the default lead
    /// capacity. A missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self> {
        Self::load_with_capacity(path, DEFAULT_MAX_LEADS).await
    }

    /// Load a snapshot written by [`Store::save`], capping inserts at
    /// `max_leads`. The cap is not persisted; a snapshot holding more leads
    /// still loads but rejects further inserts.
    pub async fn load_with_capacity(path: &Path, max_leads: usize) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let collections: Collections = serde_json::from_slice(&bytes)?;
                tracing::info!(
                    path = %path.display(),
                    leads = collections.leads.len(),
                    closers = collections.closers.len(),
                    teams = collections.teams.len(),
                    max_leads,
                    "Store loaded"
                );
                Ok(Self::from_collections(collections, max_leads))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No data file, starting empty");
                Ok(Self::with_capacity(max_leads))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write all collections as JSON, replacing the file atomically.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = {
            let data = self.data.read().await;
            serde_json::to_vec_pretty(&*data)?
        };
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Store saved");
        Ok(())
    }
}
