use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Closer, Lead, LeadStatus};
use crate::notify::Notifier;
use crate::rotation::lineup::available_closers;
use crate::store::{CloserPatch, LeadPatch, Precondition, Store, Subscription, WriteBatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub lead_id: Uuid,
    pub lead_version: u64,
    pub team_id: String,
    pub closer_uid: String,
    pub closer_name: String,
    pub closer_version: u64,
}

/// Waiting, unassigned leads, oldest first.
pub fn waiting_leads(leads: &[Lead]) -> Vec<&Lead> {
    let mut waiting: Vec<&Lead> = leads.iter().filter(|l| l.is_waiting()).collect();
    waiting.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    waiting
}

/// Pair waiting leads with available closers, team by team.
///
/// Within a team the oldest lead goes to the closer at the front of the
/// lineup, the next oldest to the next closer, and so on until either
/// side runs out.
pub fn plan_assignments(leads: &[Lead], closers: &[Closer]) -> Vec<Assignment> {
    let mut waiting_by_team: BTreeMap<&str, Vec<&Lead>> = BTreeMap::new();
    for lead in waiting_leads(leads) {
        waiting_by_team.entry(lead.team_id.as_str()).or_default().push(lead);
    }

    let mut available_by_team: BTreeMap<&str, Vec<&Closer>> = BTreeMap::new();
    for closer in available_closers(closers, leads) {
        available_by_team
            .entry(closer.team_id.as_str())
            .or_default()
            .push(closer);
    }

    let mut plan = Vec::new();
    for (team, waiting) in waiting_by_team {
        let Some(available) = available_by_team.get(team) else {
            continue;
        };
        for (lead, closer) in waiting.into_iter().zip(available.iter()) {
            plan.push(Assignment {
                lead_id: lead.id,
                lead_version: lead.version,
                team_id: team.to_string(),
                closer_uid: closer.uid.clone(),
                closer_name: closer.name.clone(),
                closer_version: closer.version,
            });
        }
    }
    plan
}

/// Auto-assigns waiting leads to on-duty closers.
#[derive(Clone)]
pub struct Matcher {
    store: Arc<Store>,
    notifier: Notifier,
}

impl Matcher {
    pub fn new(store: Arc<Store>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Plan against a consistent snapshot of the store.
    pub async fn plan(&self) -> Vec<Assignment> {
        let snapshot = self.store.snapshot().await;
        let plan = plan_assignments(&snapshot.leads, &snapshot.closers);
        if plan.is_empty() {
            tracing::debug!(revision = snapshot.revision, "Nothing to assign");
        }
        plan
    }

    /// Plan and commit in one go.
    pub async fn run_pass(&self) -> Result<Vec<Assignment>> {
        let plan = self.plan().await;
        self.commit(plan).await
    }

    /// Commit a plan as one batch.
    ///
    /// Each lead write is guarded by the lead's observed version and each
    /// closer is stamped with `last_assigned_at` under its observed version,
    /// so a competing writer makes the whole batch fail with a conflict
    /// instead of double-assigning a closer. Conflicts are left for the next
    /// pass to replan; any other failure is surfaced as an error notice.
    pub async fn commit(&self, plan: Vec<Assignment>) -> Result<Vec<Assignment>> {
        if plan.is_empty() {
            return Ok(plan);
        }

        let now = Utc::now();
        let mut batch = WriteBatch::new();
        for a in &plan {
            batch.update_lead(
                a.lead_id,
                Precondition::Version(a.lead_version),
                LeadPatch::status(LeadStatus::InProcess).assign(&a.closer_uid, &a.closer_name),
            );
            batch.update_closer(
                a.closer_uid.clone(),
                Precondition::Version(a.closer_version),
                CloserPatch::assigned_at(now),
            );
        }

        match self.store.commit(batch).await {
            Ok(revision) => {
                for a in &plan {
                    tracing::info!(
                        lead_id = %a.lead_id,
                        closer = %a.closer_uid,
                        team = %a.team_id,
                        revision,
                        "Lead assigned"
                    );
                }
                let names: Vec<&str> = plan.iter().map(|a| a.closer_name.as_str()).collect();
                self.notifier.success(format!(
                    "Assigned {} lead(s) to {}",
                    plan.len(),
                    names.join(", ")
                ));
                Ok(plan)
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(error = %e, planned = plan.len(), "Assignment batch lost a race, replanning on next change");
                Err(e)
            }
            Err(e) => {
                self.notifier.error(format!("Failed to assign leads: {}", e));
                Err(e)
            }
        }
    }

    /// Run a pass once the store has been quiet for `debounce`.
    ///
    /// The first pass runs right away so leads waiting at startup are not
    /// held until the next write.
    pub async fn run(self, mut changes: Subscription, debounce: Duration, shutdown: CancellationToken) {
        let mut deadline = Some(Instant::now());

        tracing::info!(debounce = ?debounce, revision = ?changes.revision(), "Matcher started");

        loop {
            let wait = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                revision = changes.changed() => {
                    if revision.is_none() {
                        break;
                    }
                    deadline = Some(Instant::now() + debounce);
                }
                _ = wait => {
                    deadline = None;
                    // Errors are logged inside; a conflict replans after the
                    // write that caused it wakes the feed.
                    let _ = self.run_pass().await;
                }
            }
        }

        changes.unsubscribe();
        tracing::info!("Matcher stopped");
    }
}
