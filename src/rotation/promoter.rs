use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::RotationConfig;
use crate::error::Result;
use crate::model::{Lead, LeadStatus};
use crate::notify::Notifier;
use crate::store::{LeadFilter, LeadPatch, Precondition, Store, Subscription, WriteBatch};

/// Appointment-relative windows, see [`RotationConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotionWindows {
    pub cancel_unverified_after: TimeDelta,
    pub expire_after: TimeDelta,
    pub promote_within: TimeDelta,
}

impl PromotionWindows {
    pub fn from_config(config: &RotationConfig) -> Self {
        Self {
            cancel_unverified_after: to_delta(config.cancel_unverified_after),
            expire_after: to_delta(config.expire_after),
            promote_within: to_delta(config.promote_within),
        }
    }
}

impl Default for PromotionWindows {
    fn default() -> Self {
        Self::from_config(&RotationConfig::default())
    }
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

/// Decide where a scheduled lead should go at `now`, if anywhere.
///
/// Checked in order, first match wins:
/// 1. `expire_after` or more past the appointment: `expired`
/// 2. `cancel_unverified_after` or more past and not verified: `canceled`
/// 3. verified and the appointment at most `promote_within` away
///    (or already past): `waiting_assignment`
pub fn evaluate(lead: &Lead, now: DateTime<Utc>, windows: &PromotionWindows) -> Option<LeadStatus> {
    if !lead.status.is_scheduled() {
        return None;
    }
    let appointment = lead.scheduled_appointment_time?;
    let past_due = now - appointment;

    if past_due >= windows.expire_after {
        return Some(LeadStatus::Expired);
    }
    if past_due >= windows.cancel_unverified_after && !lead.setter_verified {
        return Some(LeadStatus::Canceled);
    }
    if lead.setter_verified && appointment - now <= windows.promote_within {
        return Some(LeadStatus::WaitingAssignment);
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub lead_id: Uuid,
    pub version: u64,
    pub from: LeadStatus,
    pub to: LeadStatus,
}

/// Moves scheduled leads into the waiting queue, or out of the pipeline,
/// as their appointment approaches and passes.
pub struct Promoter {
    store: Arc<Store>,
    notifier: Notifier,
    windows: PromotionWindows,
    /// Leads already written from the current scheduled set. In memory
    /// only: a restart may process a lead again, which the version
    /// precondition turns into a harmless conflict.
    processed: HashSet<Uuid>,
}

impl Promoter {
    pub fn new(store: Arc<Store>, notifier: Notifier, windows: PromotionWindows) -> Self {
        Self {
            store,
            notifier,
            windows,
            processed: HashSet::new(),
        }
    }

    pub fn is_processed(&self, lead_id: &Uuid) -> bool {
        self.processed.contains(lead_id)
    }

    /// Pick transitions from a scheduled-lead snapshot and mark them processed.
    ///
    /// Ids no longer in the snapshot are forgotten so a lead that is
    /// rescheduled later can be processed again.
    pub fn plan(&mut self, scheduled: &[Lead], now: DateTime<Utc>) -> Vec<Promotion> {
        let present: HashSet<Uuid> = scheduled.iter().map(|l| l.id).collect();
        self.processed.retain(|id| present.contains(id));

        let mut promotions = Vec::new();
        for lead in scheduled {
            if self.processed.contains(&lead.id) {
                continue;
            }
            if lead.scheduled_appointment_time.is_none() {
                tracing::debug!(lead_id = %lead.id, "Scheduled lead has no usable appointment time");
                continue;
            }
            if let Some(to) = evaluate(lead, now, &self.windows) {
                self.processed.insert(lead.id);
                promotions.push(Promotion {
                    lead_id: lead.id,
                    version: lead.version,
                    from: lead.status,
                    to,
                });
            }
        }
        promotions
    }

    /// Run one promotion pass against the store.
    ///
    /// On commit failure the affected leads are released from the
    /// processed set so the next pass retries them.
    pub async fn run_pass(&mut self, now: DateTime<Utc>) -> Result<Vec<Promotion>> {
        let scheduled = self
            .store
            .leads(&LeadFilter::all().statuses(&LeadStatus::SCHEDULED))
            .await;
        let promotions = self.plan(&scheduled, now);
        if promotions.is_empty() {
            return Ok(promotions);
        }

        let mut batch = WriteBatch::new();
        for p in &promotions {
            batch.update_lead(p.lead_id, Precondition::Version(p.version), LeadPatch::status(p.to));
        }

        match self.store.commit(batch).await {
            Ok(revision) => {
                for p in &promotions {
                    tracing::info!(
                        lead_id = %p.lead_id,
                        from = %p.from,
                        to = %p.to,
                        revision,
                        "Scheduled lead transitioned"
                    );
                }
                let promoted = promotions
                    .iter()
                    .filter(|p| p.to == LeadStatus::WaitingAssignment)
                    .count();
                if promoted > 0 {
                    self.notifier
                        .info(format!("{} scheduled lead(s) moved to waiting queue", promoted));
                }
                Ok(promotions)
            }
            Err(e) => {
                for p in &promotions {
                    self.processed.remove(&p.lead_id);
                }
                if e.is_conflict() {
                    tracing::warn!(error = %e, leads = promotions.len(), "Promotion batch lost a race, will retry");
                } else {
                    self.notifier
                        .error(format!("Failed to update scheduled leads: {}", e));
                }
                Err(e)
            }
        }
    }

    /// Run passes on every store change and on a fixed tick until shutdown.
    pub async fn run(mut self, mut changes: Subscription, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(interval = ?interval, revision = ?changes.revision(), "Promoter started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                revision = changes.changed() => {
                    if revision.is_none() {
                        break;
                    }
                }
            }

            // Errors are already logged and surfaced; the next tick retries.
            let _ = self.run_pass(Utc::now()).await;
        }

        changes.unsubscribe();
        tracing::info!("Promoter stopped");
    }
}
