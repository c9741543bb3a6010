use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{LeadflowError, Result};
use crate::model::{Closer, Lead, Role, Session};
use crate::store::{CloserPatch, Precondition, WriteBatch};

/// Gap between consecutive lineup positions written by a reorder.
pub const LINEUP_STEP: i64 = 100;

/// Closer uids referenced by leads that still occupy them.
pub fn busy_closer_ids(leads: &[Lead]) -> HashSet<&str> {
    leads
        .iter()
        .filter(|l| l.status.occupies_closer())
        .filter_map(|l| l.assigned_closer_id.as_deref())
        .collect()
}

/// Sort key for deterministic round robin: lineup order, then name, then uid.
pub fn lineup_cmp(a: &Closer, b: &Closer) -> std::cmp::Ordering {
    a.lineup_order
        .cmp(&b.lineup_order)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.uid.cmp(&b.uid))
}

/// On-duty closers in lineup order.
pub fn on_duty_lineup(closers: &[Closer]) -> Vec<&Closer> {
    let mut lineup: Vec<&Closer> = closers
        .iter()
        .filter(|c| c.is_on_duty() && c.role.can_close())
        .collect();
    lineup.sort_by(|a, b| lineup_cmp(a, b));
    lineup
}

/// On-duty closers not currently working a lead, in lineup order.
pub fn available_closers<'a>(closers: &'a [Closer], leads: &[Lead]) -> Vec<&'a Closer> {
    let busy = busy_closer_ids(leads);
    on_duty_lineup(closers)
        .into_iter()
        .filter(|c| !busy.contains(c.uid.as_str()))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineupEntry {
    /// 1-based position within the returned list.
    pub position: usize,
    pub uid: String,
    pub name: String,
    pub role: Role,
    pub lineup_order: i64,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineupView {
    pub team_id: String,
    pub on_duty_count: usize,
    pub available_count: usize,
    pub entries: Vec<LineupEntry>,
}

/// Lineup for the caller's team.
///
/// Closers see the whole on-duty roster so they can find their place in
/// line. Setters, managers and admins see only who can take a lead now.
pub fn project(session: &Session, closers: &[Closer], leads: &[Lead]) -> LineupView {
    let team_closers: Vec<Closer> = closers
        .iter()
        .filter(|c| c.team_id == session.team_id)
        .cloned()
        .collect();
    let team_leads: Vec<Lead> = leads
        .iter()
        .filter(|l| l.team_id == session.team_id)
        .cloned()
        .collect();

    let busy = busy_closer_ids(&team_leads);
    let on_duty = on_duty_lineup(&team_closers);
    let available_count = on_duty
        .iter()
        .filter(|c| !busy.contains(c.uid.as_str()))
        .count();

    let shown: Vec<&Closer> = if session.role == Role::Closer {
        on_duty.clone()
    } else {
        on_duty
            .iter()
            .copied()
            .filter(|c| !busy.contains(c.uid.as_str()))
            .collect()
    };

    let entries = shown
        .into_iter()
        .enumerate()
        .map(|(i, c)| LineupEntry {
            position: i + 1,
            uid: c.uid.clone(),
            name: c.name.clone(),
            role: c.role,
            lineup_order: c.lineup_order,
            available: !busy.contains(c.uid.as_str()),
        })
        .collect();

    LineupView {
        team_id: session.team_id.clone(),
        on_duty_count: on_duty.len(),
        available_count,
        entries,
    }
}

/// Build the batch that moves `ordered` to the front of the team lineup.
///
/// Listed closers get `100, 200, ...` in the given order; the rest of the
/// team follows in their current order. Closers whose order is unchanged
/// are not written, so reapplying the same order is a no-op.
pub fn reorder_batch(session: &Session, closers: &[Closer], ordered: &[String]) -> Result<WriteBatch> {
    session.require_supervisor("Reordering the lineup")?;

    let mut team: Vec<&Closer> = closers
        .iter()
        .filter(|c| c.team_id == session.team_id)
        .collect();
    team.sort_by(|a, b| lineup_cmp(a, b));

    let mut seen = HashSet::new();
    let mut sequence: Vec<&Closer> = Vec::with_capacity(team.len());
    for uid in ordered {
        if !seen.insert(uid.as_str()) {
            return Err(LeadflowError::Validation(format!(
                "closer {} listed twice",
                uid
            )));
        }
        let closer = team
            .iter()
            .copied()
            .find(|c| &c.uid == uid)
            .ok_or_else(|| LeadflowError::CloserNotFound(uid.clone()))?;
        sequence.push(closer);
    }
    sequence.extend(team.iter().copied().filter(|c| !seen.contains(c.uid.as_str())));

    let mut batch = WriteBatch::new();
    for (i, closer) in sequence.iter().enumerate() {
        let order = (i as i64 + 1) * LINEUP_STEP;
        if closer.lineup_order != order {
            batch.update_closer(
                closer.uid.clone(),
                Precondition::Version(closer.version),
                CloserPatch::lineup_order(order),
            );
        }
    }
    Ok(batch)
}

/// Lineup order for a newly registered closer: one step behind the last.
pub fn next_lineup_order(team_closers: &[Closer]) -> i64 {
    team_closers
        .iter()
        .map(|c| c.lineup_order)
        .max()
        .map_or(LINEUP_STEP, |max| max + LINEUP_STEP)
}
