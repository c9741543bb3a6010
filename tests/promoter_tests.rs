
use std::sync::Arc;

use chrono::Utc;
use leadflow::model::LeadStatus;
use leadflow::notify::Notifier;
use leadflow::rotation::promoter::{evaluate, Promoter, PromotionWindows};
use leadflow::store::{LeadPatch, Precondition, Store, WriteBatch};
use test_harness::{minutes, scheduled_lead, seed, t0};

fn windows() -> PromotionWindows {
    PromotionWindows::default()
}

#[test]
fn test_expired_regardless_of_verification() {
    let appointment = t0();
    for verified in [true, false] {
        let lead = scheduled_lead(appointment, verified);
        assert_eq!(
            evaluate(&lead, appointment + minutes(16), &windows()),
            Some(LeadStatus::Expired),
            "verified={verified}"
        );
        assert_eq!(
            evaluate(&lead, appointment + minutes(15), &windows()),
            Some(LeadStatus::Expired),
            "verified={verified}"
        );
    }
}

#[test]
fn test_unverified_past_ten_minutes_is_canceled() {
    let appointment = t0();
    let lead = scheduled_lead(appointment, false);
    assert_eq!(
        evaluate(&lead, appointment + minutes(10), &windows()),
        Some(LeadStatus::Canceled)
    );
    assert_eq!(
        evaluate(&lead, appointment + minutes(14), &windows()),
        Some(LeadStatus::Canceled)
    );
    // Nine minutes late and still unverified: leave it alone.
    assert_eq!(evaluate(&lead, appointment + minutes(9), &windows()), None);
}

#[test]
fn test_verified_within_window_is_promoted() {
    let appointment = t0();
    let lead = scheduled_lead(appointment, true);
    assert_eq!(
        evaluate(&lead, appointment - minutes(45), &windows()),
        Some(LeadStatus::WaitingAssignment)
    );
    assert_eq!(
        evaluate(&lead, appointment - minutes(5), &windows()),
        Some(LeadStatus::WaitingAssignment)
    );
    // Verified late arrivals still go to the queue until they expire.
    assert_eq!(
        evaluate(&lead, appointment + minutes(12), &windows()),
        Some(LeadStatus::WaitingAssignment)
    );
    assert_eq!(evaluate(&lead, appointment - minutes(46), &windows()), None);
}

#[test]
fn test_unverified_upcoming_lead_waits() {
    let appointment = t0();
    let lead = scheduled_lead(appointment, false);
    assert_eq!(evaluate(&lead, appointment - minutes(30), &windows()), None);
}

#[test]
fn test_rescheduled_leads_are_evaluated() {
    let appointment = t0();
    let mut lead = scheduled_lead(appointment, true);
    lead.status = LeadStatus::Rescheduled;
    assert_eq!(
        evaluate(&lead, appointment - minutes(10), &windows()),
        Some(LeadStatus::WaitingAssignment)
    );
}

#[test]
fn test_non_scheduled_and_undated_leads_are_ignored() {
    let appointment = t0();
    let mut lead = scheduled_lead(appointment, true);
    lead.status = LeadStatus::InProcess;
    assert_eq!(evaluate(&lead, appointment + minutes(30), &windows()), None);

    let mut undated = scheduled_lead(appointment, false);
    undated.scheduled_appointment_time = None;
    assert_eq!(evaluate(&undated, appointment + minutes(30), &windows()), None);
}

#[test]
fn test_plan_marks_processed_and_skips_next_time() {
    let store = Arc::new(Store::new());
    let mut promoter = Promoter::new(store, Notifier::default(), windows());
    let lead = scheduled_lead(t0(), false);

    let now = t0() + minutes(16);
    let first = promoter.plan(std::slice::from_ref(&lead), now);
    assert_eq!(first.len(), 1);
    assert!(promoter.is_processed(&lead.id));

    // Same stale snapshot again: nothing new.
    let second = promoter.plan(std::slice::from_ref(&lead), now);
    assert!(second.is_empty());

    // Lead left the scheduled set: the guard is released.
    let third = promoter.plan(&[], now);
    assert!(third.is_empty());
    assert!(!promoter.is_processed(&lead.id));
}

#[tokio::test]
async fn test_expired_example_writes_store() {
    let store = Arc::new(Store::new());
    let appointment = Utc::now() - minutes(16);
    let (leads, _) = seed(&store, vec![scheduled_lead(appointment, false)], vec![]).await;
    let id = leads[0].id;

    let mut promoter = Promoter::new(store.clone(), Notifier::default(), windows());
    let promotions = promoter.run_pass(Utc::now()).await.unwrap();

    assert_eq!(promotions.len(), 1);
    let lead = store.get_lead(&id).await.unwrap();
    assert_eq!(lead.status, LeadStatus::Expired);
    assert_eq!(lead.version, 2);
}

#[tokio::test]
async fn test_pass_with_nothing_due_writes_nothing() {
    let store = Arc::new(Store::new());
    seed(&store, vec![scheduled_lead(Utc::now() + minutes(120), true)], vec![]).await;
    let revision = store.revision();

    let mut promoter = Promoter::new(store.clone(), Notifier::default(), windows());
    let promotions = promoter.run_pass(Utc::now()).await.unwrap();

    assert!(promotions.is_empty());
    assert_eq!(store.revision(), revision);
}

#[tokio::test]
async fn test_stale_promotion_is_rejected() {
    let store = Arc::new(Store::new());
    let (leads, _) = seed(&store, vec![scheduled_lead(Utc::now() - minutes(20), true)], vec![]).await;
    let lead = &leads[0];

    let mut promoter = Promoter::new(store.clone(), Notifier::default(), windows());
    let planned = promoter.plan(&leads, Utc::now());
    assert_eq!(planned.len(), 1);

    // Another writer touches the lead after the plan was made.
    let mut batch = WriteBatch::new();
    batch.update_lead(lead.id, Precondition::Exists, LeadPatch::default().verified(true));
    store.commit(batch).await.unwrap();

    let mut stale = WriteBatch::new();
    stale.update_lead(
        lead.id,
        Precondition::Version(planned[0].version),
        LeadPatch::status(planned[0].to),
    );
    let err = store.commit(stale).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        store.get_lead(&lead.id).await.unwrap().status,
        LeadStatus::Scheduled
    );

    // A fresh promoter, as after a restart, picks the lead up again.
    let mut restarted = Promoter::new(store.clone(), Notifier::default(), windows());
    let promotions = restarted.run_pass(Utc::now()).await.unwrap();
    assert_eq!(promotions.len(), 1);
    assert_eq!(
        store.get_lead(&lead.id).await.unwrap().status,
        LeadStatus::Expired
    );
}

#[tokio::test]
async fn test_processed_guard_blocks_repeat_writes() {
    let store = Arc::new(Store::new());
    let (leads, _) = seed(&store, vec![scheduled_lead(Utc::now() - minutes(20), false)], vec![]).await;
    let id = leads[0].id;

    let mut promoter = Promoter::new(store.clone(), Notifier::default(), windows());
    let planned = promoter.plan(&leads, Utc::now());
    assert_eq!(planned.len(), 1);
    assert!(promoter.is_processed(&id));

    let promotions = promoter.run_pass(Utc::now()).await.unwrap();
    assert!(promotions.is_empty());
    assert_eq!(store.get_lead(&id).await.unwrap().status, LeadStatus::Scheduled);
}

#[tokio::test]
async fn test_promotion_notifies_listeners() {
    let store = Arc::new(Store::new());
    seed(&store, vec![scheduled_lead(Utc::now() + minutes(30), true)], vec![]).await;

    let notifier = Notifier::default();
    let mut notices = notifier.subscribe();
    let mut promoter = Promoter::new(store.clone(), notifier, windows());
    let promotions = promoter.run_pass(Utc::now()).await.unwrap();

    assert_eq!(promotions.len(), 1);
    assert_eq!(promotions[0].to, LeadStatus::WaitingAssignment);
    let notice = notices.try_recv().unwrap();
    assert!(notice.message.contains("waiting queue"));
}
