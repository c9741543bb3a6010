
use leadflow::model::{Closer, LeadStatus, Role, Session};
use leadflow::rotation::lineup::{available_closers, project, reorder_batch, LineupView, LINEUP_STEP};
use leadflow::store::Store;
use leadflow::workflow::closers::{reorder_lineup, team_lineup};
use leadflow::LeadflowError;
use test_harness::{closer_session, on_duty, seed, session, t0, waiting_lead, OTHER_TEAM, TEAM};

fn busy_with(uid: &str, status: LeadStatus) -> leadflow::model::Lead {
    let mut lead = waiting_lead("Busy", t0());
    lead.status = status;
    lead.assigned_closer_id = Some(uid.to_string());
    lead
}

fn roster() -> Vec<Closer> {
    vec![
        on_duty("a", "Ann", 100),
        on_duty("b", "Bea", 200),
        on_duty("c", "Cy", 300),
        Closer::new("d", "Dee", TEAM, 50),
        Closer::new("x", "Xan", OTHER_TEAM, 10).on_duty(),
    ]
}

#[test]
fn test_every_occupying_status_makes_closer_busy() {
    for status in LeadStatus::OCCUPYING {
        let leads = vec![busy_with("a", status)];
        let closers = roster();
        let uids: Vec<&str> = available_closers(&closers, &leads)
            .iter()
            .filter(|c| c.team_id == TEAM)
            .map(|c| c.uid.as_str())
            .collect();
        assert_eq!(uids, vec!["b", "c"], "status={status}");
    }
}

#[test]
fn test_finished_leads_free_the_closer() {
    for status in [
        LeadStatus::Sold,
        LeadStatus::NoSale,
        LeadStatus::CreditFail,
        LeadStatus::Canceled,
        LeadStatus::Expired,
    ] {
        let leads = vec![busy_with("a", status)];
        let closers = roster();
        let available = available_closers(&closers, &leads);
        assert!(available.iter().any(|c| c.uid == "a"), "status={status}");
    }
}

#[test]
fn test_closer_sees_full_roster_with_positions() {
    let leads = vec![busy_with("a", LeadStatus::InProcess)];
    let view = project(&closer_session("b"), &roster(), &leads);

    assert_eq!(view.team_id, TEAM);
    assert_eq!(view.on_duty_count, 3);
    assert_eq!(view.available_count, 2);
    let entries: Vec<(usize, &str, bool)> = view
        .entries
        .iter()
        .map(|e| (e.position, e.uid.as_str(), e.available))
        .collect();
    assert_eq!(entries, vec![(1, "a", false), (2, "b", true), (3, "c", true)]);
}

#[test]
fn test_supervisors_and_setters_see_only_available() {
    let leads = vec![busy_with("a", LeadStatus::Accepted)];
    for role in [Role::Setter, Role::Manager, Role::Admin] {
        let view = project(&session(role), &roster(), &leads);
        let uids: Vec<&str> = view.entries.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, vec!["b", "c"], "role={role}");
        assert_eq!(view.entries[0].position, 1);
        assert!(view.entries.iter().all(|e| e.available));
    }
}

#[test]
fn test_lineup_is_confined_to_session_team() {
    let view = project(&Session::new("x", "Xan", Role::Closer, OTHER_TEAM), &roster(), &[]);
    let uids: Vec<&str> = view.entries.iter().map(|e| e.uid.as_str()).collect();
    assert_eq!(uids, vec!["x"]);
}

#[test]
fn test_reorder_requires_supervisor() {
    let err = reorder_batch(&closer_session("a"), &roster(), &["c".to_string()]).unwrap_err();
    assert!(matches!(err, LeadflowError::Forbidden(_)));
}

#[test]
fn test_reorder_rejects_unknown_and_duplicate_closers() {
    let manager = session(Role::Manager);

    let err = reorder_batch(&manager, &roster(), &["x".to_string()]).unwrap_err();
    assert!(matches!(err, LeadflowError::CloserNotFound(_)));

    let err = reorder_batch(&manager, &roster(), &["a".to_string(), "a".to_string()]).unwrap_err();
    assert!(matches!(err, LeadflowError::Validation(_)));
}

#[test]
fn test_reorder_skips_unchanged_positions() {
    let closers = vec![
        on_duty("a", "Ann", LINEUP_STEP),
        on_duty("b", "Bea", 2 * LINEUP_STEP),
    ];
    let batch = reorder_batch(&session(Role::Manager), &closers, &["a".to_string()]).unwrap();
    assert!(batch.is_empty());
}

#[tokio::test]
async fn test_reorder_moves_closer_to_front() {
    let store = Store::new();
    seed(&store, vec![], roster()).await;
    let manager = session(Role::Manager);

    let view = reorder_lineup(&store, &manager, &["c".to_string()]).await.unwrap();

    let uids: Vec<&str> = view.entries.iter().map(|e| e.uid.as_str()).collect();
    assert_eq!(uids, vec!["c", "a", "b"]);
    assert_eq!(store.get_closer("c").await.unwrap().lineup_order, 100);
    // Off-duty closers keep their slot relative to the others.
    assert_eq!(store.get_closer("d").await.unwrap().lineup_order, 200);
    assert_eq!(store.get_closer("a").await.unwrap().lineup_order, 300);
    // Other teams are untouched.
    assert_eq!(store.get_closer("x").await.unwrap().lineup_order, 10);

    let closer_view = team_lineup(&store, &closer_session("a")).await;
    assert_eq!(closer_view.entries[0].uid, "c");
}

#[test]
fn test_lineup_view_parses_back_from_json() {
    let leads = vec![busy_with("a", LeadStatus::InProcess)];
    let view = project(&closer_session("b"), &roster(), &leads);

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["entries"][0]["lineupOrder"], 100);

    let parsed: LineupView = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, view);
}
