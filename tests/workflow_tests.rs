
use chrono::Utc;
use leadflow::model::{DispatchType, DutyStatus, LeadStatus, Role, Session};
use leadflow::store::{LeadPatch, Precondition, Store, WriteBatch};
use leadflow::workflow::{closers, leads, NewCloser, NewLead};
use leadflow::LeadflowError;
use test_harness::{closer_session, minutes, session, OTHER_TEAM, TEAM};

async fn assign(store: &Store, id: uuid::Uuid, uid: &str) {
    let mut batch = WriteBatch::new();
    batch.update_lead(
        id,
        Precondition::Exists,
        LeadPatch::status(LeadStatus::InProcess).assign(uid, uid),
    );
    store.commit(batch).await.unwrap();
}

#[tokio::test]
async fn test_setter_creates_immediate_lead() {
    let store = Store::new();
    let setter = session(Role::Setter);

    let lead = leads::create_lead(&store, &setter, NewLead::immediate("  Ada  ")).await.unwrap();

    assert_eq!(lead.customer_name, "Ada");
    assert_eq!(lead.status, LeadStatus::WaitingAssignment);
    assert_eq!(lead.dispatch_type, DispatchType::Immediate);
    assert_eq!(lead.team_id, TEAM);
    assert_eq!(lead.setter_id.as_deref(), Some(setter.uid.as_str()));
    assert_eq!(lead.version, 1);
}

#[tokio::test]
async fn test_closer_cannot_create_lead() {
    let store = Store::new();
    let err = leads::create_lead(&store, &closer_session("a"), NewLead::immediate("Ada"))
        .await
        .unwrap_err();
    assert!(matches!(err, LeadflowError::Forbidden(_)));
}

#[tokio::test]
async fn test_create_lead_validates_input() {
    let store = Store::new();
    let setter = session(Role::Setter);

    let err = leads::create_lead(&store, &setter, NewLead::immediate("   ")).await.unwrap_err();
    assert!(matches!(err, LeadflowError::Validation(_)));

    let mut undated = NewLead::scheduled("Ada", Utc::now());
    undated.scheduled_appointment_time = None;
    let err = leads::create_lead(&store, &setter, undated).await.unwrap_err();
    assert!(matches!(err, LeadflowError::Validation(_)));

    let mut foreign = NewLead::immediate("Ada");
    foreign.team_id = Some(OTHER_TEAM.to_string());
    let err = leads::create_lead(&store, &setter, foreign).await.unwrap_err();
    assert!(matches!(err, LeadflowError::Forbidden(_)));
}

#[test]
fn test_new_lead_accepts_epoch_millis_appointment() {
    let json = r#"{"customerName":"Ada","dispatchType":"scheduled","scheduledAppointmentTime":1714575600000}"#;
    let new: NewLead = serde_json::from_str(json).unwrap();
    let at = new.scheduled_appointment_time.unwrap();
    assert_eq!(at.to_rfc3339(), "2024-05-01T15:00:00+00:00");

    let garbage = r#"{"customerName":"Ada","dispatchType":"scheduled","scheduledAppointmentTime":"next tuesday"}"#;
    let new: NewLead = serde_json::from_str(garbage).unwrap();
    assert!(new.scheduled_appointment_time.is_none());
}

#[tokio::test]
async fn test_verify_then_reschedule_resets_verification() {
    let store = Store::new();
    let setter = session(Role::Setter);
    let lead = leads::create_lead(&store, &setter, NewLead::scheduled("Ada", Utc::now() + minutes(120)))
        .await
        .unwrap();
    assert_eq!(lead.status, LeadStatus::Scheduled);
    assert!(!lead.setter_verified);

    let verified = leads::verify_appointment(&store, &setter, lead.id).await.unwrap();
    assert!(verified.setter_verified);
    assert_eq!(verified.version, 2);

    let at = Utc::now() + minutes(240);
    let moved = leads::reschedule(&store, &setter, lead.id, at).await.unwrap();
    assert_eq!(moved.status, LeadStatus::Rescheduled);
    assert!(!moved.setter_verified);
    assert_eq!(moved.scheduled_appointment_time, Some(at));
}

#[tokio::test]
async fn test_verify_rejects_non_scheduled_lead() {
    let store = Store::new();
    let setter = session(Role::Setter);
    let lead = leads::create_lead(&store, &setter, NewLead::immediate("Ada")).await.unwrap();

    let err = leads::verify_appointment(&store, &setter, lead.id).await.unwrap_err();
    assert!(matches!(err, LeadflowError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_expired_lead_can_be_rescheduled() {
    let store = Store::new();
    let setter = session(Role::Setter);
    let lead = leads::create_lead(&store, &setter, NewLead::scheduled("Ada", Utc::now() - minutes(30)))
        .await
        .unwrap();
    let mut batch = WriteBatch::new();
    batch.update_lead(lead.id, Precondition::Exists, LeadPatch::status(LeadStatus::Expired));
    store.commit(batch).await.unwrap();

    let moved = leads::reschedule(&store, &setter, lead.id, Utc::now() + minutes(60)).await.unwrap();
    assert_eq!(moved.status, LeadStatus::Rescheduled);
}

#[tokio::test]
async fn test_accept_and_disposition_by_assigned_closer() {
    let store = Store::new();
    let lead = leads::create_lead(&store, &session(Role::Setter), NewLead::immediate("Ada"))
        .await
        .unwrap();
    assign(&store, lead.id, "a").await;

    let other = closer_session("b");
    let err = leads::accept(&store, &other, lead.id).await.unwrap_err();
    assert!(matches!(err, LeadflowError::Forbidden(_)));

    let closer = closer_session("a");
    let accepted = leads::accept(&store, &closer, lead.id).await.unwrap();
    assert_eq!(accepted.status, LeadStatus::Accepted);

    let err = leads::record_disposition(&store, &closer, lead.id, LeadStatus::Canceled)
        .await
        .unwrap_err();
    assert!(matches!(err, LeadflowError::Validation(_)));

    let sold = leads::record_disposition(&store, &closer, lead.id, LeadStatus::Sold)
        .await
        .unwrap();
    assert_eq!(sold.status, LeadStatus::Sold);

    let err = leads::record_disposition(&store, &closer, lead.id, LeadStatus::NoSale)
        .await
        .unwrap_err();
    assert!(matches!(err, LeadflowError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_manager_records_disposition_for_closer() {
    let store = Store::new();
    let lead = leads::create_lead(&store, &session(Role::Setter), NewLead::immediate("Ada"))
        .await
        .unwrap();
    assign(&store, lead.id, "a").await;

    let lead = leads::record_disposition(&store, &session(Role::Manager), lead.id, LeadStatus::CreditFail)
        .await
        .unwrap();
    assert_eq!(lead.status, LeadStatus::CreditFail);
}

#[tokio::test]
async fn test_visibility_is_per_team_except_admin() {
    let store = Store::new();
    let lead = leads::create_lead(&store, &session(Role::Setter), NewLead::immediate("Ada"))
        .await
        .unwrap();
    let outsider = Session::new("s2", "South Setter", Role::Setter, OTHER_TEAM);

    assert!(leads::visible_leads(&store, &outsider, None).await.is_empty());
    assert!(matches!(
        leads::get_lead(&store, &outsider, lead.id).await,
        Err(LeadflowError::Forbidden(_))
    ));

    let admin = Session::new("root", "Root", Role::Admin, OTHER_TEAM);
    assert_eq!(leads::visible_leads(&store, &admin, None).await.len(), 1);
    assert_eq!(
        leads::visible_leads(&store, &admin, Some(LeadStatus::Sold)).await.len(),
        0
    );
}

#[tokio::test]
async fn test_only_admin_deletes() {
    let store = Store::new();
    let lead = leads::create_lead(&store, &session(Role::Setter), NewLead::immediate("Ada"))
        .await
        .unwrap();

    let err = leads::delete_lead(&store, &session(Role::Manager), lead.id).await.unwrap_err();
    assert!(matches!(err, LeadflowError::Forbidden(_)));

    leads::delete_lead(&store, &session(Role::Admin), lead.id).await.unwrap();
    assert_eq!(store.lead_count().await, 0);
}

#[tokio::test]
async fn test_register_closer_appends_to_lineup() {
    let store = Store::new();
    let manager = session(Role::Manager);

    let first = closers::register_closer(&store, &manager, NewCloser::new("a", "Ann")).await.unwrap();
    let mut second = NewCloser::new("b", "Bea");
    second.on_duty = true;
    let second = closers::register_closer(&store, &manager, second).await.unwrap();

    assert_eq!(first.lineup_order, 100);
    assert!(!first.is_on_duty());
    assert_eq!(second.lineup_order, 200);
    assert!(second.is_on_duty());

    let mut setter_in_rotation = NewCloser::new("s", "Sid");
    setter_in_rotation.role = Role::Setter;
    let err = closers::register_closer(&store, &manager, setter_in_rotation).await.unwrap_err();
    assert!(matches!(err, LeadflowError::Validation(_)));

    let err = closers::register_closer(&store, &closer_session("a"), NewCloser::new("c", "Cy"))
        .await
        .unwrap_err();
    assert!(matches!(err, LeadflowError::Forbidden(_)));
}

#[tokio::test]
async fn test_closer_toggles_own_duty_only() {
    let store = Store::new();
    let manager = session(Role::Manager);
    closers::register_closer(&store, &manager, NewCloser::new("a", "Ann")).await.unwrap();
    closers::register_closer(&store, &manager, NewCloser::new("b", "Bea")).await.unwrap();

    let ann = closers::set_duty(&store, &closer_session("a"), "a", DutyStatus::OnDuty)
        .await
        .unwrap();
    assert!(ann.is_on_duty());
    assert_eq!(ann.version, 2);

    // Unchanged status is not rewritten.
    let again = closers::set_duty(&store, &closer_session("a"), "a", DutyStatus::OnDuty)
        .await
        .unwrap();
    assert_eq!(again.version, 2);

    let err = closers::set_duty(&store, &closer_session("a"), "b", DutyStatus::OnDuty)
        .await
        .unwrap_err();
    assert!(matches!(err, LeadflowError::Forbidden(_)));

    let bea = closers::set_duty(&store, &manager, "b", DutyStatus::OnDuty).await.unwrap();
    assert!(bea.is_on_duty());

    let err = closers::set_duty(&store, &manager, "nobody", DutyStatus::OnDuty)
        .await
        .unwrap_err();
    assert!(matches!(err, LeadflowError::CloserNotFound(_)));
}

#[tokio::test]
async fn test_only_admin_creates_teams() {
    let store = Store::new();
    let err = closers::create_team(&store, &session(Role::Manager), "east", "East")
        .await
        .unwrap_err();
    assert!(matches!(err, LeadflowError::Forbidden(_)));

    let team = closers::create_team(&store, &session(Role::Admin), "east", "East").await.unwrap();
    assert_eq!(team.id, "east");
    assert!(closers::create_team(&store, &session(Role::Admin), "east", "East")
        .await
        .is_err());
}

#[tokio::test]
async fn test_get_team_checks_membership_and_existence() {
    let store = Store::new();
    closers::create_team(&store, &session(Role::Admin), TEAM, "North").await.unwrap();

    let team = closers::get_team(&store, &session(Role::Manager), TEAM).await.unwrap();
    assert_eq!(team.name, "North");

    let err = closers::get_team(&store, &session(Role::Manager), OTHER_TEAM).await.unwrap_err();
    assert!(matches!(err, LeadflowError::Forbidden(_)));

    let err = closers::get_team(&store, &session(Role::Admin), OTHER_TEAM).await.unwrap_err();
    assert!(matches!(err, LeadflowError::TeamNotFound(ref id) if id == OTHER_TEAM));
}

#[tokio::test]
async fn test_disposition_on_finished_lead_is_rejected() {
    let store = Store::new();
    let lead = leads::create_lead(&store, &session(Role::Setter), NewLead::immediate("Ada"))
        .await
        .unwrap();
    let mut batch = WriteBatch::new();
    batch.update_lead(lead.id, Precondition::Exists, LeadPatch::status(LeadStatus::Canceled));
    store.commit(batch).await.unwrap();

    let err = leads::record_disposition(&store, &session(Role::Manager), lead.id, LeadStatus::Sold)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LeadflowError::InvalidTransition {
            from: LeadStatus::Canceled,
            to: LeadStatus::Sold
        }
    ));
    assert_eq!(store.get_lead(&lead.id).await.unwrap().status, LeadStatus::Canceled);
}
