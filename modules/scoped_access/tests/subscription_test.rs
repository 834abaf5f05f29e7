mod common;

use std::sync::Arc;

use query_core::Constraint;
use serde_json::json;

use common::{record, Call, RecordingBackend};
use scoped_access::contract::model::{Entity, ResultSet, Role, UserProfile};
use scoped_access::domain::policy::PolicyTable;
use scoped_access::domain::subscription::{Phase, ScopedSubscription};
use scoped_access::infra::MemoryBackend;

fn subscription(backend: &RecordingBackend, entity: Entity) -> ScopedSubscription {
    ScopedSubscription::new(
        entity,
        Arc::new(backend.clone()),
        PolicyTable::default().get(entity),
    )
}

fn counsellor(uid: &str, branch: &str) -> UserProfile {
    UserProfile::new(uid, Role::Counsellor).with_branch(branch)
}

#[test]
fn starts_idle_without_backend_activity() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Enquiries);

    assert_eq!(sub.phase(), Phase::Idle);
    assert_eq!(sub.snapshot(), ResultSet::idle());

    sub.set_profile(None);
    assert_eq!(sub.phase(), Phase::Idle);
    assert!(backend.calls().is_empty());
}

#[test]
fn counsellor_enquiries_subscribe_with_assigned_and_branch_filters() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Enquiries);

    sub.set_profile(Some(&counsellor("U1", "B1")));

    let subs = backend.subscribe_calls();
    assert_eq!(subs.len(), 1);
    let (id, query) = &subs[0];
    assert_eq!(query.collection, "enquiries");
    assert_eq!(
        query.constraints,
        vec![
            Constraint::eq("assignedCounsellorId", "U1"),
            Constraint::eq("branchId", "B1"),
        ]
    );

    let state = sub.snapshot();
    assert!(state.loading);
    assert!(state.data.is_empty());
    assert_eq!(sub.phase(), Phase::Loading);

    backend.emit(
        *id,
        vec![record("e1", json!({"assignedCounsellorId": "U1", "branchId": "B1"}))],
    );
    let state = sub.snapshot();
    assert_eq!(sub.phase(), Phase::Live);
    assert!(!state.loading);
    assert_eq!(state.data.len(), 1);
    assert_eq!(state.data[0].id, "e1");
}

#[test]
fn snapshots_replace_data_wholesale() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Payments);
    sub.set_profile(Some(&UserProfile::new("S", Role::SuperAdmin)));
    let id = backend.last_id().unwrap();

    backend.emit(id, vec![record("p1", json!({})), record("p2", json!({}))]);
    backend.emit(id, vec![record("p3", json!({}))]);

    let ids: Vec<_> = sub.snapshot().data.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["p3"]);
}

#[test]
fn branch_admin_without_branch_stays_idle() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Payments);

    sub.set_profile(Some(&UserProfile::new("A", Role::BranchAdmin)));

    assert_eq!(sub.phase(), Phase::Idle);
    assert_eq!(sub.snapshot(), ResultSet::idle());
    assert!(backend.subscribe_calls().is_empty());
    assert!(sub.decision().unwrap().is_denied());
}

#[test]
fn teardown_precedes_next_subscribe_on_profile_change() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Applications);

    sub.set_profile(Some(&counsellor("U1", "B1")));
    let first = backend.last_id().unwrap();
    sub.set_profile(Some(&counsellor("U2", "B2")));
    let second = backend.last_id().unwrap();
    assert_ne!(first, second);

    let torn_down = backend.seq_of_unsubscribe(first).expect("first handle torn down");
    let resubscribed = backend.seq_of_subscribe(second).unwrap();
    assert!(torn_down < resubscribed);
    assert_eq!(backend.active(), vec![second]);
}

#[test]
fn unchanged_scope_does_not_resubscribe() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Payments);
    let p = UserProfile::new("S", Role::SuperAdmin);

    sub.set_profile(Some(&p));
    sub.set_profile(Some(&p.clone()));

    assert_eq!(backend.subscribe_calls().len(), 1);
    assert!(!backend
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Unsubscribe { .. })));
}

#[test]
fn same_constraints_for_a_different_principal_resubscribe() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Payments);

    sub.set_profile(Some(&UserProfile::new("S1", Role::SuperAdmin)));
    sub.set_profile(Some(&UserProfile::new("S2", Role::SuperAdmin)));

    assert_eq!(backend.subscribe_calls().len(), 2);
}

#[test]
fn profile_change_resets_data_before_new_snapshot() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Enquiries);

    sub.set_profile(Some(&counsellor("U1", "B1")));
    backend.emit(backend.last_id().unwrap(), vec![record("e1", json!({}))]);
    assert_eq!(sub.snapshot().data.len(), 1);

    let mut rx = sub.watch();
    sub.set_profile(Some(&counsellor("U2", "B1")));

    let state = rx.borrow_and_update().clone();
    assert!(state.loading);
    assert!(state.data.is_empty());
}

#[test]
fn callbacks_from_torn_down_handle_are_ignored() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Payments);

    sub.set_profile(Some(&UserProfile::new("S", Role::SuperAdmin)));
    let old = backend.last_id().unwrap();
    sub.set_profile(Some(
        &UserProfile::new("A", Role::BranchAdmin).with_branch("B1"),
    ));
    let new = backend.last_id().unwrap();

    backend.fail(old, "permission denied");
    backend.emit(old, vec![record("stale", json!({}))]);

    let state = sub.snapshot();
    assert!(state.loading);
    assert!(state.error.is_none());
    assert!(state.data.is_empty());

    backend.emit(new, vec![record("p1", json!({"branchId": "B1"}))]);
    assert_eq!(sub.snapshot().data[0].id, "p1");
}

#[test]
fn callbacks_after_close_are_ignored() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Payments);

    sub.set_profile(Some(&UserProfile::new("S", Role::SuperAdmin)));
    let id = backend.last_id().unwrap();
    backend.emit(id, vec![record("p1", json!({}))]);
    sub.close();

    backend.fail(id, "permission denied");
    backend.emit(id, vec![record("late", json!({}))]);

    assert_eq!(sub.phase(), Phase::Live);
    let state = sub.snapshot();
    assert!(state.error.is_none());
    assert_eq!(state.data.len(), 1);
    assert_eq!(state.data[0].id, "p1");
}

#[test]
fn error_is_terminal_until_refresh() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Assessments);
    sub.set_profile(Some(&counsellor("U1", "B1")));
    let id = backend.last_id().unwrap();
    backend.emit(id, vec![record("a1", json!({}))]);

    backend.fail(id, "quota exceeded");
    let state = sub.snapshot();
    assert_eq!(sub.phase(), Phase::Errored);
    assert!(!state.loading);
    assert!(state.data.is_empty());
    assert_eq!(state.error.unwrap().message, "quota exceeded");

    // same handle keeps talking: ignored
    backend.emit(id, vec![record("a2", json!({}))]);
    assert!(sub.snapshot().error.is_some());
    assert_eq!(backend.subscribe_calls().len(), 1);

    sub.refresh();
    let retry = backend.last_id().unwrap();
    assert_ne!(retry, id);
    assert!(backend.seq_of_unsubscribe(id).unwrap() < backend.seq_of_subscribe(retry).unwrap());
    assert_eq!(sub.snapshot(), ResultSet::loading());

    backend.emit(retry, vec![record("a1", json!({}))]);
    assert_eq!(sub.phase(), Phase::Live);
}

#[test]
fn losing_the_profile_tears_down_and_goes_idle() {
    let backend = RecordingBackend::new();
    let sub = subscription(&backend, Entity::Payments);
    sub.set_profile(Some(&UserProfile::new("S", Role::SuperAdmin)));
    let id = backend.last_id().unwrap();
    backend.emit(id, vec![record("p1", json!({}))]);

    sub.set_profile(None);

    assert_eq!(sub.phase(), Phase::Idle);
    assert_eq!(sub.snapshot(), ResultSet::idle());
    assert!(backend.active().is_empty());
    assert_eq!(backend.subscribe_calls().len(), 1);
}

#[test]
fn close_and_drop_release_the_handle() {
    let backend = RecordingBackend::new();
    {
        let sub = subscription(&backend, Entity::Payments);
        sub.set_profile(Some(&UserProfile::new("S", Role::SuperAdmin)));
        assert_eq!(backend.active().len(), 1);
    }
    assert!(backend.active().is_empty());

    let sub = subscription(&backend, Entity::Payments);
    sub.set_profile(Some(&UserProfile::new("S", Role::SuperAdmin)));
    sub.close();
    assert!(backend.active().is_empty());
    drop(sub);
    assert_eq!(
        backend
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Unsubscribe { .. }))
            .count(),
        2
    );
}

#[test]
fn synchronous_first_snapshot_goes_live_immediately() {
    let backend = MemoryBackend::new();
    backend.seed(
        "payments",
        "p1",
        common::doc(json!({"branchId": "B1", "amount": 100})),
    );
    backend.seed("payments", "p2", common::doc(json!({"branchId": "B2"})));

    let sub = ScopedSubscription::new(
        Entity::Payments,
        Arc::new(backend.clone()),
        PolicyTable::default().get(Entity::Payments),
    );
    sub.set_profile(Some(
        &UserProfile::new("R", Role::Reception).with_branch("B1"),
    ));

    assert_eq!(sub.phase(), Phase::Live);
    let ids: Vec<_> = sub.snapshot().data.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["p1"]);

    backend.seed("payments", "p3", common::doc(json!({"branchId": "B1"})));
    assert_eq!(sub.snapshot().data.len(), 2);
}
