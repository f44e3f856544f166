//! Integration tests for the session authority actor.
//!
//! Drives the actor with scripted identity and store mocks and checks the
//! published snapshots: readiness, subject switching, stale fetch
//! suppression, idempotent changes and the refresh/update requests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use common::profile::ProfileUpdate;
use common::secret::ExposeSecret;
use sa_test_utils::{
    assert_eventually, profile, session, session_with_token, subject, wait_for_state,
    MockIdentityProvider, MockProfileStore, StateLog,
};
use session_authority::errors::{AuthorityError, IdentityError, ProfileStoreError};
use session_authority::identity::SessionChange;
use session_authority::observability::AuthorityMetrics;
use session_authority::{AuthState, ProfileState, SessionAuthority, SessionAuthorityHandle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

fn spawn(
    identity: &MockIdentityProvider,
    store: &MockProfileStore,
) -> (SessionAuthorityHandle, JoinHandle<()>) {
    SessionAuthority::spawn(
        Arc::new(identity.clone()),
        Arc::new(store.clone()),
        AuthorityMetrics::new(),
        CancellationToken::new(),
    )
}

fn is_loading_for(id: &'static str) -> impl FnMut(&AuthState) -> bool {
    move |state| {
        state.subject().map(|s| s.as_str()) == Some(id) && state.profile_state().is_loading()
    }
}

fn is_loaded_for(id: &'static str) -> impl FnMut(&AuthState) -> bool {
    move |state| state.profile().map(|p| p.id.as_str()) == Some(id)
}

/// A published profile always belongs to the published session.
fn assert_consistent(states: &[AuthState]) {
    for state in states {
        if let Some(profile) = state.profile() {
            assert_eq!(
                Some(&profile.id),
                state.subject(),
                "profile published for a different subject: {state:?}"
            );
        }
    }
}

// ============================================================================
// Restoration and readiness
// ============================================================================

#[tokio::test]
async fn test_restored_session_loads_profile() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));
    let gate = store.hold_next_fetch(&subject("u1"));

    let (handle, _task) = spawn(&identity, &store);

    let ready = wait_for_state(&handle, "ready", AuthState::is_ready).await;
    assert!(ready.is_authenticated());
    assert_eq!(ready.profile_state(), &ProfileState::Loading);
    assert!(handle.current_profile().is_none());

    gate.release();
    let settled = wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;

    assert_eq!(settled.profile(), Some(&profile("u1")));
    assert_eq!(handle.current_session().unwrap().subject().as_str(), "u1");
    assert_eq!(identity.restore_calls(), 1);
    assert_eq!(store.fetch_calls(), vec![subject("u1")]);
}

#[tokio::test]
async fn test_restoration_without_session_is_ready_and_signed_out() {
    let identity = MockIdentityProvider::new();
    let store = MockProfileStore::new();

    let (handle, _task) = spawn(&identity, &store);

    let state = handle.wait_until_ready().await.unwrap();
    assert!(matches!(state, AuthState::Unauthenticated));
    assert!(!handle.is_authenticated());
    assert_eq!(handle.profile_state(), ProfileState::Absent);
    assert!(store.fetch_calls().is_empty());
}

#[tokio::test]
async fn test_restoration_failure_is_treated_as_signed_out() {
    let identity =
        MockIdentityProvider::failing(IdentityError::Unavailable("offline".to_string()));
    let store = MockProfileStore::new();

    let (handle, _task) = spawn(&identity, &store);

    let state = handle.wait_until_ready().await.unwrap();
    assert!(matches!(state, AuthState::Unauthenticated));
    assert!(handle.is_ready());
}

#[tokio::test]
async fn test_requests_before_ready_are_rejected() {
    let (identity, restore) = MockIdentityProvider::held();
    let store = MockProfileStore::new().with_profile(profile("u1"));

    let (handle, _task) = spawn(&identity, &store);

    assert!(!handle.is_ready());
    assert!(handle.current_session().is_none());
    assert_eq!(
        handle.refresh_profile().await.unwrap_err(),
        AuthorityError::NotReady
    );
    assert_eq!(
        handle
            .update_profile(ProfileUpdate::new().bio("early"))
            .await
            .unwrap_err(),
        AuthorityError::NotReady
    );

    restore.resolve(Ok(Some(session("u1"))));
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;
    assert!(store.update_calls().is_empty());
}

#[tokio::test]
async fn test_ready_becomes_true_exactly_once() {
    let (identity, restore) = MockIdentityProvider::held();
    let store = MockProfileStore::new()
        .with_profile(profile("u1"))
        .with_profile(profile("u2"));

    let (handle, _task) = spawn(&identity, &store);
    let log = StateLog::record(handle.subscribe());

    restore.resolve(Ok(Some(session("u1"))));
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;

    identity.sign_out();
    wait_for_state(&handle, "signed out", |s| !s.is_authenticated()).await;
    identity.sign_in(session("u2"));
    wait_for_state(&handle, "u2 loaded", is_loaded_for("u2")).await;

    let states = log.states();
    let first_ready = states.iter().position(AuthState::is_ready).unwrap();
    assert!(
        states.iter().skip(first_ready).all(AuthState::is_ready),
        "readiness went back to false: {states:?}"
    );
    assert!(handle.is_ready());
    assert_consistent(&states);
}

#[tokio::test]
async fn test_changes_during_restoration_apply_after_it_in_order() {
    let (identity, restore) = MockIdentityProvider::held();
    let store = MockProfileStore::new().with_profile(profile("u2"));

    let (handle, _task) = spawn(&identity, &store);

    // Queued while restoration is pending.
    assert_eq!(identity.sign_out(), 1);
    assert_eq!(identity.sign_in(session("u2")), 1);

    restore.resolve(Ok(Some(session("u1"))));

    let state = wait_for_state(&handle, "u2 loaded", is_loaded_for("u2")).await;
    assert_eq!(state.subject().unwrap().as_str(), "u2");
    assert_eq!(handle.metrics().snapshot().session_changes, 2);
}

// ============================================================================
// Subject switching and stale fetches
// ============================================================================

#[tokio::test]
async fn test_sign_out_drops_profile_immediately() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;

    identity.sign_out();
    let state = wait_for_state(&handle, "signed out", |s| !s.is_authenticated()).await;

    assert!(matches!(state, AuthState::Unauthenticated));
    assert!(handle.current_session().is_none());
    assert!(handle.current_profile().is_none());
    assert_eq!(handle.profile_state(), ProfileState::Absent);
}

#[tokio::test]
async fn test_fetch_completing_after_sign_out_is_discarded() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));
    let gate = store.hold_next_fetch(&subject("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loading", is_loading_for("u1")).await;

    identity.sign_out();
    wait_for_state(&handle, "signed out", |s| !s.is_authenticated()).await;

    gate.release();
    assert_eventually("stale fetch discarded", || {
        handle.metrics().stale_discarded() == 1
    })
    .await;

    assert!(matches!(handle.state(), AuthState::Unauthenticated));
    assert!(handle.current_profile().is_none());
}

#[tokio::test]
async fn test_fetch_for_previous_subject_never_overwrites_current() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new()
        .with_profile(profile("u1"))
        .with_profile(profile("u2"));
    let gate = store.hold_next_fetch(&subject("u1"));

    let (handle, _task) = spawn(&identity, &store);
    let log = StateLog::record(handle.subscribe());
    wait_for_state(&handle, "u1 loading", is_loading_for("u1")).await;

    identity.sign_in(session("u2"));
    wait_for_state(&handle, "u2 loaded", is_loaded_for("u2")).await;

    gate.release();
    assert_eventually("stale fetch discarded", || {
        handle.metrics().stale_discarded() == 1
    })
    .await;

    assert_eq!(handle.current_profile(), Some(profile("u2")));
    assert_eq!(handle.current_session().unwrap().subject().as_str(), "u2");
    assert_consistent(&log.states());
}

#[tokio::test]
async fn test_failed_fetch_for_previous_subject_never_overwrites_current() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new()
        .with_profile(profile("u1"))
        .with_profile(profile("u2"));
    store.fail_fetch(
        &subject("u1"),
        ProfileStoreError::Unavailable("503".to_string()),
    );
    let gate = store.hold_next_fetch(&subject("u1"));

    let (handle, _task) = spawn(&identity, &store);
    let log = StateLog::record(handle.subscribe());
    wait_for_state(&handle, "u1 loading", is_loading_for("u1")).await;

    identity.sign_in(session("u2"));
    wait_for_state(&handle, "u2 loaded", is_loaded_for("u2")).await;

    gate.release();
    assert_eventually("stale failure discarded", || {
        handle.metrics().stale_discarded() == 1
    })
    .await;

    assert_eq!(
        handle.state().profile_state(),
        &ProfileState::Loaded(profile("u2"))
    );
    assert_eq!(handle.current_session().unwrap().subject().as_str(), "u2");
    assert!(log
        .states()
        .iter()
        .all(|s| !matches!(s.profile_state(), ProfileState::FetchFailed(_))));
    assert_consistent(&log.states());
}

#[tokio::test]
async fn test_rapid_subject_changes_settle_on_last_subject() {
    let identity = MockIdentityProvider::new();
    let store = MockProfileStore::new()
        .with_profile(profile("u1"))
        .with_profile(profile("u2"));
    let gate = store.hold_next_fetch(&subject("u1"));

    let (handle, _task) = spawn(&identity, &store);
    handle.wait_until_ready().await.unwrap();
    let log = StateLog::record(handle.subscribe());

    identity.sign_in(session("u1"));
    identity.sign_in(session("u2"));

    wait_for_state(&handle, "u2 loaded", is_loaded_for("u2")).await;
    gate.release();
    assert_eventually("stale fetch discarded", || {
        handle.metrics().stale_discarded() == 1
    })
    .await;

    assert_eq!(handle.current_profile(), Some(profile("u2")));
    assert_eq!(store.fetch_count(&subject("u1")), 1);
    assert_eq!(store.fetch_count(&subject("u2")), 1);
    let states = log.states();
    assert!(states
        .iter()
        .all(|s| s.profile().map_or(true, |p| p.id == subject("u2"))));
}

#[tokio::test]
async fn test_sign_out_and_back_in_ignores_first_fetch() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));
    let first = store.hold_next_fetch(&subject("u1"));
    let second = store.hold_next_fetch(&subject("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loading", is_loading_for("u1")).await;

    identity.sign_out();
    identity.sign_in(session("u1"));
    assert_eventually("second fetch started", || store.fetch_count(&subject("u1")) == 2).await;

    // First fetch finishes while the second is still held.
    first.release();
    assert_eventually("first fetch discarded", || {
        handle.metrics().stale_discarded() == 1
    })
    .await;
    assert_eq!(handle.profile_state(), ProfileState::Loading);

    second.release();
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;
}

// ============================================================================
// Idempotent changes
// ============================================================================

#[tokio::test]
async fn test_token_refresh_for_same_subject_keeps_profile() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;

    identity.refresh(session_with_token("u1", "access-rotated"));
    assert_eventually("refresh applied", || {
        handle
            .current_session()
            .is_some_and(|s| s.access_token().expose_secret() == "access-rotated")
    })
    .await;

    assert_eq!(handle.current_profile(), Some(profile("u1")));
    assert_eq!(store.fetch_count(&subject("u1")), 1);
    assert_eq!(handle.metrics().fetches_started(), 1);
}

#[tokio::test]
async fn test_repeated_sign_in_while_loading_starts_one_fetch() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));
    let gate = store.hold_next_fetch(&subject("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loading", is_loading_for("u1")).await;

    identity.emit(SessionChange::signed_in(session("u1")));
    assert_eventually("change applied", || {
        handle.metrics().snapshot().session_changes == 1
    })
    .await;
    assert_eq!(handle.profile_state(), ProfileState::Loading);

    gate.release();
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;
    assert_eq!(store.fetch_count(&subject("u1")), 1);
    assert_eq!(handle.metrics().stale_discarded(), 0);
}

#[tokio::test]
async fn test_failed_fetch_is_retried_on_next_change_for_subject() {
    let identity = MockIdentityProvider::with_session(session("u2"));
    let store = MockProfileStore::new();
    store.fail_fetch(
        &subject("u2"),
        ProfileStoreError::Unavailable("503".to_string()),
    );

    let (handle, _task) = spawn(&identity, &store);
    let state = handle.wait_for_profile_settled().await.unwrap();
    assert_eq!(
        state.profile_state(),
        &ProfileState::FetchFailed(ProfileStoreError::Unavailable("503".to_string()))
    );
    assert!(handle.is_authenticated());

    store.clear_fetch_failure(&subject("u2"));
    store.insert_profile(profile("u2"));
    identity.sign_in(session("u2"));

    wait_for_state(&handle, "u2 loaded", is_loaded_for("u2")).await;
    assert_eq!(store.fetch_count(&subject("u2")), 2);
}

#[tokio::test]
async fn test_missing_profile_is_fetch_failed() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new();

    let (handle, _task) = spawn(&identity, &store);
    let state = handle.wait_for_profile_settled().await.unwrap();

    assert_eq!(
        state.profile_state(),
        &ProfileState::FetchFailed(ProfileStoreError::NotFound("u1".to_string()))
    );
    assert!(handle.current_profile().is_none());
}

// ============================================================================
// Refresh and update
// ============================================================================

#[tokio::test]
async fn test_refresh_profile_reloads_current_subject() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;

    let mut changed = profile("u1");
    changed.bio = Some("new bio".to_string());
    store.insert_profile(changed.clone());

    handle.refresh_profile().await.unwrap();
    let state = wait_for_state(&handle, "refreshed", |s| {
        s.profile().is_some_and(|p| p.bio.is_some())
    })
    .await;

    assert_eq!(state.profile(), Some(&changed));
    assert_eq!(store.fetch_count(&subject("u1")), 2);
}

#[tokio::test]
async fn test_refresh_profile_requires_session() {
    let identity = MockIdentityProvider::new();
    let store = MockProfileStore::new();

    let (handle, _task) = spawn(&identity, &store);
    handle.wait_until_ready().await.unwrap();

    assert_eq!(
        handle.refresh_profile().await.unwrap_err(),
        AuthorityError::NotAuthenticated
    );
    assert_eq!(
        handle
            .update_profile(ProfileUpdate::new().bio("x"))
            .await
            .unwrap_err(),
        AuthorityError::NotAuthenticated
    );
}

#[tokio::test]
async fn test_update_profile_publishes_stored_result() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;

    let updated = handle
        .update_profile(ProfileUpdate::new().username("dancer").bio("hello"))
        .await
        .unwrap();

    assert_eq!(updated.username.as_deref(), Some("dancer"));
    assert_eq!(handle.current_profile(), Some(updated.clone()));
    assert_eq!(store.stored_profile(&subject("u1")), Some(updated));
    assert_eq!(handle.metrics().snapshot().updates_committed, 1);
}

#[tokio::test]
async fn test_update_failure_leaves_state_unchanged() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;
    store.fail_update(ProfileStoreError::Unauthorized("row policy".to_string()));

    let err = handle
        .update_profile(ProfileUpdate::new().bio("nope"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AuthorityError::Store(ProfileStoreError::Unauthorized("row policy".to_string()))
    );
    assert_eq!(handle.current_profile(), Some(profile("u1")));
}

#[tokio::test]
async fn test_empty_update_is_rejected_without_store_call() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;

    let err = handle.update_profile(ProfileUpdate::new()).await.unwrap_err();

    assert_eq!(err, AuthorityError::Store(ProfileStoreError::EmptyUpdate));
    assert!(store.update_calls().is_empty());
}

#[tokio::test]
async fn test_update_completing_after_subject_change_is_rejected() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new()
        .with_profile(profile("u1"))
        .with_profile(profile("u2"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;

    let gate = store.hold_next_update();
    let updater = handle.clone();
    let pending =
        tokio::spawn(async move { updater.update_profile(ProfileUpdate::new().bio("late")).await });
    assert_eventually("update started", || store.update_calls().len() == 1).await;

    identity.sign_in(session("u2"));
    wait_for_state(&handle, "u2 loaded", is_loaded_for("u2")).await;

    gate.release();
    let result = pending.await.unwrap();

    assert_eq!(result.unwrap_err(), AuthorityError::SessionChanged);
    assert_eq!(handle.current_profile(), Some(profile("u2")));
    assert_eq!(handle.metrics().stale_discarded(), 1);
}

#[tokio::test]
async fn test_update_supersedes_fetch_in_flight() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;

    let gate = store.hold_next_fetch(&subject("u1"));
    handle.refresh_profile().await.unwrap();
    wait_for_state(&handle, "u1 loading", is_loading_for("u1")).await;

    let updated = handle
        .update_profile(ProfileUpdate::new().username("fresh"))
        .await
        .unwrap();
    assert_eq!(handle.current_profile(), Some(updated.clone()));

    gate.release();
    assert_eventually("superseded fetch discarded", || {
        handle.metrics().stale_discarded() == 1
    })
    .await;
    assert_eq!(handle.current_profile(), Some(updated));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_authority_stops_on_cancel() {
    let identity = MockIdentityProvider::new();
    let store = MockProfileStore::new();

    let (handle, task) = spawn(&identity, &store);
    handle.wait_until_ready().await.unwrap();

    handle.cancel();
    assert!(handle.is_cancelled());
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("authority should stop after cancel")
        .unwrap();

    assert!(matches!(
        handle.refresh_profile().await,
        Err(AuthorityError::Internal(_))
    ));
}

#[tokio::test]
async fn test_authority_stops_when_handles_dropped() {
    let identity = MockIdentityProvider::new();
    let store = MockProfileStore::new();

    let (handle, task) = spawn(&identity, &store);
    handle.wait_until_ready().await.unwrap();
    drop(handle);

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("authority should stop once handles are gone")
        .unwrap();
}

#[tokio::test]
async fn test_closed_subscription_keeps_serving_requests() {
    let identity = MockIdentityProvider::with_session(session("u1"));
    let store = MockProfileStore::new().with_profile(profile("u1"));

    let (handle, _task) = spawn(&identity, &store);
    wait_for_state(&handle, "u1 loaded", is_loaded_for("u1")).await;

    identity.close_subscriptions();
    assert_eq!(identity.sign_out(), 0);

    let updated = handle
        .update_profile(ProfileUpdate::new().bio("still here"))
        .await
        .unwrap();
    assert_eq!(handle.current_profile(), Some(updated));
    assert!(handle.is_authenticated());
}
