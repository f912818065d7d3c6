use crate::harness::{test_runtime, Harness};
use agentcanvas_core::{MockRoute, RefreshPolicy, Route, SessionEvent, SessionState, SyncError};
use std::time::Duration;

#[test]
fn expired_access_token_is_refreshed_transparently() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    let sync = harness.project_sync(&session);
    let before = harness.store().get();

    harness.backend.expire_access_tokens();
    let projects = runtime.block_on(sync.list_projects()).expect("list");

    assert!(projects.is_empty());
    assert_eq!(harness.backend.hits(MockRoute::Refresh), 1);
    assert_eq!(harness.backend.hits(MockRoute::ListProjects), 2);
    assert_eq!(session.state(), SessionState::LoggedIn);
    let after = harness.store().get();
    assert_ne!(after.access_token, before.access_token);
    assert_eq!(after.refresh_token, before.refresh_token);
}

#[test]
fn revoked_refresh_token_forces_logout() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    let sync = harness.project_sync(&session);
    let mut events = session.events();

    harness.backend.expire_access_tokens();
    harness.backend.revoke_refresh_tokens();
    let err = runtime.block_on(sync.list_projects()).unwrap_err();

    assert!(matches!(err, SyncError::SessionExpired { .. }));
    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(!harness.store().get().is_complete());
    assert_eq!(
        events.try_recv().expect("navigation"),
        SessionEvent::Navigate { route: Route::Login }
    );
    assert_eq!(harness.backend.hits(MockRoute::ListProjects), 1);
}

#[test]
fn rotated_refresh_token_is_kept_for_the_next_restart() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    harness.backend.set_refresh_rotation(true);
    let original = harness.store().get();

    harness.backend.expire_access_tokens();
    runtime
        .block_on(harness.project_sync(&session).list_projects())
        .expect("list");

    let restarted = harness.session();
    assert_eq!(restarted.state(), SessionState::LoggedIn);
    assert_ne!(restarted.credentials().get().refresh_token, original.refresh_token);

    harness.backend.expire_access_tokens();
    runtime
        .block_on(harness.project_sync(&restarted).list_projects())
        .expect("list after restart");
    assert_eq!(harness.backend.hits(MockRoute::Refresh), 2);
}

fn concurrent_refreshes(policy: RefreshPolicy) -> usize {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("runtime");
    let harness = Harness::with_policy(policy);
    let session = harness.session();
    harness.log_in(&session);
    let fetcher = harness.fetcher(&session);
    let url = harness.api.projects_url().expect("projects url");

    harness.backend.set_latency(Duration::from_millis(10));
    harness.backend.expire_access_tokens();
    runtime.block_on(async {
        let requests = (0..4).map(|_| {
            let fetcher = fetcher.clone();
            let url = url.clone();
            tokio::spawn(async move { fetcher.get_json::<serde_json::Value>(url).await })
        });
        for outcome in futures::future::join_all(requests).await {
            outcome.expect("join").expect("request");
        }
    });
    harness.backend.hits(MockRoute::Refresh)
}

#[test]
fn single_flight_coalesces_concurrent_refreshes() {
    assert_eq!(concurrent_refreshes(RefreshPolicy::SingleFlight), 1);
}

#[test]
fn independent_policy_refreshes_per_request() {
    assert_eq!(concurrent_refreshes(RefreshPolicy::Independent), 4);
}
