use crate::harness::Harness;
use agentcanvas_core::{Route, SessionEvent, SessionState};

#[test]
fn login_survives_a_restart() {
    let harness = Harness::new();
    let first = harness.session();
    assert_eq!(first.state(), SessionState::LoggedOut);
    harness.log_in(&first);

    let restarted = harness.session();
    assert_eq!(restarted.state(), SessionState::LoggedIn);
    assert_eq!(restarted.credentials().get(), first.credentials().get());
}

#[test]
fn logout_clears_persisted_credentials() {
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    let mut events = session.events();

    session.logout();

    assert_eq!(
        events.try_recv().expect("event"),
        SessionEvent::Navigate { route: Route::Login }
    );
    assert!(!harness.store().get().is_complete());
    assert_eq!(harness.session().state(), SessionState::LoggedOut);
}

#[test]
fn partial_pair_on_disk_starts_logged_out() {
    let harness = Harness::new();
    let store = harness.store();
    store.set_access_token("orphan-access").expect("write");

    assert_eq!(harness.session().state(), SessionState::LoggedOut);
}

#[test]
fn observers_see_state_transitions() {
    let harness = Harness::new();
    let session = harness.session();
    let mut state = session.subscribe();
    assert_eq!(*state.borrow_and_update(), SessionState::LoggedOut);

    harness.log_in(&session);
    assert!(state.has_changed().expect("sender alive"));
    assert_eq!(*state.borrow_and_update(), SessionState::LoggedIn);

    session.expire("test");
    assert_eq!(*state.borrow_and_update(), SessionState::LoggedOut);
}
