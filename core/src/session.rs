use crate::credentials::{CredentialPair, CredentialStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    LoggedOut,
    LoggedIn,
}

impl SessionState {
    pub fn is_logged_in(self) -> bool {
        self == Self::LoggedIn
    }

    pub fn is_initializing(self) -> bool {
        self == Self::Initializing
    }
}

/// Area a front end should show after a session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Dashboard,
    Login,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Navigate { route: Route },
}

/// Owns the login/logout state machine and broadcasts it to observers.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    credentials: CredentialStore,
    state_tx: watch::Sender<SessionState>,
    events_tx: Mutex<Option<broadcast::Sender<SessionEvent>>>,
}

impl SessionController {
    pub fn new(credentials: CredentialStore) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Initializing);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                credentials,
                state_tx,
                events_tx: Mutex::new(Some(events_tx)),
            }),
        }
    }

    /// Inspects the persisted pair once and leaves `Initializing`.
    ///
    /// Later calls (or calls after `login`/`logout` already settled the
    /// state) return the current state unchanged.
    pub fn init(&self) -> SessionState {
        let restored = if self.inner.credentials.get().is_complete() {
            SessionState::LoggedIn
        } else {
            SessionState::LoggedOut
        };
        let changed = self.inner.state_tx.send_if_modified(|state| {
            if state.is_initializing() {
                *state = restored;
                true
            } else {
                false
            }
        });
        if changed {
            info!(state = ?restored, "session initialized from stored credentials");
        }
        self.state()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state().is_logged_in()
    }

    pub fn is_initializing(&self) -> bool {
        self.state().is_initializing()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Navigation events; the receiver closes once the controller is disposed.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        match self.inner.events_tx.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    pub fn login(&self, access_token: impl Into<String>, refresh_token: impl Into<String>) {
        let pair = CredentialPair::new(access_token, refresh_token);
        if let Err(err) = self.inner.credentials.set(pair) {
            warn!(%err, "failed to persist credentials; session kept in memory only");
        }
        self.transition(SessionState::LoggedIn, Route::Dashboard);
        info!("logged in");
    }

    pub fn logout(&self) {
        self.clear_session();
        info!("logged out");
    }

    /// Forced logout after an unrecoverable authorization failure.
    pub fn expire(&self, reason: &str) {
        self.clear_session();
        warn!(reason, "session expired; credentials cleared");
    }

    /// Closes the event channel. State stays queryable.
    pub fn dispose(&self) {
        self.inner.events_tx.lock().take();
    }

    fn clear_session(&self) {
        if let Err(err) = self.inner.credentials.clear() {
            warn!(%err, "failed to clear persisted credentials");
        }
        self.transition(SessionState::LoggedOut, Route::Login);
    }

    fn transition(&self, next: SessionState, route: Route) {
        self.inner.state_tx.send_replace(next);
        if let Some(tx) = self.inner.events_tx.lock().as_ref() {
            tx.send(SessionEvent::Navigate { route }).ok();
        }
    }
}
