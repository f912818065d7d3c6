use agentcanvas::{CliSettings, Client, Scope};
use agentcanvas_core::{
    ApiSettings, AuthenticatedFetcher, ClientSettings, CredentialStore, MockBackend, ProjectSync,
    RefreshPolicy, SessionController,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

pub const EMAIL: &str = "ada@example.com";
pub const PASSWORD: &str = "analytical-engine";

pub fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

/// A mock backend plus a scratch directory standing in for the user's
/// credential and settings locations. Everything built from one harness
/// shares both, so a second session or client behaves like a restart.
pub struct Harness {
    pub backend: MockBackend,
    pub api: ApiSettings,
    dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(RefreshPolicy::default())
    }

    pub fn with_policy(policy: RefreshPolicy) -> Self {
        let api = ApiSettings {
            refresh_policy: policy,
            ..ApiSettings::default()
        };
        Self {
            backend: MockBackend::new(&api),
            api,
            dir: TempDir::new().expect("temp dir"),
        }
    }

    pub fn credentials_dir(&self) -> PathBuf {
        self.dir.path().join("credentials")
    }

    pub fn store(&self) -> CredentialStore {
        CredentialStore::new(self.credentials_dir())
    }

    /// A fresh, initialized session over the persisted credentials.
    pub fn session(&self) -> SessionController {
        let session = SessionController::new(self.store());
        session.init();
        session
    }

    /// Registers the default user on the backend and logs `session` in.
    pub fn log_in(&self, session: &SessionController) {
        let pair = self.backend.register_user(EMAIL, PASSWORD);
        let (access, refresh) = pair.tokens().expect("complete pair");
        session.login(access, refresh);
    }

    pub fn fetcher(&self, session: &SessionController) -> AuthenticatedFetcher {
        AuthenticatedFetcher::new(
            Arc::new(self.backend.clone()),
            session.clone(),
            self.api.refresh_url().expect("refresh url"),
        )
        .with_policy(self.api.refresh_policy)
    }

    pub fn project_sync(&self, session: &SessionController) -> ProjectSync {
        ProjectSync::new(
            self.fetcher(session),
            self.api.projects_url().expect("projects url"),
        )
    }

    pub fn scope(&self) -> Scope {
        Scope::Dir(self.dir.path().join("cli"))
    }

    /// Builds a CLI client the way `main` does, but on the mock backend.
    pub fn client(&self, cli: CliSettings) -> Client {
        let settings = ClientSettings {
            api: self.api.clone(),
            credentials_dir: self.credentials_dir(),
        };
        Client::new(
            &settings,
            Arc::new(self.backend.clone()),
            self.store(),
            self.scope(),
            cli,
        )
        .expect("client")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
