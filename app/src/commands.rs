use crate::config::{save_cli_settings, CliSettings, Scope};
use agentcanvas_core::{
    AccountClient, AuthenticatedFetcher, ClientSettings, Connection, CredentialStore,
    EdgeChange, GraphModel, HttpTransport, NodeChange, Position, ProjectRecord, ProjectSync,
    Route, SessionController, SessionEvent, SyncError,
};
use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info};

/// Everything one CLI invocation needs: the session, the account endpoints
/// and a project sync bound to the authenticated fetcher.
pub struct Client {
    scope: Scope,
    cli: CliSettings,
    session: SessionController,
    accounts: AccountClient,
    sync: ProjectSync,
    navigation: broadcast::Receiver<SessionEvent>,
}

impl Client {
    pub fn new(
        settings: &ClientSettings,
        transport: Arc<dyn HttpTransport>,
        credentials: CredentialStore,
        scope: Scope,
        cli: CliSettings,
    ) -> Result<Self> {
        let api = &settings.api;
        let session = SessionController::new(credentials);
        let navigation = session.events();
        session.init();

        let accounts = AccountClient::new(
            transport.clone(),
            api.signup_url().map_err(config_error)?,
            api.login_url().map_err(config_error)?,
        );
        let fetcher = AuthenticatedFetcher::new(
            transport,
            session.clone(),
            api.refresh_url().map_err(config_error)?,
        )
        .with_policy(api.refresh_policy);
        let sync = ProjectSync::new(fetcher, api.projects_url().map_err(config_error)?);

        Ok(Self {
            scope,
            cli,
            session,
            accounts,
            sync,
            navigation,
        })
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn cli_settings(&self) -> &CliSettings {
        &self.cli
    }

    pub fn model(&self) -> &GraphModel {
        self.sync.model()
    }

    pub async fn signup(&mut self, email: &str, password: &str) -> Result<String> {
        let pair = self
            .accounts
            .signup(email, password)
            .await
            .map_err(|err| self.failure(err))?;
        self.start_session(pair.access_token, pair.refresh_token)?;
        Ok(format!("Account created. Logged in as {email}."))
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<String> {
        let pair = self
            .accounts
            .obtain_tokens(email, password)
            .await
            .map_err(|err| self.failure(err))?;
        self.start_session(pair.access_token, pair.refresh_token)?;
        Ok(format!("Logged in as {email}."))
    }

    pub fn logout(&mut self) -> String {
        if !self.session.is_logged_in() {
            return "Already logged out.".to_string();
        }
        self.session.logout();
        self.drain_navigation();
        "Logged out.".to_string()
    }

    pub fn status(&self) -> String {
        let state = if self.session.is_logged_in() {
            "logged in"
        } else {
            "logged out"
        };
        match &self.cli.current_project {
            Some(project) => format!("Session: {state}\nCurrent project: {project}"),
            None => format!("Session: {state}\nCurrent project: none"),
        }
    }

    pub async fn list_projects(&mut self) -> Result<String> {
        self.require_login()?;
        let projects = self
            .sync
            .list_projects()
            .await
            .map_err(|err| self.failure(err))?;
        if projects.is_empty() {
            return Ok(
                "No projects yet. Create one with `agentcanvas projects create`.".to_string(),
            );
        }
        let current = self.cli.current_project.as_deref();
        let lines: Vec<String> = projects
            .iter()
            .map(|project| {
                let marker = if current == Some(project.id.as_str()) { '*' } else { ' ' };
                format!("{marker} {}", describe_project(project))
            })
            .collect();
        Ok(lines.join("\n"))
    }

    pub async fn create_project(&mut self, name: &str, description: &str) -> Result<String> {
        self.require_login()?;
        let project = self
            .sync
            .create_project(name, description)
            .await
            .map_err(|err| self.failure(err))?;
        self.cli.remember_project(&project.id);
        self.persist_cli().await?;
        Ok(format!("Created {}", describe_project(&project)))
    }

    pub async fn use_project(&mut self, project_id: &str) -> Result<String> {
        self.require_login()?;
        match self.sync.fetch_project(project_id).await {
            Ok(project) => {
                self.cli.remember_project(&project.id);
                self.persist_cli().await?;
                Ok(format!("Using {}", describe_project(&project)))
            }
            Err(err) if err.status() == Some(404) => {
                self.cli.forget_project(project_id);
                self.persist_cli().await?;
                Err(self.failure(err))
            }
            Err(err) => Err(self.failure(err)),
        }
    }

    pub async fn show_graph(&mut self, as_json: bool) -> Result<String> {
        self.open_current().await?;
        let model = self.sync.model();
        if as_json {
            return Ok(serde_json::to_string_pretty(&model.snapshot())?);
        }
        Ok(render_graph(model))
    }

    pub async fn add_node(&mut self, label: &str, position: Option<Position>) -> Result<String> {
        self.open_current().await?;
        let model = self.sync.model_mut();
        let node = match position {
            Some(position) => model.add_node_at(label, position),
            None => model.add_node(label),
        };
        let id = node.id.clone();
        self.save().await?;
        Ok(format!("Added node {id}."))
    }

    pub async fn connect(&mut self, source: &str, target: &str) -> Result<String> {
        self.open_current().await?;
        let edge = self
            .sync
            .model_mut()
            .connect(Connection::new(source, target))
            .map_err(|rejection| anyhow!("cannot connect: {rejection}"))?;
        let id = edge.id.clone();
        self.save().await?;
        Ok(format!("Added edge {id}."))
    }

    pub async fn move_node(&mut self, node_id: &str, position: Position) -> Result<String> {
        self.open_current().await?;
        let applied = self.sync.model_mut().apply_node_changes([NodeChange::Position {
            id: node_id.to_string(),
            position: Some(position),
        }]);
        if applied == 0 {
            bail!("no node `{node_id}` in this project");
        }
        self.save().await?;
        Ok(format!("Moved {node_id} to ({}, {}).", position.x, position.y))
    }

    /// Removes a node (with its edges) or, failing that, an edge by id.
    pub async fn remove(&mut self, id: &str) -> Result<String> {
        self.open_current().await?;
        let model = self.sync.model_mut();
        let message = if model.contains_node(id) {
            let edges_before = model.edges().len();
            model.apply_node_changes([NodeChange::Remove { id: id.to_string() }]);
            let dropped = edges_before - model.edges().len();
            format!("Removed node {id} and {dropped} edge(s).")
        } else if model.apply_edge_changes([EdgeChange::Remove { id: id.to_string() }]) > 0 {
            format!("Removed edge {id}.")
        } else {
            bail!("no node or edge `{id}` in this project");
        };
        self.save().await?;
        Ok(message)
    }

    fn start_session(&mut self, access: Option<String>, refresh: Option<String>) -> Result<()> {
        let (Some(access), Some(refresh)) = (access, refresh) else {
            bail!("the server did not return a complete credential pair");
        };
        self.session.login(access, refresh);
        self.drain_navigation();
        Ok(())
    }

    fn require_login(&self) -> Result<()> {
        if self.session.is_logged_in() {
            Ok(())
        } else {
            bail!("Not logged in. Run `agentcanvas login` first.")
        }
    }

    async fn open_current(&mut self) -> Result<()> {
        self.require_login()?;
        let project_id = self
            .cli
            .current_project
            .clone()
            .context("No project selected. Run `agentcanvas projects use <id>` first.")?;
        if let Err(err) = self.sync.open(&project_id).await {
            return Err(self.failure(err));
        }
        debug!(project = %project_id, nodes = self.sync.model().nodes().len(), "project opened");
        Ok(())
    }

    async fn save(&mut self) -> Result<()> {
        if let Err(err) = self.sync.save_active().await {
            return Err(self.failure(err));
        }
        Ok(())
    }

    async fn persist_cli(&self) -> Result<()> {
        save_cli_settings(&self.scope, &self.cli).await
    }

    /// Turns a core failure into a CLI error, noting a forced logout when
    /// the session navigated back to the login route.
    fn failure(&mut self, err: SyncError) -> anyhow::Error {
        if self.drain_navigation() == Some(Route::Login) {
            return anyhow!(
                "{} Run `agentcanvas login` to sign in again.",
                err.user_message()
            );
        }
        anyhow!("{} ({err})", err.user_message())
    }

    /// Consumes pending navigation events and returns the latest route.
    fn drain_navigation(&mut self) -> Option<Route> {
        let mut latest = None;
        loop {
            match self.navigation.try_recv() {
                Ok(SessionEvent::Navigate { route }) => {
                    info!(?route, "session navigation");
                    latest = Some(route);
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return latest,
            }
        }
    }
}

fn config_error(err: agentcanvas_core::ConfigError) -> anyhow::Error {
    anyhow!(err.user_message())
}

fn describe_project(project: &ProjectRecord) -> String {
    match project.description.as_deref().filter(|text| !text.is_empty()) {
        Some(description) => format!("{}  {} ({description})", project.id, project.name),
        None => format!("{}  {}", project.id, project.name),
    }
}

pub fn render_graph(model: &GraphModel) -> String {
    if model.nodes().is_empty() {
        return "Empty canvas.".to_string();
    }
    let mut lines = Vec::with_capacity(model.nodes().len() + model.edges().len());
    for node in model.nodes() {
        lines.push(format!(
            "node {} \"{}\" at ({}, {})",
            node.id,
            node.label(),
            node.position.x,
            node.position.y
        ));
    }
    for edge in model.edges() {
        lines.push(format!("edge {}: {} -> {}", edge.id, edge.source, edge.target));
    }
    lines.join("\n")
}
