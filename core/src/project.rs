use crate::error::SyncError;
use crate::fetcher::AuthenticatedFetcher;
use crate::graph::{GraphModel, GraphSnapshot};
use crate::transport::ApiRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use url::{ParseError, Url};

const GRAPH_FIELD: &str = "graph_data";
const GRAPH_FIELD_ALIAS: &str = "graphSnapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectOwner {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// A project as returned by the backend. Only the graph field is
/// interpreted; everything else is carried through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "graphSnapshot")]
    pub graph_data: Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner: Option<ProjectOwner>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewProject {
    pub name: String,
    pub description: String,
}

/// Identifies one `begin_open` call. Results carrying an older ticket are
/// stale and get discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    project_id: String,
    generation: u64,
}

impl LoadTicket {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

/// Loads a project's graph into an owned [`GraphModel`] and persists it
/// back on request.
pub struct ProjectSync {
    fetcher: AuthenticatedFetcher,
    projects_url: Url,
    model: GraphModel,
    active: Option<String>,
    pending: Option<String>,
    generation: u64,
}

impl ProjectSync {
    pub fn new(fetcher: AuthenticatedFetcher, projects_url: Url) -> Self {
        Self {
            fetcher,
            projects_url,
            model: GraphModel::new(),
            active: None,
            pending: None,
            generation: 0,
        }
    }

    pub fn fetcher(&self) -> &AuthenticatedFetcher {
        &self.fetcher
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut GraphModel {
        &mut self.model
    }

    /// The project whose graph the model currently holds.
    pub fn active_project(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The project of the latest `begin_open` that has not finished yet.
    pub fn pending_project(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectRecord>, SyncError> {
        self.fetcher.get_json(self.projects_url.clone()).await
    }

    pub async fn create_project(
        &self,
        name: &str,
        description: &str,
    ) -> Result<ProjectRecord, SyncError> {
        let body = NewProject {
            name: name.to_string(),
            description: description.to_string(),
        };
        let body = serde_json::to_value(body)
            .map_err(|err| SyncError::InvalidResponse(err.to_string()))?;
        let record: ProjectRecord = self
            .fetcher
            .send_json(ApiRequest::post(self.projects_url.clone(), body))
            .await?;
        info!(project = %record.id, name = %record.name, "project created");
        Ok(record)
    }

    pub async fn fetch_project(&self, project_id: &str) -> Result<ProjectRecord, SyncError> {
        self.fetcher.get_json(self.project_url(project_id)?).await
    }

    /// Fetches the persisted graph. A missing or malformed graph field
    /// yields an empty snapshot; transport and HTTP failures propagate.
    pub async fn load(&self, project_id: &str) -> Result<GraphSnapshot, SyncError> {
        let record: Value = self.fetcher.get_json(self.project_url(project_id)?).await?;
        let field = record
            .get(GRAPH_FIELD)
            .or_else(|| record.get(GRAPH_FIELD_ALIAS));
        match GraphSnapshot::from_persisted(field) {
            Ok(snapshot) => {
                debug!(
                    project = project_id,
                    nodes = snapshot.nodes.len(),
                    edges = snapshot.edges.len(),
                    "graph loaded"
                );
                Ok(snapshot)
            }
            Err(err) => {
                warn!(project = project_id, %err, "substituting empty graph");
                Ok(GraphSnapshot::empty())
            }
        }
    }

    /// Sends the snapshot as a partial update of the project.
    pub async fn save(&self, project_id: &str, snapshot: &GraphSnapshot) -> Result<(), SyncError> {
        let graph = serde_json::to_value(snapshot)
            .map_err(|err| SyncError::MalformedGraphData(err.to_string()))?;
        let request =
            ApiRequest::patch(self.project_url(project_id)?, json!({ GRAPH_FIELD: graph }));
        self.fetcher.request(request).await?;
        info!(
            project = project_id,
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            "graph saved"
        );
        Ok(())
    }

    /// Starts opening a project and supersedes any open still in flight.
    /// The active project and model stay as they are until `finish_open`.
    pub fn begin_open(&mut self, project_id: &str) -> LoadTicket {
        self.generation += 1;
        self.pending = Some(project_id.to_string());
        LoadTicket {
            project_id: project_id.to_string(),
            generation: self.generation,
        }
    }

    /// Installs a loaded snapshot unless a newer `begin_open` happened since
    /// the ticket was issued. Returns whether the snapshot was applied.
    pub fn finish_open(&mut self, ticket: &LoadTicket, snapshot: GraphSnapshot) -> bool {
        if ticket.generation != self.generation {
            debug!(project = %ticket.project_id, "discarding stale graph load");
            return false;
        }
        self.model.replace_with(snapshot);
        self.active = Some(ticket.project_id.clone());
        self.pending = None;
        true
    }

    /// Loads and installs a project. On failure the previously open project
    /// and its model are kept.
    pub async fn open(&mut self, project_id: &str) -> Result<&GraphModel, SyncError> {
        let ticket = self.begin_open(project_id);
        match self.load(project_id).await {
            Ok(snapshot) => {
                self.finish_open(&ticket, snapshot);
                Ok(&self.model)
            }
            Err(err) => {
                if ticket.generation == self.generation {
                    self.pending = None;
                }
                Err(err)
            }
        }
    }

    /// Saves the model of the open project. On success the model is marked
    /// persisted at the revision that was sent; on failure it stays dirty.
    pub async fn save_active(&mut self) -> Result<(), SyncError> {
        let project_id = self.active.clone().ok_or(SyncError::NoActiveProject)?;
        let revision = self.model.revision();
        let snapshot = self.model.snapshot();
        self.save(&project_id, &snapshot).await?;
        self.model.mark_persisted_at(revision);
        Ok(())
    }

    /// Appends the id as one encoded path segment, so it can never leave
    /// the projects collection.
    fn project_url(&self, project_id: &str) -> Result<Url, SyncError> {
        if matches!(project_id, "" | "." | "..") {
            return Err(SyncError::InvalidProjectId(project_id.to_string()));
        }
        let mut resolved = self.projects_url.clone();
        resolved
            .path_segments_mut()
            .map_err(|()| SyncError::InvalidUrl(ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(project_id)
            .push("");
        Ok(resolved)
    }
}
