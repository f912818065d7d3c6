use anyhow::{Context, Result};
use agentcanvas_core::config::default_config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

const SETTINGS_FILE: &str = "cli_settings.json";
const MAX_RECENT_PROJECTS: usize = 10;

/// Where the CLI keeps its own state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    User,
    Dir(PathBuf),
}

impl Scope {
    pub fn settings_path(&self) -> PathBuf {
        match self {
            Scope::User => default_config_dir().join(SETTINGS_FILE),
            Scope::Dir(dir) => dir.join(SETTINGS_FILE),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliSettings {
    #[serde(default)]
    pub current_project: Option<String>,
    #[serde(default)]
    pub recent_projects: Vec<String>,
}

impl CliSettings {
    /// Makes `project_id` current and moves it to the front of the recent list.
    pub fn remember_project(&mut self, project_id: &str) {
        self.current_project = Some(project_id.to_string());
        self.recent_projects.retain(|entry| entry != project_id);
        self.recent_projects.insert(0, project_id.to_string());
        self.recent_projects.truncate(MAX_RECENT_PROJECTS);
    }

    pub fn forget_project(&mut self, project_id: &str) {
        if self.current_project.as_deref() == Some(project_id) {
            self.current_project = None;
        }
        self.recent_projects.retain(|entry| entry != project_id);
    }
}

pub async fn load_cli_settings(scope: &Scope) -> Result<CliSettings> {
    let path = scope.settings_path();
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(settings) => Ok(settings),
            Err(err) => {
                let defaults = CliSettings::default();
                save_cli_settings(scope, &defaults).await?;
                warn!(
                    error = ?err,
                    "failed to parse cli_settings.json, resetting to defaults"
                );
                Ok(defaults)
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(CliSettings::default()),
        Err(err) => Err(err).context("failed to read cli_settings.json"),
    }
}

pub async fn save_cli_settings(scope: &Scope, settings: &CliSettings) -> Result<()> {
    let path = scope.settings_path();
    ensure_parent(&path).await?;
    let serialized = serde_json::to_string_pretty(settings)?;
    tokio::fs::write(&path, serialized)
        .await
        .with_context(|| format!("failed to write cli_settings.json at {}", path.display()))
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}
