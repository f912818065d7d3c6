use crate::fetcher::RefreshPolicy;
use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const API_URL_ENV: &str = "AGENTCANVAS_API_URL";
const REFRESH_POLICY_ENV: &str = "AGENTCANVAS_REFRESH_POLICY";

/// Resolved client settings: where the backend lives and where credentials
/// are kept.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api: ApiSettings,
    pub credentials_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub endpoints: Endpoints,
    pub refresh_policy: RefreshPolicy,
    pub request_timeout: Duration,
}

/// Endpoint paths relative to the base url.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub signup: String,
    pub refresh: String,
    pub projects: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "auth/login/".to_string(),
            signup: "auth/signup/".to_string(),
            refresh: "token/refresh/".to_string(),
            projects: "dashboard/projects/".to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(detail) => {
                format!("Agentcanvas not configured: {detail}. Update agentcanvas.yaml.")
            }
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoints: Endpoints::default(),
            refresh_policy: RefreshPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ApiSettings {
    pub fn with_base_url(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            ..Self::default()
        })
    }

    pub fn login_url(&self) -> Result<Url, ConfigError> {
        self.endpoint(&self.endpoints.login)
    }

    pub fn signup_url(&self) -> Result<Url, ConfigError> {
        self.endpoint(&self.endpoints.signup)
    }

    pub fn refresh_url(&self) -> Result<Url, ConfigError> {
        self.endpoint(&self.endpoints.refresh)
    }

    pub fn projects_url(&self) -> Result<Url, ConfigError> {
        self.endpoint(&with_trailing_slash(&self.endpoints.projects))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ConfigError::Invalid(format!("bad endpoint path `{path}`: {err}")))
    }
}

impl ClientSettings {
    /// Loads `agentcanvas.yaml` from the usual locations, falling back to
    /// defaults when no file exists. `.env` and environment overrides apply
    /// on top.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        match locate_config_file() {
            Some(path) => Self::load_from(&path),
            None => resolve_settings(RawConfig::default()),
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
        })?;
        let config: RawConfig = serde_yaml::from_str(&contents)
            .map_err(|err| ConfigError::Invalid(format!("invalid agentcanvas.yaml: {err}")))?;
        resolve_settings(config)
    }
}

fn resolve_settings(config: RawConfig) -> Result<ClientSettings, ConfigError> {
    let api_section = config.api.unwrap_or_default();

    let base_url = std::env::var(API_URL_ENV)
        .ok()
        .or(api_section.base_url)
        .map(|raw| parse_base_url(&raw))
        .transpose()?
        .unwrap_or_else(default_base_url);

    let refresh_policy = match std::env::var(REFRESH_POLICY_ENV) {
        Ok(raw) => parse_refresh_policy(&raw)?,
        Err(_) => api_section.refresh_policy.unwrap_or_default(),
    };

    let timeout_secs = api_section.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "api.timeout_secs must be greater than zero".to_string(),
        ));
    }

    let credentials_dir = config
        .storage
        .and_then(|section| section.credentials_dir)
        .map(PathBuf::from)
        .unwrap_or_else(default_credentials_dir);

    Ok(ClientSettings {
        api: ApiSettings {
            base_url,
            endpoints: api_section.endpoints,
            refresh_policy,
            request_timeout: Duration::from_secs(timeout_secs),
        },
        credentials_dir,
    })
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid("missing api base url".to_string()));
    }
    let url = Url::parse(&with_trailing_slash(trimmed))
        .map_err(|err| ConfigError::Invalid(format!("invalid api base url `{trimmed}`: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid(format!(
            "api base url `{trimmed}` cannot carry endpoint paths"
        )));
    }
    Ok(url)
}

fn parse_refresh_policy(raw: &str) -> Result<RefreshPolicy, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "independent" => Ok(RefreshPolicy::Independent),
        "single_flight" | "single-flight" => Ok(RefreshPolicy::SingleFlight),
        other => Err(ConfigError::Invalid(format!(
            "unknown refresh policy `{other}`"
        ))),
    }
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base url is valid")
}

/// Per-user data directory holding `credentials.json`.
pub fn default_credentials_dir() -> PathBuf {
    match BaseDirs::new() {
        Some(base) => base.data_local_dir().join("agentcanvas"),
        None => PathBuf::from(".agentcanvas"),
    }
}

/// Per-user config directory holding `agentcanvas.yaml`.
pub fn default_config_dir() -> PathBuf {
    match BaseDirs::new() {
        Some(base) => base.config_dir().join("agentcanvas"),
        None => PathBuf::from(".agentcanvas"),
    }
}

fn locate_config_file() -> Option<PathBuf> {
    config_candidates().into_iter().find(|path| path.exists())
}

fn config_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("agentcanvas");
        paths.push(config_dir.join("agentcanvas.yaml"));
        paths.push(config_dir.join("agentcanvas.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".agentcanvas").join("agentcanvas.yaml"));
        paths.push(home_dir.join(".agentcanvas").join("agentcanvas.yml"));
    } else {
        paths.push(PathBuf::from("agentcanvas.yaml"));
        paths.push(PathBuf::from("agentcanvas.yml"));
    }
    paths
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    api: Option<ApiSection>,
    storage: Option<StorageSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSection {
    base_url: Option<String>,
    #[serde(default)]
    endpoints: Endpoints,
    refresh_policy: Option<RefreshPolicy>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSection {
    credentials_dir: Option<String>,
}
