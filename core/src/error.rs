use thiserror::Error;

/// Failures surfaced by the session, fetch and sync layers.
///
/// Only `SessionExpired` changes session state (it is always preceded by a
/// forced logout). Everything else is returned to the caller untouched.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("session expired: {reason}")]
    SessionExpired { reason: String },

    #[error("{}", describe_request_failure(.status, .message))]
    RequestFailed { status: Option<u16>, message: String },

    #[error("malformed graph data: {0}")]
    MalformedGraphData(String),

    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    #[error("invalid resource url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid project id `{0}`")]
    InvalidProjectId(String),

    #[error("no project is open")]
    NoActiveProject,

    #[error("credential storage failed: {0}")]
    Storage(String),
}

impl SyncError {
    pub fn session_expired(reason: impl Into<String>) -> Self {
        Self::SessionExpired {
            reason: reason.into(),
        }
    }

    pub fn request_failed(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }

    /// HTTP status of a failed request, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => *status,
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::SessionExpired { .. } => "Session expired. Please log in again.".to_string(),
            Self::RequestFailed {
                status: Some(404), ..
            } => "The requested project was not found.".to_string(),
            Self::RequestFailed { .. } => {
                "An error occurred while talking to the server.".to_string()
            }
            Self::NoActiveProject => "Open a project first.".to_string(),
            other => other.to_string(),
        }
    }
}

fn describe_request_failure(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("request failed with status {code}: {message}"),
        None => format!("request failed: {message}"),
    }
}
