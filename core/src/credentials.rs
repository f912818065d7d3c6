use crate::error::SyncError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const CREDENTIALS_FILE: &str = "credentials.json";

/// Access/refresh token pair as persisted on disk.
///
/// A pair is only usable when both tokens are present and non-empty; a
/// partial pair is treated exactly like an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Both tokens, or `None` when the pair is partial or absent.
    pub fn tokens(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.access_token), non_empty(&self.refresh_token)) {
            (Some(access), Some(refresh)) => Some((access, refresh)),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.tokens().is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens().map(|(access, _)| access)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens().map(|(_, refresh)| refresh)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|token| !token.is_empty())
}

/// Durable key/value holder for the current credential pair.
///
/// Clones share the same in-memory mirror, which is updated before the file
/// write so `get()` never lags behind `set()`/`clear()`.
#[derive(Clone)]
pub struct CredentialStore {
    path: PathBuf,
    current: Arc<RwLock<CredentialPair>>,
}

impl CredentialStore {
    /// Opens the store rooted at `root`, reading any previously persisted pair.
    pub fn new(root: PathBuf) -> Self {
        fs::create_dir_all(&root).ok();
        let path = root.join(CREDENTIALS_FILE);
        let current = read_pair(&path).unwrap_or_default();
        Self {
            path,
            current: Arc::new(RwLock::new(current)),
        }
    }

    pub fn in_memory() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("agentcanvas-{}", Uuid::new_v4()));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> CredentialPair {
        self.current.read().clone()
    }

    pub fn set(&self, pair: CredentialPair) -> Result<(), SyncError> {
        let serialized = serde_json::to_vec_pretty(&pair)
            .map_err(|err| SyncError::Storage(err.to_string()))?;
        *self.current.write() = pair;
        fs::write(&self.path, serialized).map_err(|err| {
            SyncError::Storage(format!("failed to write {}: {err}", self.path.display()))
        })
    }

    /// Replaces only the access token, keeping the stored refresh token.
    pub fn set_access_token(&self, access_token: impl Into<String>) -> Result<(), SyncError> {
        let mut pair = self.get();
        pair.access_token = Some(access_token.into());
        self.set(pair)
    }

    pub fn clear(&self) -> Result<(), SyncError> {
        *self.current.write() = CredentialPair::empty();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SyncError::Storage(format!(
                "failed to remove {}: {err}",
                self.path.display()
            ))),
        }
    }
}

fn read_pair(path: &Path) -> Option<CredentialPair> {
    let contents = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(pair) => Some(pair),
        Err(err) => {
            tracing::warn!(%err, path = %path.display(), "ignoring unreadable credentials file");
            None
        }
    }
}
