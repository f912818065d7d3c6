//! Authenticated requests with a single transparent token refresh.
//!
//! Every call walks the same phases:
//!
//! ```text
//! Attempt --2xx--> done
//!    |--401--> Refresh --ok--> Retry --2xx--> done
//!    |            |              `--else--> RequestFailed
//!    |            `--fail--> logout + SessionExpired
//!    `--other--> RequestFailed
//! ```
//!
//! `Retry` has no edge back to `Refresh`, so a request refreshes at most once.

use crate::credentials::{CredentialPair, CredentialStore};
use crate::error::SyncError;
use crate::session::SessionController;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// How concurrent refreshes triggered by simultaneous 401s are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Each rejected request performs its own refresh exchange.
    #[default]
    Independent,
    /// Refreshes are serialized; a waiter whose token was already replaced
    /// reuses the new one instead of exchanging again.
    SingleFlight,
}

#[derive(Clone)]
pub struct AuthenticatedFetcher {
    transport: Arc<dyn HttpTransport>,
    session: SessionController,
    refresh_url: Url,
    policy: RefreshPolicy,
    refresh_gate: Arc<Mutex<()>>,
}

enum Phase {
    Attempt,
    Refresh { spent_token: Option<String> },
    Retry { access_token: String },
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

impl AuthenticatedFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        session: SessionController,
        refresh_url: Url,
    ) -> Self {
        Self {
            transport,
            session,
            refresh_url,
            policy: RefreshPolicy::default(),
            refresh_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    fn credentials(&self) -> &CredentialStore {
        self.session.credentials()
    }

    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
        let mut phase = Phase::Attempt;
        loop {
            phase = match phase {
                Phase::Attempt => {
                    let access_token = self.credentials().get().access_token().map(str::to_owned);
                    let response = self.dispatch(&request, access_token.as_deref()).await?;
                    if response.is_success() {
                        return Ok(response);
                    }
                    if !response.is_unauthorized() {
                        return Err(rejected(&request, &response));
                    }
                    debug!(method = %request.method, url = %request.url, "access token rejected");
                    Phase::Refresh {
                        spent_token: access_token,
                    }
                }
                Phase::Refresh { spent_token } => Phase::Retry {
                    access_token: self.refresh(spent_token).await?,
                },
                Phase::Retry { access_token } => {
                    let response = self.dispatch(&request, Some(&access_token)).await?;
                    if response.is_success() {
                        return Ok(response);
                    }
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        status = response.status,
                        "request failed after refreshing token"
                    );
                    return Err(rejected(&request, &response));
                }
            };
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SyncError> {
        self.send_json(ApiRequest::get(url)).await
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, SyncError> {
        let url = request.url.clone();
        let response = self.request(request).await?;
        response
            .json()
            .map_err(|err| SyncError::InvalidResponse(format!("{url}: {err}")))
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, SyncError> {
        self.transport
            .send(request.clone().with_bearer(access_token))
            .await
            .map_err(|err| SyncError::request_failed(None, err.to_string()))
    }

    async fn refresh(&self, spent_token: Option<String>) -> Result<String, SyncError> {
        match self.policy {
            RefreshPolicy::Independent => self.exchange_refresh_token().await,
            RefreshPolicy::SingleFlight => {
                let _gate = self.refresh_gate.lock().await;
                if let Some(current) = self.credentials().get().access_token() {
                    if spent_token.as_deref() != Some(current) {
                        debug!("reusing access token refreshed by a concurrent request");
                        return Ok(current.to_owned());
                    }
                }
                self.exchange_refresh_token().await
            }
        }
    }

    async fn exchange_refresh_token(&self) -> Result<String, SyncError> {
        let Some(refresh_token) = self.credentials().get().refresh_token().map(str::to_owned)
        else {
            return Err(self.expire("no refresh token stored"));
        };

        let body = json!({ "refresh": refresh_token });
        let request = ApiRequest::post(self.refresh_url.clone(), body);
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => return Err(self.expire(&format!("refresh exchange failed: {err}"))),
        };
        if !response.is_success() {
            return Err(self.expire(&format!(
                "refresh rejected with status {}",
                response.status
            )));
        }
        let refreshed: RefreshResponse = match response.json() {
            Ok(body) => body,
            Err(err) => return Err(self.expire(&format!("unreadable refresh response: {err}"))),
        };
        if refreshed.access.is_empty() {
            return Err(self.expire("refresh response carried an empty access token"));
        }

        let rotated = refreshed.refresh.is_some();
        let pair = CredentialPair::new(
            refreshed.access.clone(),
            refreshed.refresh.unwrap_or(refresh_token),
        );
        if let Err(err) = self.credentials().set(pair) {
            warn!(%err, "refreshed access token kept in memory only");
        }
        info!(rotated, "access token refreshed");
        Ok(refreshed.access)
    }

    fn expire(&self, reason: &str) -> SyncError {
        self.session.expire(reason);
        SyncError::session_expired(reason)
    }
}

fn rejected(request: &ApiRequest, response: &ApiResponse) -> SyncError {
    SyncError::request_failed(
        Some(response.status),
        format!("{} {}: {}", request.method, request.url, response.excerpt()),
    )
}
