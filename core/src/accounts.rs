use crate::credentials::CredentialPair;
use crate::error::SyncError;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Unauthenticated account endpoints. Both calls hand back a pair for
/// `SessionController::login`; neither touches the session itself.
#[derive(Clone)]
pub struct AccountClient {
    transport: Arc<dyn HttpTransport>,
    signup_url: Url,
    login_url: Url,
}

#[derive(Deserialize)]
struct TokenPairResponse {
    access: String,
    refresh: String,
}

impl AccountClient {
    pub fn new(transport: Arc<dyn HttpTransport>, signup_url: Url, login_url: Url) -> Self {
        Self {
            transport,
            signup_url,
            login_url,
        }
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<CredentialPair, SyncError> {
        let pair = self.exchange(&self.signup_url, email, password).await?;
        info!(email, "account created");
        Ok(pair)
    }

    pub async fn obtain_tokens(
        &self,
        email: &str,
        password: &str,
    ) -> Result<CredentialPair, SyncError> {
        self.exchange(&self.login_url, email, password).await
    }

    async fn exchange(
        &self,
        url: &Url,
        email: &str,
        password: &str,
    ) -> Result<CredentialPair, SyncError> {
        let body = json!({ "email": email, "password": password });
        let request = ApiRequest::post(url.clone(), body);
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|err| SyncError::request_failed(None, err.to_string()))?;
        if !response.is_success() {
            return Err(rejected(url, &response));
        }
        let tokens: TokenPairResponse = response
            .json()
            .map_err(|err| SyncError::InvalidResponse(format!("{url}: {err}")))?;
        Ok(CredentialPair::new(tokens.access, tokens.refresh))
    }
}

fn rejected(url: &Url, response: &ApiResponse) -> SyncError {
    SyncError::request_failed(
        Some(response.status),
        format!("POST {url}: {}", response.excerpt()),
    )
}
