//! Repl id and session token lookup over HTTP.

use crate::error::ClientError;
use serde::{Deserialize, Serialize};

/// Default REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://repl.it";

/// Identity and session token of a repl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct ReplInfo {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    api_key: &'a str,
}

/// Resolves a `@user/repl` pair into the credentials needed to connect.
#[derive(Debug, Clone)]
pub struct Resolver {
    http: reqwest::Client,
    base_url: String,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Looks up the id of `@user/repl`.
    pub async fn repl_id(&self, user: &str, repl: &str) -> Result<String, ClientError> {
        let url = format!("{}/data/repls/@{}/{}", self.base_url, user, repl);
        tracing::debug!("Resolving repl @{}/{}", user, repl);

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Auth(format!(
                "lookup of @{}/{} returned {}",
                user, repl, status
            )));
        }

        let info: ReplInfo = response.json().await?;
        info.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::Auth(format!("@{}/{} has no id", user, repl)))
    }

    /// Mints a session token for repl `id`.
    pub async fn token(&self, id: &str, api_key: &str) -> Result<String, ClientError> {
        check_key(api_key)?;
        let url = format!("{}/api/v0/repls/{}/token", self.base_url, id);
        tracing::debug!("Requesting token for repl {}", id);

        let response = self
            .http
            .post(&url)
            .json(&TokenRequest { api_key })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Auth(format!(
                "token request for repl {} returned {}",
                id, status
            )));
        }

        parse_token(&response.text().await?)
    }

    /// Resolves the repl id and a fresh token.
    pub async fn resolve(
        &self,
        user: &str,
        repl: &str,
        api_key: &str,
    ) -> Result<Credentials, ClientError> {
        check_key(api_key)?;
        let id = self.repl_id(user, repl).await?;
        let token = self.token(&id, api_key).await?;
        Ok(Credentials { id, token })
    }
}

fn check_key(api_key: &str) -> Result<(), ClientError> {
    if api_key.trim().is_empty() {
        return Err(ClientError::Auth("an API key is required".to_string()));
    }
    Ok(())
}

/// The token endpoint answers with a JSON string literal.
fn parse_token(body: &str) -> Result<String, ClientError> {
    let token = body.trim().trim_matches('"');
    if token.is_empty() {
        return Err(ClientError::Auth("empty token in response".to_string()));
    }
    Ok(token.to_string())
}
