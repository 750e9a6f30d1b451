use std::sync::Arc;

use dashmap::DashMap;
use reqwest::{Client, header};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";

const DEFAULT_EXPIRY_SECS: i64 = 3600;
const EXPIRY_SKEW_SECS: i64 = 60;

/// Audience a bearer token is minted for. Graph and SharePoint REST need
/// different `scope` values in the client-credentials request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenResource {
    Graph,
    SharePoint { hostname: String },
}

impl TokenResource {
    pub fn scope(&self) -> String {
        match self {
            TokenResource::Graph => "https://graph.microsoft.com/.default".to_string(),
            TokenResource::SharePoint { hostname } => format!("https://{hostname}/.default"),
        }
    }

    fn label(&self) -> &str {
        match self {
            TokenResource::Graph => "graph",
            TokenResource::SharePoint { .. } => "sharepoint",
        }
    }
}

/// App-only bearer token and the instant it stops being accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: OffsetDateTime,
}

impl AccessToken {
    /// `true` while more than the refresh skew remains before expiry.
    pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS) > now
    }
}

/// Azure AD application credentials used for the client-credentials grant.
#[derive(Clone)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("client credentials missing {0}")]
    MissingConfig(&'static str),
    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
    #[error("token request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl TokenError {
    /// Timeouts and connection failures are worth another attempt; endpoint
    /// rejections are not.
    pub fn is_transient(&self) -> bool {
        match self {
            TokenError::Timeout => true,
            TokenError::Transport(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

/// Resolves and caches app-only access tokens, one entry per resource.
pub struct TokenService {
    credentials: ClientCredentials,
    login_base_url: String,
    http_client: Client,
    cache: Arc<DashMap<TokenResource, AccessToken>>,
}

impl TokenService {
    pub fn new(credentials: ClientCredentials, http_client: Client) -> Self {
        Self {
            credentials,
            login_base_url: DEFAULT_LOGIN_BASE_URL.to_string(),
            http_client,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Point the service at a different authority host (sovereign clouds, tests).
    pub fn with_login_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.login_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base_url, self.credentials.tenant_id
        )
    }

    pub async fn get_token(&self, resource: &TokenResource) -> Result<AccessToken, TokenError> {
        if let Some(entry) = self.cache.get(resource)
            && entry.value().is_fresh(OffsetDateTime::now_utc())
        {
            return Ok(entry.value().clone());
        }

        let token = self.exchange_client_credentials(resource).await?;
        tracing::debug!(
            resource = resource.label(),
            expires_at = %token.expires_at,
            "acquired app-only token"
        );
        self.cache.insert(resource.clone(), token.clone());
        Ok(token)
    }

    /// Drop a cached token, e.g. after Graph rejected it with 401.
    pub fn invalidate(&self, resource: &TokenResource) {
        self.cache.remove(resource);
    }

    async fn exchange_client_credentials(
        &self,
        resource: &TokenResource,
    ) -> Result<AccessToken, TokenError> {
        let credentials = &self.credentials;
        if credentials.tenant_id.is_empty() {
            return Err(TokenError::MissingConfig("tenant_id"));
        }
        if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
            return Err(TokenError::MissingConfig("client_id/client_secret"));
        }

        let form = [
            ("grant_type", "client_credentials".to_string()),
            ("client_id", credentials.client_id.clone()),
            ("client_secret", credentials.client_secret.clone()),
            ("scope", resource.scope()),
        ];

        let response = self
            .http_client
            .post(self.token_url())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&form)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TokenError::Timeout
                } else {
                    TokenError::Transport(err)
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(TokenError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let payload: ClientCredentialsResponse = serde_json::from_str(&body)
            .map_err(|err| TokenError::InvalidResponse(err.to_string()))?;
        let access_token = payload
            .access_token
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                TokenError::InvalidResponse("missing access_token in token response".into())
            })?;

        let now = OffsetDateTime::now_utc();
        let expires_in = payload.expires_in.unwrap_or(DEFAULT_EXPIRY_SECS);
        let expires_at = now
            .checked_add(Duration::seconds(expires_in.max(1)))
            .unwrap_or(now);

        Ok(AccessToken {
            value: access_token,
            expires_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ClientCredentialsResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}
