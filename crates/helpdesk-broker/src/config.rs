use std::{env, time::Duration};

use helpdesk_core::{ClientCredentials, tokens::DEFAULT_LOGIN_BASE_URL};
use url::Url;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_PHOTO_LIBRARY: &str = "Documents";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
const DEFAULT_CONTEXT_TTL_SECS: u64 = 45 * 60;
const DEFAULT_MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where tickets live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharePointTarget {
    pub hostname: String,
    pub site_path: String,
    pub list_name: String,
    pub photo_library: String,
}

/// Mailbox used for notifications. Either half missing disables mail.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailConfig {
    pub sender_upn: Option<String>,
    pub admin_recipients: Vec<String>,
}

impl MailConfig {
    pub fn is_enabled(&self) -> bool {
        self.sender_upn.is_some() && !self.admin_recipients.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub credentials: ClientCredentials,
    pub sharepoint: SharePointTarget,
    pub mail: MailConfig,
    pub default_assignee: Option<String>,
    pub graph_base_url: String,
    pub login_base_url: String,
    pub sharepoint_base_url: String,
    pub http_timeout: Duration,
    pub context_ttl: Duration,
    pub max_photo_bytes: usize,
    pub host: String,
    pub port: u16,
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |key: &'static str| get(key).ok_or(ConfigError::MissingEnv(key));

        let credentials = ClientCredentials {
            tenant_id: required("MSGRAPH_TENANT_ID")?,
            client_id: required("MSGRAPH_CLIENT_ID")?,
            client_secret: required("MSGRAPH_CLIENT_SECRET")?,
        };

        let hostname = normalize_hostname(&required("SP_HOSTNAME")?);
        let sharepoint = SharePointTarget {
            site_path: normalize_site_path(&required("SP_SITE_PATH")?),
            list_name: required("SP_LIST_NAME")?,
            photo_library: get("SP_PHOTO_LIBRARY").unwrap_or_else(|| DEFAULT_PHOTO_LIBRARY.into()),
            hostname,
        };

        let mail = MailConfig {
            sender_upn: get("MAIL_SENDER_UPN"),
            admin_recipients: get("MAIL_ADMIN_RECIPIENTS")
                .map(|raw| parse_recipients(&raw))
                .unwrap_or_default(),
        };

        let graph_base_url = base_url(
            "GRAPH_BASE_URL",
            get("GRAPH_BASE_URL").unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.into()),
        )?;
        let login_base_url = base_url(
            "LOGIN_BASE_URL",
            get("LOGIN_BASE_URL").unwrap_or_else(|| DEFAULT_LOGIN_BASE_URL.into()),
        )?;
        let sharepoint_base_url = base_url(
            "SHAREPOINT_BASE_URL",
            get("SHAREPOINT_BASE_URL").unwrap_or_else(|| format!("https://{}", sharepoint.hostname)),
        )?;

        let http_timeout = Duration::from_secs(
            parse_number("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"))?
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
                .max(1),
        );
        let context_ttl = Duration::from_secs(
            parse_number("CONTEXT_TTL_SECS", get("CONTEXT_TTL_SECS"))?
                .unwrap_or(DEFAULT_CONTEXT_TTL_SECS),
        );
        let max_photo_bytes = parse_number("MAX_PHOTO_BYTES", get("MAX_PHOTO_BYTES"))?
            .unwrap_or(DEFAULT_MAX_PHOTO_BYTES);
        let port = parse_number("BROKER_PORT", get("BROKER_PORT"))?.unwrap_or(8080);

        Ok(Self {
            credentials,
            sharepoint,
            mail,
            default_assignee: get("DEFAULT_ASSIGNEE"),
            graph_base_url,
            login_base_url,
            sharepoint_base_url,
            http_timeout,
            context_ttl,
            max_photo_bytes,
            host: get("BROKER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
        })
    }
}

fn normalize_hostname(raw: &str) -> String {
    raw.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

fn normalize_site_path(raw: &str) -> String {
    let trimmed = raw.trim_matches('/');
    format!("/{trimmed}")
}

/// Split on commas, semicolons and whitespace.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn base_url(key: &'static str, raw: String) -> Result<String, ConfigError> {
    Url::parse(&raw).map_err(|err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
    })?;
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_number<T>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value.parse::<T>().map_err(|err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
        })
    })
    .transpose()
}
