use helpdesk_core::{TicketValidationError, TokenError};

use crate::graph::GraphError;

#[derive(Debug, thiserror::Error)]
pub enum HelpdeskError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("schema discovery failed: {0}")]
    Schema(String),
    #[error("list store returned {status}: {body}")]
    Store { status: u16, body: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("photo upload failed: {0}")]
    Upload(String),
    #[error("mail send returned {status}: {body}")]
    Mail { status: u16, body: String },
    #[error("upstream unavailable: {0}")]
    Transient(String),
    #[error("{0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl HelpdeskError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HelpdeskError::Transient(_))
    }

    /// Site, list or column discovery failed.
    pub fn schema(err: GraphError) -> Self {
        match err {
            err if err.is_transient() => HelpdeskError::Transient(err.to_string()),
            err if err.is_unauthorized() => HelpdeskError::Auth(err.to_string()),
            err => HelpdeskError::Schema(err.to_string()),
        }
    }

    /// A list item CRUD call failed; `item` names the target for 404s.
    pub fn store(err: GraphError, item: Option<&str>) -> Self {
        match err {
            err if err.is_transient() => HelpdeskError::Transient(err.to_string()),
            GraphError::Http { status, .. } if status.as_u16() == 404 && item.is_some() => {
                HelpdeskError::NotFound(format!("list item {}", item.unwrap_or_default()))
            }
            GraphError::Http { status, body, .. } => HelpdeskError::Store {
                status: status.as_u16(),
                body,
            },
            err => HelpdeskError::Store {
                status: 502,
                body: err.to_string(),
            },
        }
    }

    pub fn upload(err: GraphError) -> Self {
        match err {
            err if err.is_transient() => HelpdeskError::Transient(err.to_string()),
            err => HelpdeskError::Upload(err.to_string()),
        }
    }

    pub fn mail(err: GraphError) -> Self {
        match err {
            err if err.is_transient() => HelpdeskError::Transient(err.to_string()),
            GraphError::Http { status, body, .. } => HelpdeskError::Mail {
                status: status.as_u16(),
                body,
            },
            err => HelpdeskError::Mail {
                status: 502,
                body: err.to_string(),
            },
        }
    }
}

impl From<TokenError> for HelpdeskError {
    fn from(value: TokenError) -> Self {
        if value.is_transient() {
            HelpdeskError::Transient(value.to_string())
        } else {
            HelpdeskError::Auth(value.to_string())
        }
    }
}

impl From<TicketValidationError> for HelpdeskError {
    fn from(value: TicketValidationError) -> Self {
        HelpdeskError::Validation(value.to_string())
    }
}
