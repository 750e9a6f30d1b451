use serde::Serialize;
use time::OffsetDateTime;

/// Photo evidence as received from the multipart form.
#[derive(Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PhotoUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TicketValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("photo exceeds {limit} bytes")]
    PhotoTooLarge { limit: usize },
    #[error("photo is empty")]
    EmptyPhoto,
    #[error("itemId must be a positive integer")]
    InvalidItemId,
}

/// Accept only a plain positive integer; list item ids are numeric and
/// end up as raw URL path segments.
pub fn parse_item_id(raw: &str) -> Result<&str, TicketValidationError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(TicketValidationError::MissingField("itemId"));
    }
    let numeric = id.bytes().all(|b| b.is_ascii_digit());
    if !numeric || id.trim_start_matches('0').is_empty() {
        return Err(TicketValidationError::InvalidItemId);
    }
    Ok(id)
}

/// Payload for opening a ticket.
#[derive(Clone, Debug, Default)]
pub struct NewTicket {
    pub requester_name: String,
    pub division: String,
    pub description: String,
    pub photo: Option<PhotoUpload>,
}

impl NewTicket {
    pub fn validate(&self) -> Result<(), TicketValidationError> {
        if self.requester_name.trim().is_empty() {
            return Err(TicketValidationError::MissingField("name"));
        }
        if self.division.trim().is_empty() {
            return Err(TicketValidationError::MissingField("division"));
        }
        if self.description.trim().is_empty() {
            return Err(TicketValidationError::MissingField("description"));
        }
        Ok(())
    }

    /// Short single-line summary used for the list item's title.
    pub fn summary(&self) -> String {
        const MAX_CHARS: usize = 80;
        let line = self
            .description
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        if line.chars().count() <= MAX_CHARS {
            return line.to_string();
        }
        let mut summary: String = line.chars().take(MAX_CHARS - 3).collect();
        summary.push_str("...");
        summary
    }
}

/// Payload for closing a ticket.
#[derive(Clone, Debug, Default)]
pub struct ResolveTicket {
    pub notes: Option<String>,
    pub photo: Option<PhotoUpload>,
}

pub fn check_photo(photo: &PhotoUpload, limit: usize) -> Result<(), TicketValidationError> {
    if photo.bytes.is_empty() {
        return Err(TicketValidationError::EmptyPhoto);
    }
    if photo.bytes.len() > limit {
        return Err(TicketValidationError::PhotoTooLarge { limit });
    }
    Ok(())
}

/// Where an uploaded photo ended up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRef {
    pub file_name: String,
    pub server_url: Option<String>,
    pub server_relative_url: String,
}

/// Outcome of the photo step of a create/resolve. `Pending` marks a ticket
/// whose item exists but whose photo did not make it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum PhotoState {
    NotSupplied,
    Attached(PhotoRef),
    Pending { reason: String },
}

impl PhotoState {
    pub fn photo_ref(&self) -> Option<&PhotoRef> {
        match self {
            PhotoState::Attached(photo) => Some(photo),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PhotoState::Pending { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Open,
    Resolved,
}

/// Application view of one list item, independent of column naming.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub ticket_number: Option<i64>,
    pub requester_name: Option<String>,
    pub division: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub state: LifecycleState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    pub resolution_notes: Option<String>,
    pub photo_url: Option<String>,
}
