//! Helpdesk core primitives: the ticket model, SharePoint column catalog,
//! field mapping and the app-only token cache.

pub mod mapper;
pub mod schema;
pub mod tokens;
pub mod types;

pub use mapper::{
    DONE_STATUS_PREFERENCE, OPEN_STATUS_PREFERENCE, ResolutionPatch, StatusFilter, TicketDraft,
    TicketField, TicketLayout, map_ticket_to_fields, pick_choice, pick_preferred,
};
pub use schema::{ColumnDescriptor, ColumnType, FieldCatalog, RawColumn};
pub use tokens::{AccessToken, ClientCredentials, TokenError, TokenResource, TokenService};
pub use types::{
    LifecycleState, NewTicket, PhotoRef, PhotoState, PhotoUpload, ResolveTicket, Ticket,
    TicketValidationError,
};
