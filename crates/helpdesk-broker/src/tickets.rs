//! Ticket lifecycle: create (Open), list, resolve (Resolved) and the raw
//! delete passthrough. Each operation is a strictly sequential chain of
//! Graph calls against one context snapshot.

use std::sync::Arc;

use helpdesk_core::{
    NewTicket, PhotoRef, PhotoState, PhotoUpload, ResolveTicket, StatusFilter, TicketDraft,
    TicketField, TokenResource,
    mapper::{FieldValue, coerce},
    types::{check_photo, parse_item_id},
};
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    attachments::{self, ListAttachmentRequest, PhotoUploadRequest},
    config::{BrokerConfig, MailConfig},
    context::{ContextStore, GraphContext},
    error::HelpdeskError,
    graph::GraphClient,
    notify, sequence, store,
};

const CREATED_DESC: &str = "fields/Created desc";

/// Per-deployment knobs the orchestrator needs besides the context.
#[derive(Clone, Debug)]
pub struct TicketSettings {
    pub mail: MailConfig,
    pub default_assignee: Option<String>,
    pub max_photo_bytes: usize,
    pub photo_library: String,
    pub sharepoint_base_url: String,
}

impl TicketSettings {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            mail: config.mail.clone(),
            default_assignee: config.default_assignee.clone(),
            max_photo_bytes: config.max_photo_bytes,
            photo_library: config.sharepoint.photo_library.clone(),
            sharepoint_base_url: config.sharepoint_base_url.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTicket {
    pub item_id: String,
    pub ticket_number: Option<i64>,
    pub photo: PhotoState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl CreatedTicket {
    /// The sequential number when the list has one, the item id otherwise.
    pub fn ticket_id(&self) -> Value {
        match self.ticket_number {
            Some(number) => Value::from(number),
            None => Value::String(self.item_id.clone()),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTicket {
    pub item_id: String,
    pub status: Option<String>,
    pub photo: PhotoState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct TicketService {
    context: Arc<ContextStore>,
    graph: GraphClient,
    settings: TicketSettings,
}

impl TicketService {
    pub fn new(context: Arc<ContextStore>, graph: GraphClient, settings: TicketSettings) -> Self {
        Self {
            context,
            graph,
            settings,
        }
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn settings(&self) -> &TicketSettings {
        &self.settings
    }

    /// Open a ticket. Nothing is written before the item exists; once it
    /// does, photo and mail failures only downgrade the result.
    pub async fn create(&self, ticket: NewTicket) -> Result<CreatedTicket, HelpdeskError> {
        ticket.validate()?;
        if let Some(photo) = &ticket.photo {
            check_photo(photo, self.settings.max_photo_bytes)?;
        }

        let ctx = self.context.get_or_refresh().await?;
        let ticket_number = self.next_ticket_number(&ctx).await;

        let draft = TicketDraft {
            ticket: &ticket,
            ticket_number,
            reported_at: OffsetDateTime::now_utc(),
            default_assignee: self.settings.default_assignee.as_deref(),
        };
        let fields = ctx.layout.map_new_ticket(&draft, &ctx.catalog);
        debug!(fields = fields.len(), "mapped ticket fields");

        let item = match store::create_item(
            &self.graph,
            &ctx.token.value,
            &ctx.site_id,
            &ctx.list_id,
            &fields,
        )
        .await
        {
            Ok(item) => item,
            Err(err) => return Err(self.on_store_error(err).await),
        };
        info!(item_id = %item.id, ticket_number = ?ticket_number, "ticket created");

        let photo = match &ticket.photo {
            Some(upload) => self.attach_photo(&ctx, &item.id, upload).await,
            None => PhotoState::NotSupplied,
        };

        let created = CreatedTicket {
            warnings: photo_warnings(&photo),
            item_id: item.id,
            ticket_number,
            photo,
        };

        let label = match created.ticket_number {
            Some(number) => number.to_string(),
            None => created.item_id.clone(),
        };
        let photo_url = created
            .photo
            .photo_ref()
            .and_then(|photo| photo.server_url.clone());
        let message = notify::new_ticket_message(&ticket, &label, photo_url.as_deref());
        self.spawn_notification(ctx.token.value.clone(), message);

        Ok(created)
    }

    /// Projected items, newest first, each with its `id`. A failing items
    /// query yields an empty list; context failures still propagate.
    pub async fn list(&self, filter: Option<&StatusFilter>) -> Result<Vec<Value>, HelpdeskError> {
        let ctx = self.context.get_or_refresh().await?;
        let projection = ctx.layout.projection();
        let items = match store::list_items(
            &self.graph,
            &ctx.token.value,
            &ctx.site_id,
            &ctx.list_id,
            &projection,
            Some(CREATED_DESC),
        )
        .await
        {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "listing tickets failed; returning no items");
                let _ = self.on_store_error(err).await;
                return Ok(Vec::new());
            }
        };

        let rows = items
            .into_iter()
            .filter(|item| {
                filter.is_none_or(|filter| {
                    let ticket = ctx.layout.ticket_from_fields(&item.id, &item.fields);
                    filter.matches(ticket.status.as_deref())
                })
            })
            .map(|item| {
                let mut row = item.fields;
                row.insert("id".into(), Value::String(item.id));
                Value::Object(row)
            })
            .collect();
        Ok(rows)
    }

    /// Move a ticket to the done status. Overwrites whatever state the
    /// item was in.
    pub async fn resolve(
        &self,
        item_id: &str,
        request: ResolveTicket,
    ) -> Result<ResolvedTicket, HelpdeskError> {
        let item_id = parse_item_id(item_id)?;
        if let Some(photo) = &request.photo {
            check_photo(photo, self.settings.max_photo_bytes)?;
        }

        let ctx = self.context.get_or_refresh().await?;
        let patch = ctx
            .layout
            .map_resolution(request.notes.as_deref(), OffsetDateTime::now_utc());
        if patch.fields.is_empty() {
            warn!(item_id, "list has no status or resolution columns; nothing to patch");
        } else if let Err(err) = store::patch_item_fields(
            &self.graph,
            &ctx.token.value,
            &ctx.site_id,
            &ctx.list_id,
            item_id,
            &patch.fields,
        )
        .await
        {
            return Err(self.on_store_error(err).await);
        }
        info!(item_id, status = ?patch.status, "ticket resolved");

        let photo = match &request.photo {
            Some(upload) => self.attach_photo(&ctx, item_id, upload).await,
            None => PhotoState::NotSupplied,
        };

        Ok(ResolvedTicket {
            item_id: item_id.to_string(),
            status: patch.status,
            warnings: photo_warnings(&photo),
            photo,
        })
    }

    pub async fn delete(&self, item_id: &str) -> Result<(), HelpdeskError> {
        let item_id = parse_item_id(item_id)?;
        let ctx = self.context.get_or_refresh().await?;
        if let Err(err) = store::delete_item(
            &self.graph,
            &ctx.token.value,
            &ctx.site_id,
            &ctx.list_id,
            item_id,
        )
        .await
        {
            return Err(self.on_store_error(err).await);
        }
        info!(item_id, "ticket deleted");
        Ok(())
    }

    async fn next_ticket_number(&self, ctx: &GraphContext) -> Option<i64> {
        let column = ctx.layout.sequence_column()?;
        match sequence::next_number(
            &self.graph,
            &ctx.token.value,
            &ctx.site_id,
            &ctx.list_id,
            &column.internal_name,
        )
        .await
        {
            Ok(number) => Some(number),
            Err(err) => {
                warn!(
                    column = %column.internal_name,
                    error = %err,
                    "ticket number query failed; falling back to 1"
                );
                Some(1)
            }
        }
    }

    /// Upload then associate. Failures leave the ticket with a pending
    /// photo instead of failing the operation.
    async fn attach_photo(
        &self,
        ctx: &GraphContext,
        item_id: &str,
        upload: &PhotoUpload,
    ) -> PhotoState {
        let file_name = attachments::sanitize_file_name(&upload.file_name);
        let request = PhotoUploadRequest {
            library_name: &self.settings.photo_library,
            item_id,
            file_name: &file_name,
            content_type: upload.content_type.as_deref(),
            bytes: &upload.bytes,
        };
        let photo = match attachments::upload_photo(
            &self.graph,
            &ctx.token.value,
            &ctx.site_id,
            request,
        )
        .await
        {
            Ok(photo) => photo,
            Err(err) => {
                warn!(item_id, error = %err, "photo upload failed; ticket kept without photo");
                return PhotoState::Pending {
                    reason: err.to_string(),
                };
            }
        };

        match self.associate_photo(ctx, item_id, &photo, upload).await {
            Ok(()) => PhotoState::Attached(photo),
            Err(err) => {
                warn!(item_id, error = %err, "photo uploaded but not linked to ticket");
                PhotoState::Pending {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn associate_photo(
        &self,
        ctx: &GraphContext,
        item_id: &str,
        photo: &PhotoRef,
        upload: &PhotoUpload,
    ) -> Result<(), HelpdeskError> {
        let url = photo
            .server_url
            .clone()
            .unwrap_or_else(|| photo.server_relative_url.clone());
        if let Some(column) = ctx.layout.column(TicketField::Photo)
            && let Some(value) = coerce(column, &FieldValue::Text(url))
        {
            let mut patch = Map::new();
            patch.insert(column.internal_name.clone(), value);
            return store::patch_item_fields(
                &self.graph,
                &ctx.token.value,
                &ctx.site_id,
                &ctx.list_id,
                item_id,
                &patch,
            )
            .await;
        }

        let target = self.context.target();
        let sharepoint = TokenResource::SharePoint {
            hostname: target.hostname.clone(),
        };
        let token = self.context.tokens().get_token(&sharepoint).await?;
        let request = ListAttachmentRequest {
            sharepoint_base_url: &self.settings.sharepoint_base_url,
            site_path: &target.site_path,
            list_id: &ctx.list_id,
            item_id,
            file_name: &photo.file_name,
            bytes: &upload.bytes,
        };
        attachments::attach_to_list_item(&self.graph, &token.value, request).await
    }

    /// Mail runs after the response-critical steps and never reports back.
    fn spawn_notification(&self, token: String, message: notify::MailMessage) {
        let mail = &self.settings.mail;
        let Some(sender) = mail.sender_upn.clone().filter(|_| mail.is_enabled()) else {
            debug!("mail not configured; skipping ticket notification");
            return;
        };
        let recipients = mail.admin_recipients.clone();
        let graph = self.graph.clone();
        tokio::spawn(async move {
            match notify::send_mail(&graph, &token, &sender, &recipients, &message).await {
                Ok(true) => info!(recipients = recipients.len(), "ticket notification sent"),
                Ok(false) => debug!("ticket notification skipped"),
                Err(err) => warn!(error = %err, "ticket notification failed"),
            }
        });
    }

    async fn on_store_error(&self, err: HelpdeskError) -> HelpdeskError {
        if matches!(err, HelpdeskError::Store { status: 401, .. }) {
            self.context.invalidate().await;
        }
        err
    }
}

fn photo_warnings(photo: &PhotoState) -> Vec<String> {
    match photo {
        PhotoState::Pending { reason } => vec![format!("photo not attached: {reason}")],
        _ => Vec::new(),
    }
}
