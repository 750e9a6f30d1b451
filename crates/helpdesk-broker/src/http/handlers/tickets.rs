use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use helpdesk_core::{NewTicket, PhotoUpload, ResolveTicket, StatusFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::{SharedContext, error::AppError};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub ok: bool,
    pub items: Vec<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub ok: bool,
    pub item_id: String,
    pub ticket_id: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
}

pub async fn list(
    State(ctx): State<SharedContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let filter = query.status.as_deref().and_then(StatusFilter::parse);
    let items = ctx.tickets.list(filter.as_ref()).await?;
    Ok(Json(ListResponse { ok: true, items }))
}

pub async fn create(
    State(ctx): State<SharedContext>,
    multipart: Multipart,
) -> Result<Json<CreateResponse>, AppError> {
    let form = TicketForm::read(multipart).await?;
    let ticket = NewTicket {
        requester_name: form.name.unwrap_or_default(),
        division: form.division.unwrap_or_default(),
        description: form.description.unwrap_or_default(),
        photo: form.photo,
    };
    let created = ctx.tickets.create(ticket).await?;
    Ok(Json(CreateResponse {
        ok: true,
        ticket_id: created.ticket_id(),
        item_id: created.item_id,
        warnings: created.warnings,
    }))
}

pub async fn resolve(
    State(ctx): State<SharedContext>,
    Path(item_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ResolveResponse>, AppError> {
    let form = TicketForm::read(multipart).await?;
    let request = ResolveTicket {
        notes: form.notes,
        photo: form.photo,
    };
    let resolved = ctx.tickets.resolve(&item_id, request).await?;
    Ok(Json(ResolveResponse {
        ok: true,
        status: resolved.status,
        warnings: resolved.warnings,
    }))
}

pub async fn delete(
    State(ctx): State<SharedContext>,
    Path(item_id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    ctx.tickets.delete(&item_id).await?;
    Ok(Json(DeleteResponse { ok: true }))
}

/// Fields accepted by the create and resolve forms. Unknown parts are
/// ignored.
#[derive(Debug, Default)]
struct TicketForm {
    name: Option<String>,
    division: Option<String>,
    description: Option<String>,
    notes: Option<String>,
    photo: Option<PhotoUpload>,
}

impl TicketForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = TicketForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match name.as_str() {
                "photo" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    // browsers send an empty part when no file was picked
                    if bytes.is_empty() && file_name.is_empty() {
                        continue;
                    }
                    form.photo = Some(PhotoUpload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                "name" => form.name = Some(field.text().await?),
                "division" => form.division = Some(field.text().await?),
                "description" | "desc" => {
                    let text = field.text().await?;
                    if form.description.is_none() || !text.trim().is_empty() {
                        form.description = Some(text);
                    }
                }
                "notes" => form.notes = Some(field.text().await?),
                other => tracing::debug!(field = other, "ignoring unknown form field"),
            }
        }
        Ok(form)
    }
}
