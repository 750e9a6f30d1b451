//! List item CRUD. One HTTP round trip per call (paging aside); nothing
//! here retries.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::{error::HelpdeskError, graph::GraphClient, sequence::PREFER_NON_INDEXED};

/// Upper bound on `@odata.nextLink` hops for one listing.
pub const MAX_PAGES: usize = 50;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ListItem {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ItemPage {
    #[serde(default)]
    value: Vec<ListItem>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

fn items_path(site_id: &str, list_id: &str) -> String {
    format!("sites/{site_id}/lists/{list_id}/items")
}

/// Encode an item id for use as one URL path segment. Dot segments are
/// refused outright since URL parsing collapses them even when encoded.
pub(crate) fn item_segment(item_id: &str) -> Result<String, HelpdeskError> {
    let id = item_id.trim();
    if id.is_empty() || id == "." || id == ".." {
        return Err(HelpdeskError::Validation(format!("invalid itemId {item_id:?}")));
    }
    let encoded = urlencoding::encode(id).into_owned();
    if encoded.eq_ignore_ascii_case("%2e") || encoded.eq_ignore_ascii_case("%2e%2e") {
        return Err(HelpdeskError::Validation(format!("invalid itemId {item_id:?}")));
    }
    Ok(encoded)
}

pub async fn create_item(
    graph: &GraphClient,
    token: &str,
    site_id: &str,
    list_id: &str,
    fields: &Map<String, Value>,
) -> Result<ListItem, HelpdeskError> {
    let request = graph
        .request(Method::POST, &items_path(site_id, list_id), token)
        .json(&json!({ "fields": fields }));
    graph
        .send_json(request)
        .await
        .map_err(|err| HelpdeskError::store(err, None))
}

/// All items with the projected fields, newest first when `order_by` says
/// so. Always a vector, possibly empty.
pub async fn list_items(
    graph: &GraphClient,
    token: &str,
    site_id: &str,
    list_id: &str,
    select: &[String],
    order_by: Option<&str>,
) -> Result<Vec<ListItem>, HelpdeskError> {
    let mut query = vec![("$expand", format!("fields($select={})", select.join(",")))];
    if let Some(order_by) = order_by {
        query.push(("$orderby", order_by.to_string()));
    }

    let mut items = Vec::new();
    let mut request = graph
        .request(Method::GET, &items_path(site_id, list_id), token)
        .header("Prefer", PREFER_NON_INDEXED)
        .query(&query);
    for page_number in 1..=MAX_PAGES {
        let page: ItemPage = graph
            .send_json(request)
            .await
            .map_err(|err| HelpdeskError::store(err, None))?;
        items.extend(page.value);

        let Some(next) = page.next_link else {
            return Ok(items);
        };
        if page_number == MAX_PAGES {
            tracing::warn!(
                pages = MAX_PAGES,
                items = items.len(),
                "list paging truncated"
            );
            break;
        }
        request = graph
            .request(Method::GET, &next, token)
            .header("Prefer", PREFER_NON_INDEXED);
    }
    Ok(items)
}

pub async fn patch_item_fields(
    graph: &GraphClient,
    token: &str,
    site_id: &str,
    list_id: &str,
    item_id: &str,
    patch: &Map<String, Value>,
) -> Result<(), HelpdeskError> {
    let path = format!(
        "{}/{}/fields",
        items_path(site_id, list_id),
        item_segment(item_id)?
    );
    let request = graph.request(Method::PATCH, &path, token).json(patch);
    graph
        .send_no_content(request)
        .await
        .map_err(|err| HelpdeskError::store(err, Some(item_id)))
}

pub async fn delete_item(
    graph: &GraphClient,
    token: &str,
    site_id: &str,
    list_id: &str,
    item_id: &str,
) -> Result<(), HelpdeskError> {
    let path = format!("{}/{}", items_path(site_id, list_id), item_segment(item_id)?);
    graph
        .send_no_content(graph.request(Method::DELETE, &path, token))
        .await
        .map_err(|err| HelpdeskError::store(err, Some(item_id)))
}
