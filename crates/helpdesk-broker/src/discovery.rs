//! Site, list and column discovery. All calls are reads and retried on
//! throttling or transient failures.

use helpdesk_core::{FieldCatalog, RawColumn};
use reqwest::Method;
use serde::Deserialize;

use crate::{
    error::HelpdeskError,
    graph::{GraphClient, GraphError},
};

pub(crate) const READ_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ColumnPage {
    #[serde(default)]
    value: Vec<RawColumn>,
}

pub async fn resolve_site_id(
    graph: &GraphClient,
    token: &str,
    hostname: &str,
    site_path: &str,
) -> Result<String, HelpdeskError> {
    let path = format!("sites/{hostname}:{site_path}");
    let site: IdOnly = graph
        .retry_with_backoff("resolve_site", READ_ATTEMPTS, || {
            graph.send_json::<IdOnly>(
                graph
                    .request(Method::GET, &path, token)
                    .query(&[("$select", "id")]),
            )
        })
        .await
        .map_err(|err| not_found_or_schema(err, || format!("site {hostname}{site_path}")))?;
    tracing::debug!(site_id = %site.id, "resolved SharePoint site");
    Ok(site.id)
}

/// Graph accepts either the list's display name or its id here.
pub async fn resolve_list_id(
    graph: &GraphClient,
    token: &str,
    site_id: &str,
    list_name: &str,
) -> Result<String, HelpdeskError> {
    let path = format!("sites/{site_id}/lists/{}", urlencoding::encode(list_name));
    let list: IdOnly = graph
        .retry_with_backoff("resolve_list", READ_ATTEMPTS, || {
            graph.send_json::<IdOnly>(
                graph
                    .request(Method::GET, &path, token)
                    .query(&[("$select", "id")]),
            )
        })
        .await
        .map_err(|err| not_found_or_schema(err, || format!("list {list_name}")))?;
    tracing::debug!(list_id = %list.id, "resolved SharePoint list");
    Ok(list.id)
}

pub async fn get_field_catalog(
    graph: &GraphClient,
    token: &str,
    site_id: &str,
    list_id: &str,
) -> Result<FieldCatalog, HelpdeskError> {
    let path = format!("sites/{site_id}/lists/{list_id}/columns");
    let page: ColumnPage = graph
        .retry_with_backoff("list_columns", READ_ATTEMPTS, || {
            graph.send_json::<ColumnPage>(graph.request(Method::GET, &path, token))
        })
        .await
        .map_err(HelpdeskError::schema)?;

    let discovered = page.value.len();
    let catalog = FieldCatalog::from_raw(page.value);
    tracing::debug!(
        discovered,
        writable = catalog.len(),
        "built field catalog"
    );
    Ok(catalog)
}

fn not_found_or_schema(err: GraphError, what: impl FnOnce() -> String) -> HelpdeskError {
    if err.is_not_found() {
        HelpdeskError::NotFound(what())
    } else {
        HelpdeskError::schema(err)
    }
}
