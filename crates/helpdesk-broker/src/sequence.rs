use helpdesk_core::mapper::numeric_value;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{error::HelpdeskError, graph::GraphClient};

/// Lets Graph sort on columns that are not indexed.
pub(crate) const PREFER_NON_INDEXED: &str = "HonorNonIndexedQueriesWarningMayFailRandomly";

#[derive(Debug, Deserialize)]
struct TopPage {
    #[serde(default)]
    value: Vec<TopItem>,
}

#[derive(Debug, Deserialize)]
struct TopItem {
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Next value for `column`: the current maximum plus one, or 1 on an empty
/// list or a missing/non-numeric top value.
///
/// Read-then-increment with no lock; concurrent creators can observe the
/// same maximum.
pub async fn next_number(
    graph: &GraphClient,
    token: &str,
    site_id: &str,
    list_id: &str,
    column: &str,
) -> Result<i64, HelpdeskError> {
    let path = format!("sites/{site_id}/lists/{list_id}/items");
    let request = graph
        .request(Method::GET, &path, token)
        .header("Prefer", PREFER_NON_INDEXED)
        .query(&[
            ("$expand", format!("fields($select={column})")),
            ("$orderby", format!("fields/{column} desc")),
            ("$top", "1".to_string()),
        ]);
    let page: TopPage = graph
        .send_json(request)
        .await
        .map_err(|err| HelpdeskError::store(err, None))?;

    let current = page
        .value
        .first()
        .and_then(|item| item.fields.get(column))
        .and_then(numeric_value);
    Ok(current.map_or(1, |value| value.saturating_add(1)))
}
