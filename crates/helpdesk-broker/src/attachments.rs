//! Photo evidence: drive upload into a per-ticket folder, plus the
//! SharePoint REST attachment call used when a list has no photo column.

use helpdesk_core::PhotoRef;
use reqwest::{Method, header};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::{
    discovery::READ_ATTEMPTS, error::HelpdeskError, graph::GraphClient, store::item_segment,
};

/// Root folder under the photo library; one subfolder per list item.
pub const TICKETS_FOLDER: &str = "Tickets";

const ILLEGAL_FILE_NAME_CHARS: &[char] = &[
    '"', '*', ':', '<', '>', '?', '/', '\\', '|', '#', '%', '~', '&', '{', '}',
];
const MAX_FILE_NAME_CHARS: usize = 128;
const FALLBACK_FILE_NAME: &str = "photo";

pub struct PhotoUploadRequest<'a> {
    pub library_name: &'a str,
    pub item_id: &'a str,
    pub file_name: &'a str,
    pub content_type: Option<&'a str>,
    pub bytes: &'a [u8],
}

/// A SharePoint REST `AttachmentFiles/add` call against one list item.
pub struct ListAttachmentRequest<'a> {
    pub sharepoint_base_url: &'a str,
    pub site_path: &'a str,
    pub list_id: &'a str,
    pub item_id: &'a str,
    pub file_name: &'a str,
    pub bytes: &'a [u8],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Drive {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DrivePage {
    #[serde(default)]
    value: Vec<Drive>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebUrlOnly {
    #[serde(default)]
    web_url: Option<String>,
}

/// Origin and decoded server-relative path of a library, parsed from a
/// `webUrl` such as `https://contoso.sharepoint.com/sites/hd/Shared%20Documents`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryLocation {
    pub origin: String,
    pub base_path: String,
}

impl LibraryLocation {
    pub fn from_web_url(web_url: &str) -> Option<Self> {
        let url = Url::parse(web_url).ok()?;
        let host = url.host_str()?;
        let origin = match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        };
        let base_path = urlencoding::decode(url.path())
            .ok()?
            .trim_end_matches('/')
            .to_string();
        Some(Self { origin, base_path })
    }
}

/// Upload `bytes` to `Tickets/{item_id}/{file_name}` in the named library.
pub async fn upload_photo(
    graph: &GraphClient,
    token: &str,
    site_id: &str,
    request: PhotoUploadRequest<'_>,
) -> Result<PhotoRef, HelpdeskError> {
    let item_folder = item_segment(request.item_id)?;
    let drive = find_drive(graph, token, site_id, request.library_name).await?;
    let location = library_location(graph, token, &drive).await?;

    let folder = [TICKETS_FOLDER, item_folder.as_str()];
    ensure_folder(graph, token, &drive.id, &folder).await?;

    let file_path = format!("{}/{}/{}", TICKETS_FOLDER, item_folder, request.file_name);
    let upload = graph
        .request(
            Method::PUT,
            &format!("drives/{}/root:/{}:/content", drive.id, encode_path(&file_path)),
            token,
        )
        .header(
            header::CONTENT_TYPE,
            request.content_type.unwrap_or("application/octet-stream"),
        )
        .body(request.bytes.to_vec());
    let uploaded: WebUrlOnly = graph
        .send_json(upload)
        .await
        .map_err(HelpdeskError::upload)?;

    let server_relative_url = format!("{}/{}", location.base_path, file_path);
    let server_url = uploaded
        .web_url
        .unwrap_or_else(|| format!("{}{}", location.origin, server_relative_url));
    tracing::debug!(
        item_id = request.item_id,
        server_relative_url = %server_relative_url,
        "photo uploaded"
    );

    Ok(PhotoRef {
        file_name: request.file_name.to_string(),
        server_url: Some(server_url),
        server_relative_url,
    })
}

async fn find_drive(
    graph: &GraphClient,
    token: &str,
    site_id: &str,
    library_name: &str,
) -> Result<Drive, HelpdeskError> {
    let path = format!("sites/{site_id}/drives");
    let page: DrivePage = graph
        .retry_with_backoff("list_drives", READ_ATTEMPTS, || {
            graph.send_json::<DrivePage>(
                graph
                    .request(Method::GET, &path, token)
                    .query(&[("$select", "id,name,webUrl")]),
            )
        })
        .await
        .map_err(HelpdeskError::upload)?;

    page.value
        .into_iter()
        .find(|drive| drive.name.eq_ignore_ascii_case(library_name))
        .ok_or_else(|| HelpdeskError::NotFound(format!("document library {library_name}")))
}

/// Prefer the drive's backing list `webUrl`; the drive's own `webUrl`
/// points at the same library and serves as the fallback.
async fn library_location(
    graph: &GraphClient,
    token: &str,
    drive: &Drive,
) -> Result<LibraryLocation, HelpdeskError> {
    let path = format!("drives/{}/list", drive.id);
    let list = graph
        .send_json::<WebUrlOnly>(
            graph
                .request(Method::GET, &path, token)
                .query(&[("$select", "webUrl")]),
        )
        .await;
    let from_list = match list {
        Ok(list) => list.web_url,
        Err(err) => {
            tracing::debug!(drive_id = %drive.id, error = %err, "drive list lookup failed");
            None
        }
    };

    from_list
        .as_deref()
        .and_then(LibraryLocation::from_web_url)
        .or_else(|| drive.web_url.as_deref().and_then(LibraryLocation::from_web_url))
        .ok_or_else(|| {
            HelpdeskError::Upload(format!("cannot derive base path of drive {}", drive.id))
        })
}

/// Walk `segments`, creating each missing folder. A 409 means another
/// request created it first.
async fn ensure_folder(
    graph: &GraphClient,
    token: &str,
    drive_id: &str,
    segments: &[&str],
) -> Result<(), HelpdeskError> {
    for depth in 0..segments.len() {
        let current = segments[..=depth].join("/");
        let probe = graph
            .send_json::<Value>(graph.request(
                Method::GET,
                &format!("drives/{drive_id}/root:/{}", encode_path(&current)),
                token,
            ))
            .await;
        match probe {
            Ok(_) => continue,
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(HelpdeskError::upload(err)),
        }

        let parent = if depth == 0 {
            format!("drives/{drive_id}/root/children")
        } else {
            let parent = segments[..depth].join("/");
            format!("drives/{drive_id}/root:/{}:/children", encode_path(&parent))
        };
        let create = graph.request(Method::POST, &parent, token).json(&json!({
            "name": segments[depth],
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail"
        }));
        match graph.send_json::<Value>(create).await {
            Ok(_) => tracing::debug!(folder = %current, "created folder"),
            Err(err) if err.is_conflict() => {
                tracing::debug!(folder = %current, "folder created concurrently")
            }
            Err(err) => return Err(HelpdeskError::upload(err)),
        }
    }
    Ok(())
}

/// Add `bytes` as an attachment of a list item through SharePoint REST.
/// Needs a token minted for the SharePoint host, not Graph.
pub async fn attach_to_list_item(
    graph: &GraphClient,
    sharepoint_token: &str,
    request: ListAttachmentRequest<'_>,
) -> Result<(), HelpdeskError> {
    let url = format!(
        "{}{}/_api/web/lists(guid'{}')/items({})/AttachmentFiles/add(FileName='{}')",
        request.sharepoint_base_url.trim_end_matches('/'),
        request.site_path,
        urlencoding::encode(request.list_id),
        item_segment(request.item_id)?,
        urlencoding::encode(&request.file_name.replace('\'', "''")),
    );
    let post = graph
        .request(Method::POST, &url, sharepoint_token)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(request.bytes.to_vec());
    graph
        .send_no_content(post)
        .await
        .map_err(HelpdeskError::upload)
}

/// Reduce a client-supplied name to a SharePoint-safe base name.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_control() || ILLEGAL_FILE_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        return FALLBACK_FILE_NAME.to_string();
    }
    if cleaned.chars().count() <= MAX_FILE_NAME_CHARS {
        return cleaned.to_string();
    }

    // keep the extension when truncating
    match cleaned.rsplit_once('.') {
        Some((stem, ext)) if ext.chars().count() < 16 => {
            let keep = MAX_FILE_NAME_CHARS - ext.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{stem}.{ext}")
        }
        _ => cleaned.chars().take(MAX_FILE_NAME_CHARS).collect(),
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
