use std::{collections::HashMap, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use futures_util::future::{FutureExt, join_all};
use helpdesk_broker::{build_context, config::BrokerConfig, http};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path, path_regex, query_param},
};

const BOUNDARY: &str = "helpdesk-test-boundary";
const SITE_PATH: &str = "/sites/contoso.sharepoint.com:/sites/helpdesk";
const ITEMS_PATH: &str = "/sites/site-1/lists/list-1/items";

async fn try_start_mock() -> Option<MockServer> {
    let fut = MockServer::start();
    let fut = std::panic::AssertUnwindSafe(fut);
    fut.catch_unwind().await.ok()
}

fn config(server: &MockServer, extra: &[(&str, &str)]) -> BrokerConfig {
    let uri = server.uri();
    let mut values: HashMap<String, String> = [
        ("MSGRAPH_TENANT_ID", "tenant-1"),
        ("MSGRAPH_CLIENT_ID", "client-1"),
        ("MSGRAPH_CLIENT_SECRET", "secret-1"),
        ("SP_HOSTNAME", "contoso.sharepoint.com"),
        ("SP_SITE_PATH", "/sites/helpdesk"),
        ("SP_LIST_NAME", "Tickets"),
        ("GRAPH_BASE_URL", uri.as_str()),
        ("LOGIN_BASE_URL", uri.as_str()),
        ("SHAREPOINT_BASE_URL", uri.as_str()),
        ("HTTP_TIMEOUT_SECS", "5"),
    ]
    .iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect();
    for (key, value) in extra {
        values.insert(key.to_string(), value.to_string());
    }
    BrokerConfig::from_lookup(move |key| values.get(key).cloned()).expect("config")
}

fn app(config: &BrokerConfig) -> Router {
    http::router(build_context(config).expect("context"))
}

fn helpdesk_columns() -> Value {
    json!([
        { "name": "Title", "displayName": "Title", "required": true, "text": {} },
        { "name": "RequesterName", "displayName": "RequesterName", "text": {} },
        { "name": "Division", "displayName": "Division", "choice": { "choices": ["IT", "Finance", "HR"] } },
        { "name": "Description", "displayName": "Description", "text": {} },
        { "name": "Status", "displayName": "Status", "choice": { "choices": ["New", "Belum", "Selesai"] } },
        { "name": "TicketNumber", "displayName": "TicketNumber", "number": {} },
        { "name": "AssetTag", "displayName": "Asset Tag", "required": true, "text": {} },
        { "name": "ResolutionNotes", "displayName": "ResolutionNotes", "text": {} },
        { "name": "Modified", "displayName": "Modified", "readOnly": true, "dateTime": {} },
        { "name": "Attachments", "displayName": "Attachments", "boolean": {} }
    ])
}

async fn mount_context(server: &MockServer, columns: Value) {
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(SITE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "site-1" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sites/site-1/lists/Tickets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "list-1" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sites/site-1/lists/list-1/columns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": columns })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_sequence(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(ITEMS_PATH))
        .and(query_param("$orderby", "fields/TicketNumber desc"))
        .and(query_param("$top", "1"))
        .respond_with(response)
        .mount(server)
        .await;
}

fn multipart(fields: &[(&str, &str)], photo: Option<(&str, &[u8])>) -> Body {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = photo {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{file_name}\"\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn form_request(uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

const JANE: &[(&str, &str)] = &[
    ("name", "Jane"),
    ("division", "Finance"),
    ("description", "Printer jam"),
];

#[tokio::test]
async fn create_then_list_round_trip() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping create_then_list_round_trip: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    mount_sequence(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "value": [] })),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(ITEMS_PATH))
        .and(body_partial_json(json!({
            "fields": {
                "Title": "Printer jam",
                "RequesterName": "Jane",
                "Division": "Finance",
                "Description": "Printer jam",
                "Status": "Belum",
                "TicketNumber": 1,
                "AssetTag": "-"
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "17",
            "fields": { "RequesterName": "Jane" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ITEMS_PATH))
        .and(query_param("$orderby", "fields/Created desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "id": "17",
                "fields": {
                    "Title": "Printer jam",
                    "RequesterName": "Jane",
                    "Division": "Finance",
                    "Status": "Belum",
                    "TicketNumber": 1.0,
                    "Created": "2024-03-01T08:30:00Z"
                }
            }]
        })))
        .mount(&server)
        .await;

    let app = app(&config(&server, &[]));

    let response = app
        .clone()
        .oneshot(form_request("/api/tickets", multipart(JANE, None)))
        .await
        .expect("create response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["itemId"], json!("17"));
    assert_eq!(body["ticketId"], json!(1));
    assert!(body.get("warnings").is_none());

    let response = app
        .oneshot(get_request("/api/tickets"))
        .await
        .expect("list response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], json!(true));
    let items = body["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], json!("17"));
    assert_eq!(items[0]["RequesterName"], json!("Jane"));
    assert_eq!(items[0]["Division"], json!("Finance"));
    assert_eq!(items[0]["Status"], json!("Belum"));
}

#[tokio::test]
async fn photo_upload_failure_keeps_ticket() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping photo_upload_failure_keeps_ticket: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    mount_sequence(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "value": [] })),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(ITEMS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "21" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sites/site-1/drives"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "accessDenied" }
        })))
        .mount(&server)
        .await;

    let response = app(&config(&server, &[]))
        .oneshot(form_request(
            "/api/tickets",
            multipart(JANE, Some(("jam.jpg", b"\xff\xd8\xff\xe0jpeg"))),
        ))
        .await
        .expect("create response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["itemId"], json!("21"));
    let warnings = body["warnings"].as_array().expect("warnings");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().unwrap_or_default().contains("photo"));
}

#[tokio::test]
async fn photo_is_uploaded_and_attached() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping photo_is_uploaded_and_attached: mock server unavailable");
            return;
        }
    };
    let uri = server.uri();
    mount_context(&server, helpdesk_columns()).await;
    mount_sequence(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "3", "fields": { "TicketNumber": 4.0 } }]
        })),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(ITEMS_PATH))
        .and(body_partial_json(json!({ "fields": { "TicketNumber": 5 } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "17" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sites/site-1/drives"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "drive-0", "name": "Site Assets" },
                { "id": "drive-1", "name": "documents", "webUrl": format!("{uri}/sites/helpdesk/Shared%20Documents") }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drives/drive-1/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webUrl": format!("{uri}/sites/helpdesk/Shared%20Documents")
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drives/drive-1/root:/Tickets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "folder-tickets" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drives/drive-1/root:/Tickets/17"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "itemNotFound" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drives/drive-1/root:/Tickets:/children"))
        .and(body_partial_json(json!({
            "name": "17",
            "@microsoft.graph.conflictBehavior": "fail"
        })))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": { "code": "nameAlreadyExists" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/drives/drive-1/root:/Tickets/17/jam.jpg:/content"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "file-1",
            "webUrl": format!("{uri}/sites/helpdesk/Shared%20Documents/Tickets/17/jam.jpg")
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/_api/web/lists\(guid'list-1'\)/items\(17\)/AttachmentFiles/add"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "FileName": "jam.jpg" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&config(&server, &[]))
        .oneshot(form_request(
            "/api/tickets",
            multipart(JANE, Some(("jam.jpg", b"\xff\xd8\xff\xe0jpeg"))),
        ))
        .await
        .expect("create response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["ticketId"], json!(5));
    assert!(body.get("warnings").is_none(), "unexpected warnings: {body}");
}

#[tokio::test]
async fn sequence_failure_falls_back_to_one() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping sequence_failure_falls_back_to_one: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    mount_sequence(&server, ResponseTemplate::new(400).set_body_string("bad query")).await;
    Mock::given(method("POST"))
        .and(path(ITEMS_PATH))
        .and(body_partial_json(json!({ "fields": { "TicketNumber": 1 } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "30" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&config(&server, &[]))
        .oneshot(form_request("/api/tickets", multipart(JANE, None)))
        .await
        .expect("create response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ticketId"], json!(1));
}

#[tokio::test]
async fn list_without_number_column_returns_item_id() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping list_without_number_column_returns_item_id: mock server unavailable");
            return;
        }
    };
    mount_context(
        &server,
        json!([
            { "name": "Title", "displayName": "Title", "required": true, "text": {} },
            { "name": "field_1", "displayName": "Nama Pelapor", "text": {} },
            { "name": "field_2", "displayName": "Divisi", "text": {} },
            { "name": "field_3", "displayName": "Deskripsi Masalah", "text": {} }
        ]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(ITEMS_PATH))
        .and(body_partial_json(json!({
            "fields": {
                "field_1": "Jane",
                "field_2": "Finance",
                "field_3": "Printer jam"
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "44" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&config(&server, &[]))
        .oneshot(form_request(
            "/api/tickets",
            multipart(
                &[("name", "Jane"), ("division", "Finance"), ("desc", "Printer jam")],
                None,
            ),
        ))
        .await
        .expect("create response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["itemId"], json!("44"));
    assert_eq!(body["ticketId"], json!("44"));
}

#[tokio::test]
async fn notification_sent_after_create() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping notification_sent_after_create: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    mount_sequence(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "value": [] })),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(ITEMS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "17" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/users/.+/sendMail$"))
        .and(body_partial_json(json!({
            "message": {
                "subject": "[Helpdesk] Ticket #1 - Finance",
                "toRecipients": [
                    { "emailAddress": { "address": "it-lead@contoso.com" } },
                    { "emailAddress": { "address": "ops@contoso.com" } }
                ]
            }
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(
        &server,
        &[
            ("MAIL_SENDER_UPN", "helpdesk@contoso.com"),
            ("MAIL_ADMIN_RECIPIENTS", "it-lead@contoso.com, ops@contoso.com"),
        ],
    );
    let response = app(&config)
        .oneshot(form_request("/api/tickets", multipart(JANE, None)))
        .await
        .expect("create response");
    assert_eq!(response.status(), StatusCode::OK);

    // mail goes out on a background task
    let mut delivered = false;
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests
            .iter()
            .any(|request| request.url.path().ends_with("/sendMail"))
        {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered, "sendMail was not called");
}

#[tokio::test]
async fn mail_failure_does_not_fail_create() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping mail_failure_does_not_fail_create: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    mount_sequence(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "value": [] })),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(ITEMS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "17" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/sendMail$"))
        .respond_with(ResponseTemplate::new(403).set_body_string("ErrorAccessDenied"))
        .mount(&server)
        .await;

    let config = config(
        &server,
        &[
            ("MAIL_SENDER_UPN", "helpdesk@contoso.com"),
            ("MAIL_ADMIN_RECIPIENTS", "it-lead@contoso.com"),
        ],
    );
    let response = app(&config)
        .oneshot(form_request("/api/tickets", multipart(JANE, None)))
        .await
        .expect("create response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ok"], json!(true));
}

#[tokio::test]
async fn create_store_rejection_is_error_envelope() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping create_store_rejection_is_error_envelope: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    mount_sequence(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "value": [] })),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(ITEMS_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "invalidRequest", "message": "Field 'Foo' is not recognized" }
        })))
        .mount(&server)
        .await;

    let response = app(&config(&server, &[]))
        .oneshot(form_request("/api/tickets", multipart(JANE, None)))
        .await
        .expect("create response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["ok"], json!(false));
    assert!(body["error"].as_str().unwrap_or_default().contains("400"));
}

#[tokio::test]
async fn missing_fields_rejected_without_graph_calls() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping missing_fields_rejected_without_graph_calls: mock server unavailable");
            return;
        }
    };

    let response = app(&config(&server, &[]))
        .oneshot(form_request(
            "/api/tickets",
            multipart(&[("name", "Jane"), ("division", "Finance")], None),
        ))
        .await
        .expect("create response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"], json!("description is required"));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn oversized_photo_rejected() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping oversized_photo_rejected: mock server unavailable");
            return;
        }
    };
    let config = config(&server, &[("MAX_PHOTO_BYTES", "8")]);
    let response = app(&config)
        .oneshot(form_request(
            "/api/tickets",
            multipart(JANE, Some(("big.jpg", b"0123456789abcdef"))),
        ))
        .await
        .expect("create response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["ok"], json!(false));
}

#[tokio::test]
async fn resolve_prefers_done_label() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping resolve_prefers_done_label: mock server unavailable");
            return;
        }
    };
    mount_context(
        &server,
        json!([
            { "name": "Title", "displayName": "Title", "text": {} },
            { "name": "Status", "displayName": "Status", "choice": { "choices": ["Done", "Open"] } },
            { "name": "ResolutionNotes", "displayName": "ResolutionNotes", "text": {} },
            { "name": "ResolvedAt", "displayName": "ResolvedAt", "dateTime": {} }
        ]),
    )
    .await;
    Mock::given(method("PATCH"))
        .and(path(format!("{ITEMS_PATH}/17/fields")))
        .and(body_partial_json(json!({
            "Status": "Done",
            "ResolutionNotes": "Replaced the fuser"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Status": "Done" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&config(&server, &[]))
        .oneshot(form_request(
            "/api/tickets/17/resolve",
            multipart(&[("notes", "Replaced the fuser")], None),
        ))
        .await
        .expect("resolve response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["status"], json!("Done"));
}

#[tokio::test]
async fn resolve_unknown_item_is_not_found() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping resolve_unknown_item_is_not_found: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    Mock::given(method("PATCH"))
        .and(path(format!("{ITEMS_PATH}/999/fields")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "itemNotFound" }
        })))
        .mount(&server)
        .await;

    let response = app(&config(&server, &[]))
        .oneshot(form_request(
            "/api/tickets/999/resolve",
            multipart(&[("notes", "n/a")], None),
        ))
        .await
        .expect("resolve response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["ok"], json!(false));
}

#[tokio::test]
async fn list_failure_yields_empty_items() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping list_failure_yields_empty_items: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    Mock::given(method("GET"))
        .and(path(ITEMS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let response = app(&config(&server, &[]))
        .oneshot(get_request("/api/tickets"))
        .await
        .expect("list response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body, json!({ "ok": true, "items": [] }));
}

#[tokio::test]
async fn list_filters_by_status_group() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping list_filters_by_status_group: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    Mock::given(method("GET"))
        .and(path(ITEMS_PATH))
        .and(query_param("$orderby", "fields/Created desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "4", "fields": { "Status": "Pending" } },
                { "id": "3", "fields": { "Status": "Selesai" } },
                { "id": "2", "fields": { "Status": "Belum" } },
                { "id": "1", "fields": {} }
            ]
        })))
        .mount(&server)
        .await;

    let app = app(&config(&server, &[]));
    let body = json_body(
        app.clone()
            .oneshot(get_request("/api/tickets?status=resolved"))
            .await
            .expect("list response"),
    )
    .await;
    let ids: Vec<&str> = body["items"]
        .as_array()
        .expect("items")
        .iter()
        .filter_map(|item| item["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["3"]);

    let body = json_body(
        app.oneshot(get_request("/api/tickets?status=open"))
            .await
            .expect("list response"),
    )
    .await;
    let ids: Vec<&str> = body["items"]
        .as_array()
        .expect("items")
        .iter()
        .filter_map(|item| item["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["2"]);
}

#[tokio::test]
async fn list_follows_next_link() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping list_follows_next_link: mock server unavailable");
            return;
        }
    };
    let uri = server.uri();
    mount_context(&server, helpdesk_columns()).await;
    Mock::given(method("GET"))
        .and(path(ITEMS_PATH))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "1", "fields": { "Title": "older" } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ITEMS_PATH))
        .and(query_param("$orderby", "fields/Created desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "2", "fields": { "Title": "newer" } }],
            "@odata.nextLink": format!("{uri}{ITEMS_PATH}?$skiptoken=page2")
        })))
        .mount(&server)
        .await;

    let body = json_body(
        app(&config(&server, &[]))
            .oneshot(get_request("/api/tickets"))
            .await
            .expect("list response"),
    )
    .await;
    let ids: Vec<&str> = body["items"]
        .as_array()
        .expect("items")
        .iter()
        .filter_map(|item| item["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["2", "1"]);
}

#[tokio::test]
async fn delete_passes_through() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping delete_passes_through: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{ITEMS_PATH}/17")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&config(&server, &[]))
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/tickets/17")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("delete response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "ok": true }));
}

#[tokio::test]
async fn non_numeric_item_ids_are_rejected_before_graph() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!(
                "skipping non_numeric_item_ids_are_rejected_before_graph: mock server unavailable"
            );
            return;
        }
    };
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(&config(&server, &[]));
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/tickets/..%2F..%2Flist-OTHER%2Fitems%2F5")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("delete response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["ok"], json!(false));

    let response = app
        .oneshot(form_request(
            "/api/tickets/..%2Flist-OTHER%2Fitems%2F5/resolve",
            multipart(&[("notes", "done")], None),
        ))
        .await
        .expect("resolve response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty(), "unexpected Graph calls: {received:?}");
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping concurrent_requests_share_one_refresh: mock server unavailable");
            return;
        }
    };
    mount_context(&server, helpdesk_columns()).await;
    Mock::given(method("GET"))
        .and(path(ITEMS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "value": [] }))
                .set_delay(Duration::from_millis(20)),
        )
        .mount(&server)
        .await;

    let context = build_context(&config(&server, &[])).expect("context");
    let calls = (0..8).map(|_| {
        let context = context.clone();
        async move { context.tickets.list(None).await }
    });
    for result in join_all(calls).await {
        assert!(result.expect("list").is_empty());
    }
    assert_eq!(context.tickets.context().refresh_count(), 1);
}

#[tokio::test]
async fn auth_failure_maps_to_bad_gateway() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping auth_failure_maps_to_bad_gateway: mock server unavailable");
            return;
        }
    };
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client"
        })))
        .mount(&server)
        .await;

    let response = app(&config(&server, &[]))
        .oneshot(get_request("/api/tickets"))
        .await
        .expect("list response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["ok"], json!(false));
}

#[tokio::test]
async fn healthz_reports_ok() {
    let server = match try_start_mock().await {
        Some(srv) => srv,
        None => {
            eprintln!("skipping healthz_reports_ok: mock server unavailable");
            return;
        }
    };
    let response = app(&config(&server, &[]))
        .oneshot(get_request("/healthz"))
        .await
        .expect("health response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "ok": true }));
}
