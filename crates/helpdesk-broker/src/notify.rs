use helpdesk_core::NewTicket;
use reqwest::Method;
use serde_json::json;

use crate::{error::HelpdeskError, graph::GraphClient};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailMessage {
    pub subject: String,
    pub html: String,
}

/// Send `message` from `from_upn`'s mailbox. Returns `Ok(false)` without
/// touching the network when there is no sender or no recipient.
pub async fn send_mail(
    graph: &GraphClient,
    token: &str,
    from_upn: &str,
    to: &[String],
    message: &MailMessage,
) -> Result<bool, HelpdeskError> {
    let recipients: Vec<_> = to
        .iter()
        .map(|address| address.trim())
        .filter(|address| !address.is_empty())
        .map(|address| json!({ "emailAddress": { "address": address } }))
        .collect();
    if from_upn.trim().is_empty() || recipients.is_empty() {
        return Ok(false);
    }

    let body = json!({
        "message": {
            "subject": message.subject,
            "body": { "contentType": "HTML", "content": message.html },
            "toRecipients": recipients,
        },
        "saveToSentItems": false
    });
    let path = format!("users/{}/sendMail", urlencoding::encode(from_upn.trim()));
    graph
        .send_no_content(graph.request(Method::POST, &path, token).json(&body))
        .await
        .map_err(HelpdeskError::mail)?;
    Ok(true)
}

pub fn new_ticket_message(
    ticket: &NewTicket,
    ticket_label: &str,
    photo_url: Option<&str>,
) -> MailMessage {
    let subject = format!(
        "[Helpdesk] Ticket #{} - {}",
        ticket_label,
        ticket.division.trim()
    );

    let mut html = String::new();
    html.push_str("<p>A new helpdesk ticket was submitted.</p><table>");
    for (label, value) in [
        ("Ticket", ticket_label),
        ("Requester", ticket.requester_name.trim()),
        ("Division", ticket.division.trim()),
    ] {
        html.push_str(&format!(
            "<tr><td><b>{label}</b></td><td>{}</td></tr>",
            escape_html(value)
        ));
    }
    html.push_str(&format!(
        "<tr><td><b>Description</b></td><td>{}</td></tr>",
        escape_html(ticket.description.trim()).replace('\n', "<br>")
    ));
    if let Some(url) = photo_url {
        let url = escape_html(url);
        html.push_str(&format!(
            "<tr><td><b>Photo</b></td><td><a href=\"{url}\">{url}</a></td></tr>"
        ));
    }
    html.push_str("</table>");

    MailMessage { subject, html }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
