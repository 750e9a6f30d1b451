//! Translation between the application ticket model and a list's
//! admin-managed columns.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Number, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    schema::{ColumnDescriptor, ColumnType, FieldCatalog},
    types::{LifecycleState, NewTicket, Ticket},
};

/// Status labels a new ticket may start in, most preferred first.
pub const OPEN_STATUS_PREFERENCE: &[&str] = &["Belum", "Open", "New", "Submitted"];
/// Status labels a resolved ticket may carry, most preferred first.
pub const DONE_STATUS_PREFERENCE: &[&str] = &["Selesai", "Completed", "Done", "Closed"];

/// Placeholder written into required text columns the form never collects.
pub const TEXT_PLACEHOLDER: &str = "-";

/// Built-in column SharePoint stamps on every item.
pub const CREATED_COLUMN: &str = "Created";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TicketField {
    TicketNumber,
    Title,
    Requester,
    Division,
    Description,
    IncidentDescription,
    ReportedAt,
    Status,
    Assignee,
    ResolutionNotes,
    ResolvedAt,
    Photo,
}

impl TicketField {
    pub const ALL: [TicketField; 12] = [
        TicketField::TicketNumber,
        TicketField::Title,
        TicketField::Requester,
        TicketField::Division,
        TicketField::Description,
        TicketField::IncidentDescription,
        TicketField::ReportedAt,
        TicketField::Status,
        TicketField::Assignee,
        TicketField::ResolutionNotes,
        TicketField::ResolvedAt,
        TicketField::Photo,
    ];

    /// Display names the field may appear under, English and Indonesian.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            TicketField::TicketNumber => &["TicketNumber", "Ticket Number", "No Tiket", "Nomor Tiket"],
            TicketField::Title => &["Title", "Judul"],
            TicketField::Requester => &[
                "RequesterName",
                "Requester Name",
                "Requester",
                "Nama Pelapor",
                "Nama",
            ],
            TicketField::Division => &["Division", "Divisi", "Department", "Departemen"],
            TicketField::Description => &["Description", "Deskripsi"],
            TicketField::IncidentDescription => &[
                "Deskripsi Masalah",
                "Incident Description",
                "Issue Description",
            ],
            TicketField::ReportedAt => &[
                "Waktu Pelaporan",
                "Reported At",
                "ReportedAt",
                "Tanggal Lapor",
            ],
            TicketField::Status => &["Status"],
            TicketField::Assignee => &["Assignee", "AssignedTo", "PIC", "Penanggung Jawab"],
            TicketField::ResolutionNotes => &[
                "ResolutionNotes",
                "Resolution Notes",
                "Catatan Penyelesaian",
                "Catatan",
            ],
            TicketField::ResolvedAt => &[
                "ResolvedAt",
                "Resolved At",
                "Waktu Selesai",
                "Tanggal Selesai",
            ],
            TicketField::Photo => &["PhotoUrl", "Photo", "Foto", "Bukti Foto"],
        }
    }
}

/// Candidate value for a column before it is shaped by the column's type.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(i64),
    Timestamp(OffsetDateTime),
}

impl FieldValue {
    fn as_text(&self) -> String {
        match self {
            FieldValue::Text(value) => value.clone(),
            FieldValue::Number(value) => value.to_string(),
            FieldValue::Timestamp(value) => format_timestamp(*value),
        }
    }
}

/// Everything needed to map a new ticket besides the catalog.
#[derive(Clone, Debug)]
pub struct TicketDraft<'a> {
    pub ticket: &'a NewTicket,
    pub ticket_number: Option<i64>,
    pub reported_at: OffsetDateTime,
    pub default_assignee: Option<&'a str>,
}

/// Fields patched onto an item when it is resolved.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolutionPatch {
    pub fields: Map<String, Value>,
    pub status: Option<String>,
}

/// Application fields resolved against one catalog. Rebuilt together with
/// the catalog; a column is claimed by at most one field.
#[derive(Clone, Debug, Default)]
pub struct TicketLayout {
    columns: BTreeMap<TicketField, ColumnDescriptor>,
}

impl TicketLayout {
    pub fn resolve(catalog: &FieldCatalog) -> Self {
        let mut columns = BTreeMap::new();
        let mut claimed = BTreeSet::new();
        for field in TicketField::ALL {
            let Some(column) = catalog.find(field.aliases()) else {
                continue;
            };
            if !claimed.insert(column.internal_name.clone()) {
                continue;
            }
            columns.insert(field, column.clone());
        }
        Self { columns }
    }

    pub fn column(&self, field: TicketField) -> Option<&ColumnDescriptor> {
        self.columns.get(&field)
    }

    pub fn internal_name(&self, field: TicketField) -> Option<&str> {
        self.column(field).map(|column| column.internal_name.as_str())
    }

    /// The numeric column carrying sequential ticket numbers, if the list has one.
    pub fn sequence_column(&self) -> Option<&ColumnDescriptor> {
        self.column(TicketField::TicketNumber)
            .filter(|column| column.column_type == ColumnType::Number)
    }

    /// Internal names to request when listing tickets.
    pub fn projection(&self) -> Vec<String> {
        let mut select: Vec<String> = self
            .columns
            .values()
            .map(|column| column.internal_name.clone())
            .collect();
        select.push(CREATED_COLUMN.to_string());
        select
    }

    /// Label a new ticket starts in, `None` without a status column.
    pub fn open_status(&self) -> Option<String> {
        status_label(self.column(TicketField::Status), OPEN_STATUS_PREFERENCE)
    }

    /// Label a resolved ticket is moved to, `None` without a status column.
    pub fn done_status(&self) -> Option<String> {
        status_label(self.column(TicketField::Status), DONE_STATUS_PREFERENCE)
    }

    pub fn map_new_ticket(
        &self,
        draft: &TicketDraft<'_>,
        catalog: &FieldCatalog,
    ) -> Map<String, Value> {
        let ticket = draft.ticket;
        let mut candidates = vec![
            (TicketField::Title, FieldValue::Text(ticket.summary())),
            (
                TicketField::Requester,
                FieldValue::Text(ticket.requester_name.trim().to_string()),
            ),
            (
                TicketField::Division,
                FieldValue::Text(ticket.division.trim().to_string()),
            ),
            (
                TicketField::Description,
                FieldValue::Text(ticket.description.clone()),
            ),
            (
                TicketField::IncidentDescription,
                FieldValue::Text(ticket.description.clone()),
            ),
            (
                TicketField::ReportedAt,
                FieldValue::Timestamp(draft.reported_at),
            ),
        ];
        if let Some(status) = self.open_status() {
            candidates.push((TicketField::Status, FieldValue::Text(status)));
        }
        if let Some(assignee) = draft.default_assignee.filter(|value| !value.trim().is_empty()) {
            candidates.push((TicketField::Assignee, FieldValue::Text(assignee.to_string())));
        }
        if let (Some(number), Some(_)) = (draft.ticket_number, self.sequence_column()) {
            candidates.push((TicketField::TicketNumber, FieldValue::Number(number)));
        }

        let mut fields = Map::new();
        for (field, value) in candidates {
            if let Some(column) = self.column(field)
                && let Some(shaped) = coerce(column, &value)
            {
                fields.insert(column.internal_name.clone(), shaped);
            }
        }

        fill_required_defaults(&mut fields, catalog, draft.reported_at);
        fields
    }

    pub fn map_resolution(
        &self,
        notes: Option<&str>,
        resolved_at: OffsetDateTime,
    ) -> ResolutionPatch {
        let mut patch = ResolutionPatch::default();
        let status = self.done_status();
        let mut candidates = vec![(TicketField::ResolvedAt, FieldValue::Timestamp(resolved_at))];
        if let Some(status) = &status {
            candidates.push((TicketField::Status, FieldValue::Text(status.clone())));
        }
        if let Some(notes) = notes.map(str::trim).filter(|value| !value.is_empty()) {
            candidates.push((TicketField::ResolutionNotes, FieldValue::Text(notes.to_string())));
        }

        for (field, value) in candidates {
            if let Some(column) = self.column(field)
                && let Some(shaped) = coerce(column, &value)
            {
                patch.fields.insert(column.internal_name.clone(), shaped);
            }
        }
        patch.status = status;
        patch
    }

    /// Build the application view of a projected list item.
    pub fn ticket_from_fields(&self, id: &str, fields: &Map<String, Value>) -> Ticket {
        let text = |field: TicketField| {
            self.internal_name(field)
                .and_then(|name| fields.get(name))
                .and_then(text_value)
        };
        let timestamp = |field: Option<&str>| {
            field
                .and_then(|name| fields.get(name))
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
        };

        let status = text(TicketField::Status);
        let state = match status.as_deref() {
            Some(label) if is_done_label(label) => LifecycleState::Resolved,
            _ => LifecycleState::Open,
        };

        Ticket {
            id: id.to_string(),
            ticket_number: self
                .internal_name(TicketField::TicketNumber)
                .and_then(|name| fields.get(name))
                .and_then(numeric_value),
            requester_name: text(TicketField::Requester),
            division: text(TicketField::Division),
            description: text(TicketField::Description)
                .or_else(|| text(TicketField::IncidentDescription)),
            status,
            state,
            created_at: timestamp(Some(CREATED_COLUMN)),
            resolved_at: timestamp(self.internal_name(TicketField::ResolvedAt)),
            resolution_notes: text(TicketField::ResolutionNotes),
            photo_url: self
                .internal_name(TicketField::Photo)
                .and_then(|name| fields.get(name))
                .and_then(photo_url_value),
        }
    }
}

/// Map a new ticket onto a list's internal column names.
pub fn map_ticket_to_fields(draft: &TicketDraft<'_>, catalog: &FieldCatalog) -> Map<String, Value> {
    TicketLayout::resolve(catalog).map_new_ticket(draft, catalog)
}

/// Keep the candidate when the column allows it, otherwise the column's
/// first choice. The raw candidate is only returned for an empty choice set.
pub fn pick_choice(candidate: &str, choices: &[String]) -> String {
    if let Some(choice) = choices
        .iter()
        .find(|choice| choice.as_str() == candidate)
        .or_else(|| {
            choices
                .iter()
                .find(|choice| choice.eq_ignore_ascii_case(candidate))
        })
    {
        return choice.clone();
    }
    choices
        .first()
        .cloned()
        .unwrap_or_else(|| candidate.to_string())
}

/// First preferred label that exists among `choices`, else the first choice.
pub fn pick_preferred(choices: &[String], preference: &[&str]) -> Option<String> {
    preference
        .iter()
        .find_map(|wanted| {
            choices
                .iter()
                .find(|choice| choice.eq_ignore_ascii_case(wanted))
        })
        .or_else(|| choices.first())
        .cloned()
}

fn status_label(column: Option<&ColumnDescriptor>, preference: &[&str]) -> Option<String> {
    let column = column?;
    match &column.column_type {
        ColumnType::Choice(choices) => pick_preferred(choices, preference)
            .or_else(|| preference.first().map(|label| label.to_string())),
        _ => preference.first().map(|label| label.to_string()),
    }
}

pub fn is_done_label(label: &str) -> bool {
    DONE_STATUS_PREFERENCE
        .iter()
        .any(|done| done.eq_ignore_ascii_case(label.trim()))
}

pub fn is_open_label(label: &str) -> bool {
    OPEN_STATUS_PREFERENCE
        .iter()
        .any(|open| open.eq_ignore_ascii_case(label.trim()))
}

/// Shape a candidate for a column, `None` when the column cannot hold it.
pub fn coerce(column: &ColumnDescriptor, value: &FieldValue) -> Option<Value> {
    match (&column.column_type, value) {
        (ColumnType::Choice(choices), value) => {
            Some(Value::String(pick_choice(&value.as_text(), choices)))
        }
        (ColumnType::Text, value) => Some(Value::String(value.as_text())),
        (ColumnType::Number, FieldValue::Number(number)) => Some(Value::from(*number)),
        (ColumnType::Number, FieldValue::Text(raw)) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        (ColumnType::DateTime, FieldValue::Timestamp(at)) => {
            Some(Value::String(format_timestamp(*at)))
        }
        (ColumnType::DateTime, FieldValue::Text(raw)) => {
            parse_timestamp(raw).map(|at| Value::String(format_timestamp(at)))
        }
        (ColumnType::Number, FieldValue::Timestamp(_))
        | (ColumnType::DateTime, FieldValue::Number(_))
        | (ColumnType::Person, _)
        | (ColumnType::Lookup, _) => None,
    }
}

/// Value synthesised for a required column the form did not fill.
pub fn default_for(column: &ColumnDescriptor, now: OffsetDateTime) -> Option<Value> {
    match &column.column_type {
        ColumnType::Choice(choices) => choices.first().cloned().map(Value::String),
        ColumnType::DateTime => Some(Value::String(format_timestamp(now))),
        ColumnType::Number => Some(Value::from(0)),
        ColumnType::Text => Some(Value::String(TEXT_PLACEHOLDER.to_string())),
        ColumnType::Person | ColumnType::Lookup => None,
    }
}

fn fill_required_defaults(fields: &mut Map<String, Value>, catalog: &FieldCatalog, now: OffsetDateTime) {
    for column in catalog.required_columns() {
        if fields.contains_key(&column.internal_name) {
            continue;
        }
        match default_for(column, now) {
            Some(value) => {
                fields.insert(column.internal_name.clone(), value);
            }
            None => tracing::debug!(
                column = %column.internal_name,
                kind = column.column_type.as_str(),
                "required column has no synthesisable default"
            ),
        }
    }
}

/// Integer view of a list value. SharePoint returns numbers as floats and
/// occasionally as strings.
pub fn numeric_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite())
                .map(|float| float.trunc() as i64)
        }),
        Value::String(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|float| float.is_finite())
            .map(|float| float.trunc() as i64),
        _ => None,
    }
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn photo_url_value(value: &Value) -> Option<String> {
    match value {
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        Value::Object(link) => link
            .get("Url")
            .or_else(|| link.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}

/// Filter accepted by the ticket listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusFilter {
    Open,
    Resolved,
    Label(String),
}

impl StatusFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.eq_ignore_ascii_case("open") {
            return Some(StatusFilter::Open);
        }
        if trimmed.eq_ignore_ascii_case("resolved") {
            return Some(StatusFilter::Resolved);
        }
        Some(StatusFilter::Label(trimmed.to_string()))
    }

    pub fn matches(&self, status: Option<&str>) -> bool {
        match self {
            StatusFilter::Open => status.is_some_and(is_open_label),
            StatusFilter::Resolved => status.is_some_and(is_done_label),
            StatusFilter::Label(label) => {
                status.is_some_and(|status| status.trim().eq_ignore_ascii_case(label))
            }
        }
    }
}
