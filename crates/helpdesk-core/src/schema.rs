//! SharePoint column metadata and the write-eligible field catalog derived
//! from it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Internal names SharePoint manages itself; never written by the broker.
pub const RESERVED_COLUMNS: &[&str] = &[
    "Attachments",
    "ContentType",
    "Edit",
    "DocIcon",
    "ID",
    "UniqueId",
    "FileRef",
];

const LINK_TITLE_PREFIX: &str = "LinkTitle";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "choices", rename_all = "camelCase")]
pub enum ColumnType {
    Text,
    Choice(Vec<String>),
    Person,
    Lookup,
    DateTime,
    Number,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Choice(_) => "choice",
            ColumnType::Person => "person",
            ColumnType::Lookup => "lookup",
            ColumnType::DateTime => "dateTime",
            ColumnType::Number => "number",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub display_name: String,
    pub internal_name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub required: bool,
    pub read_only: bool,
    pub hidden: bool,
}

impl ColumnDescriptor {
    /// Allowed values, empty for anything but choice columns.
    pub fn choices(&self) -> &[String] {
        match &self.column_type {
            ColumnType::Choice(choices) => choices,
            _ => &[],
        }
    }

    pub fn is_writable(&self) -> bool {
        !self.read_only && !self.hidden && !is_reserved(&self.internal_name)
    }
}

pub fn is_reserved(internal_name: &str) -> bool {
    RESERVED_COLUMNS.contains(&internal_name) || internal_name.starts_with(LINK_TITLE_PREFIX)
}

/// Column record as returned by `GET /sites/{site}/lists/{list}/columns`.
/// The column type is signalled by which facet object is present.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawColumn {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub choice: Option<RawChoice>,
    #[serde(default)]
    pub person_or_group: Option<Value>,
    #[serde(default)]
    pub lookup: Option<Value>,
    #[serde(default)]
    pub date_time: Option<Value>,
    #[serde(default)]
    pub number: Option<Value>,
    #[serde(default)]
    pub calculated: Option<Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawChoice {
    #[serde(default)]
    pub choices: Vec<String>,
}

impl RawColumn {
    pub fn is_calculated(&self) -> bool {
        self.calculated.is_some()
    }

    pub fn column_type(&self) -> ColumnType {
        if let Some(choice) = &self.choice {
            ColumnType::Choice(choice.choices.clone())
        } else if self.person_or_group.is_some() {
            ColumnType::Person
        } else if self.lookup.is_some() {
            ColumnType::Lookup
        } else if self.date_time.is_some() {
            ColumnType::DateTime
        } else if self.number.is_some() {
            ColumnType::Number
        } else {
            ColumnType::Text
        }
    }

    /// `None` for columns the broker must never target: system, hidden,
    /// read-only and calculated ones.
    pub fn into_descriptor(self) -> Option<ColumnDescriptor> {
        if self.is_calculated() || self.name.is_empty() {
            return None;
        }
        let column_type = self.column_type();
        let display_name = if self.display_name.is_empty() {
            self.name.clone()
        } else {
            self.display_name
        };
        let descriptor = ColumnDescriptor {
            display_name,
            internal_name: self.name,
            column_type,
            required: self.required,
            read_only: self.read_only,
            hidden: self.hidden,
        };
        descriptor.is_writable().then_some(descriptor)
    }
}

/// Write-eligible columns of one list, indexed by display name. Built once
/// per context refresh and replaced wholesale, never patched.
#[derive(Clone, Debug, Default)]
pub struct FieldCatalog {
    columns: Vec<ColumnDescriptor>,
    by_display_name: HashMap<String, usize>,
}

impl FieldCatalog {
    pub fn from_raw(raw: impl IntoIterator<Item = RawColumn>) -> Self {
        Self::from_descriptors(raw.into_iter().filter_map(RawColumn::into_descriptor))
    }

    /// First descriptor wins when two columns share a display name.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ColumnDescriptor>) -> Self {
        let mut catalog = Self::default();
        for descriptor in descriptors {
            if !descriptor.is_writable() {
                continue;
            }
            if catalog.by_display_name.contains_key(&descriptor.display_name) {
                tracing::debug!(
                    display_name = %descriptor.display_name,
                    internal_name = %descriptor.internal_name,
                    "duplicate column display name ignored"
                );
                continue;
            }
            catalog
                .by_display_name
                .insert(descriptor.display_name.clone(), catalog.columns.len());
            catalog.columns.push(descriptor);
        }
        catalog
    }

    pub fn get(&self, display_name: &str) -> Option<&ColumnDescriptor> {
        self.by_display_name
            .get(display_name)
            .map(|index| &self.columns[*index])
    }

    /// First alias naming a catalogued column, exact match before a
    /// case-insensitive one.
    pub fn find(&self, aliases: &[&str]) -> Option<&ColumnDescriptor> {
        aliases
            .iter()
            .find_map(|alias| self.get(alias))
            .or_else(|| {
                aliases.iter().find_map(|alias| {
                    self.columns
                        .iter()
                        .find(|column| column.display_name.eq_ignore_ascii_case(alias))
                })
            })
    }

    pub fn by_internal_name(&self, internal_name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|column| column.internal_name == internal_name)
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|column| column.required)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
