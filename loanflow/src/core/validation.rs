//! Mandatory-field validation gate.
//!
//! Evaluates submitted form answers and attached-document references against
//! a resolved field list. Missing fields are a normal verdict, not an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Input widget type of a form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Email,
    Phone,
    Select,
    Textarea,
    File,
    Checkbox,
    Other(String),
}

impl FieldType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "text" => FieldType::Text,
            "number" => FieldType::Number,
            "date" => FieldType::Date,
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "select" | "dropdown" => FieldType::Select,
            "textarea" => FieldType::Textarea,
            "file" | "upload" => FieldType::File,
            "checkbox" => FieldType::Checkbox,
            other => FieldType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Select => "select",
            FieldType::Textarea => "textarea",
            FieldType::File => "file",
            FieldType::Checkbox => "checkbox",
            FieldType::Other(raw) => raw,
        }
    }
}

impl From<String> for FieldType {
    fn from(raw: String) -> Self {
        FieldType::parse(&raw)
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_str().to_string()
    }
}

/// One field required by a client/product form configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub display_order: i64,
}

/// A mandatory field found empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingField {
    pub field_id: String,
    pub label: String,
    pub field_type: FieldType,
}

/// Pass/fail result of the gate. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub passed: bool,
    /// Empty mandatory fields in resolver order.
    pub missing: Vec<MissingField>,
}

impl ValidationVerdict {
    pub fn missing_ids(&self) -> Vec<&str> {
        self.missing.iter().map(|field| field.field_id.as_str()).collect()
    }
}

/// Document links keyed by the form field they satisfy.
pub type DocumentLinks = HashMap<String, String>;

/// Evaluate `form_data` and `documents` against `fields`.
///
/// Only mandatory descriptors are checked. Emptiness is decided by type:
/// - `file`: no non-blank document link and no non-blank inline value
/// - `checkbox`: value is neither `true` nor the string `"true"`
/// - otherwise: value absent/null, or a string blank after trimming
pub fn validate_mandatory_fields(
    fields: &[FieldDescriptor],
    form_data: &Map<String, Value>,
    documents: &DocumentLinks,
) -> ValidationVerdict {
    let missing: Vec<MissingField> = fields
        .iter()
        .filter(|field| field.mandatory)
        .filter(|field| is_field_empty(field, form_data.get(&field.id), documents))
        .map(|field| MissingField {
            field_id: field.id.clone(),
            label: field.label.clone(),
            field_type: field.field_type.clone(),
        })
        .collect();

    ValidationVerdict {
        passed: missing.is_empty(),
        missing,
    }
}

fn is_field_empty(field: &FieldDescriptor, value: Option<&Value>, documents: &DocumentLinks) -> bool {
    match field.field_type {
        FieldType::File => {
            let has_link = documents
                .get(&field.id)
                .is_some_and(|link| !link.trim().is_empty());
            !has_link && is_blank(value)
        }
        FieldType::Checkbox => !matches!(value, Some(Value::Bool(true)))
            && !matches!(value, Some(Value::String(s)) if s == "true"),
        _ => is_blank(value),
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Parse the comma-joined `Documents` column into per-field links.
///
/// Entries have the form `fieldId:link`. Entries without a field prefix (a
/// bare link such as `https://...`) satisfy no field and are skipped.
pub fn parse_document_links(raw: &str) -> DocumentLinks {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            let (field_id, link) = entry.split_once(':')?;
            if link.starts_with("//") || field_id.trim().is_empty() {
                return None;
            }
            Some((field_id.trim().to_string(), link.trim().to_string()))
        })
        .filter(|(_, link)| !link.is_empty())
        .collect()
}

/// Render links back to the `Documents` column format, ordered by field id.
pub fn format_document_links(links: &DocumentLinks) -> String {
    let mut entries: Vec<(&String, &String)> = links.iter().collect();
    entries.sort();
    entries
        .into_iter()
        .map(|(field_id, link)| format!("{field_id}:{link}"))
        .collect::<Vec<_>>()
        .join(",")
}
