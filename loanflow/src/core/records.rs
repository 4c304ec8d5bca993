//! Column names and value helpers for schemaless store records.
//!
//! The store hands back string-keyed maps whose values may be strings,
//! numbers or booleans regardless of what the column "should" hold. Helpers
//! here read them leniently and write them in the store's conventions.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// One store row.
pub type Record = Map<String, Value>;

pub const ID: &str = "id";

pub mod application {
    pub const FILE_ID: &str = "File ID";
    pub const CLIENT: &str = "Client";
    pub const APPLICANT_NAME: &str = "Applicant Name";
    pub const PRODUCT: &str = "Loan Product";
    pub const REQUESTED_AMOUNT: &str = "Requested Loan Amount";
    pub const APPROVED_AMOUNT: &str = "Approved Loan Amount";
    pub const FORM_DATA: &str = "Form Data";
    pub const DOCUMENTS: &str = "Documents";
    pub const STATUS: &str = "Status";
    pub const ASSIGNED_NBFC: &str = "Assigned NBFC";
    pub const LENDER_DECISION_STATUS: &str = "Lender Decision Status";
    pub const LENDER_DECISION_DATE: &str = "Lender Decision Date";
    pub const LENDER_DECISION_REMARKS: &str = "Lender Decision Remarks";
    pub const CREATION_DATE: &str = "Creation Date";
    pub const SUBMITTED_DATE: &str = "Submitted Date";
    pub const LAST_UPDATED: &str = "Last Updated";
}

pub mod audit {
    pub const FILE: &str = "File";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const ACTOR: &str = "Actor";
    pub const ACTION: &str = "Action/Event Type";
    pub const MESSAGE: &str = "Details/Message";
    pub const TARGET: &str = "Target User/Role";
    pub const RESOLVED: &str = "Resolved";
}

pub mod form_field {
    pub const FIELD_ID: &str = "Field ID";
    pub const LABEL: &str = "Field Label";
    pub const TYPE: &str = "Field Type";
    pub const MANDATORY: &str = "Is Mandatory";
    pub const CATEGORY: &str = "Category";
    pub const DISPLAY_ORDER: &str = "Display Order";
    pub const CLIENT: &str = "Client";
    pub const PRODUCT: &str = "Product";
}

/// Read a column as text. Numbers and booleans are rendered; null is `None`.
pub fn text(record: &Record, column: &str) -> Option<String> {
    match record.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Read a column as text, treating blank strings as absent.
pub fn non_blank(record: &Record, column: &str) -> Option<String> {
    text(record, column).filter(|value| !value.trim().is_empty())
}

/// Read a numeric column that may be stored as a string (`"5,00,000"` included).
pub fn number(record: &Record, column: &str) -> Option<f64> {
    match record.get(column)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

/// Read a boolean-as-string column. Accepts JSON booleans and the usual
/// textual spellings; everything else is `false`.
pub fn flag(record: &Record, column: &str) -> bool {
    match record.get(column) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "y" | "checked"
        ),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Store representation of a boolean flag.
pub fn flag_value(value: bool) -> Value {
    Value::String(if value { "True" } else { "False" }.to_string())
}

pub fn set_text(record: &mut Record, column: &str, value: impl Into<String>) {
    record.insert(column.to_string(), Value::String(value.into()));
}

/// Record id, if present and non-blank.
pub fn id(record: &Record) -> Option<String> {
    non_blank(record, ID)
}

/// Timestamp format written to the store.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Lenient timestamp parsing: RFC 3339, `YYYY-MM-DD HH:MM:SS`, or a bare date.
/// Unparseable values are `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
