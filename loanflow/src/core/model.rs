//! Typed views over application and audit-log records.
//!
//! Records are decoded right after they are read so the engines work on typed
//! data. Each view keeps the record it came from: the store only supports
//! whole-record overwrite, so writes start from the original columns and
//! change only what the operation owns.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::policy::WorkflowPolicy;
use crate::core::query_content::{QueryContent, parse_content};
use crate::core::records::{self, Record, application, audit};
use crate::core::types::{Actor, AuditAction, QueryStatus, Status};
use crate::core::validation::{DocumentLinks, parse_document_links};
use crate::error::WorkflowError;

/// One loan file.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanApplication {
    pub id: String,
    pub file_id: Option<String>,
    pub client_id: String,
    pub applicant_name: Option<String>,
    pub product_id: Option<String>,
    pub requested_amount: Option<f64>,
    pub approved_amount: Option<f64>,
    pub form_data: Map<String, Value>,
    pub documents: DocumentLinks,
    pub status: Status,
    pub assigned_nbfc: Option<String>,
    pub lender_decision_status: Option<String>,
    pub lender_decision_date: Option<String>,
    pub lender_decision_remarks: Option<String>,
    pub created_at: Option<String>,
    pub submitted_at: Option<String>,
    pub last_updated: Option<String>,
    /// The record as read, carried forward on every write.
    pub record: Record,
}

impl LoanApplication {
    /// Decode an application record. Fails on a missing id or an
    /// unrecognized status; never guesses a status.
    pub fn from_record(
        policy: &WorkflowPolicy,
        table: &str,
        record: Record,
    ) -> Result<Self, WorkflowError> {
        let id = records::id(&record).ok_or_else(|| WorkflowError::MalformedRecord {
            table: table.to_string(),
            id: String::new(),
            message: "missing id".to_string(),
        })?;
        let status_raw = records::text(&record, application::STATUS).unwrap_or_default();
        let status = policy.normalize_status(&status_raw)?;

        Ok(Self {
            file_id: records::non_blank(&record, application::FILE_ID),
            client_id: records::non_blank(&record, application::CLIENT).unwrap_or_default(),
            applicant_name: records::non_blank(&record, application::APPLICANT_NAME),
            product_id: records::non_blank(&record, application::PRODUCT),
            requested_amount: records::number(&record, application::REQUESTED_AMOUNT),
            approved_amount: records::number(&record, application::APPROVED_AMOUNT),
            form_data: decode_form_data(&id, record.get(application::FORM_DATA)),
            documents: records::text(&record, application::DOCUMENTS)
                .map(|raw| parse_document_links(&raw))
                .unwrap_or_default(),
            status,
            assigned_nbfc: records::non_blank(&record, application::ASSIGNED_NBFC),
            lender_decision_status: records::non_blank(
                &record,
                application::LENDER_DECISION_STATUS,
            ),
            lender_decision_date: records::non_blank(&record, application::LENDER_DECISION_DATE),
            lender_decision_remarks: records::non_blank(
                &record,
                application::LENDER_DECISION_REMARKS,
            ),
            created_at: records::non_blank(&record, application::CREATION_DATE),
            submitted_at: records::non_blank(&record, application::SUBMITTED_DATE),
            last_updated: records::non_blank(&record, application::LAST_UPDATED),
            id,
            record,
        })
    }

    /// Identifier shown to humans; falls back to the record id.
    pub fn display_id(&self) -> &str {
        self.file_id.as_deref().unwrap_or(&self.id)
    }

    pub fn is_owned_by(&self, actor: &Actor) -> bool {
        actor.owns(&self.client_id)
    }
}

/// Write `status` into `record` along with its bookkeeping columns.
///
/// `Last Updated` is always refreshed. Leaving `Draft` stamps
/// `Submitted Date` unless one is already recorded, so non-draft
/// applications always carry a submission date.
pub fn apply_status(record: &mut Record, status: Status, now: DateTime<Utc>) {
    let stamp = records::format_timestamp(now);
    records::set_text(record, application::STATUS, status.as_str());
    if status != Status::Draft && records::non_blank(record, application::SUBMITTED_DATE).is_none()
    {
        records::set_text(record, application::SUBMITTED_DATE, stamp.clone());
    }
    records::set_text(record, application::LAST_UPDATED, stamp);
}

fn decode_form_data(id: &str, value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(raw)) if raw.trim().is_empty() => Map::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(application_id = id, "form data is not a JSON object; treating as empty");
                Map::new()
            }
        },
        _ => Map::new(),
    }
}

/// One audit-log row, decoded with its embedded query metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEntry {
    pub id: String,
    pub file_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub actor: Option<String>,
    pub action: AuditAction,
    pub content: QueryContent,
    pub target: Option<String>,
    /// The boolean `Resolved` column, written independently of the token.
    pub resolved_flag: bool,
    pub record: Record,
}

impl QueryEntry {
    pub fn from_record(table: &str, record: Record) -> Result<Self, WorkflowError> {
        let id = records::id(&record).ok_or_else(|| WorkflowError::MalformedRecord {
            table: table.to_string(),
            id: String::new(),
            message: "missing id".to_string(),
        })?;
        let raw_message = records::text(&record, audit::MESSAGE).unwrap_or_default();
        Ok(Self {
            file_id: records::non_blank(&record, audit::FILE),
            timestamp: records::text(&record, audit::TIMESTAMP)
                .and_then(|raw| records::parse_timestamp(&raw)),
            actor: records::non_blank(&record, audit::ACTOR),
            action: AuditAction::parse(
                &records::text(&record, audit::ACTION).unwrap_or_default(),
            ),
            content: parse_content(&raw_message),
            target: records::non_blank(&record, audit::TARGET),
            resolved_flag: records::flag(&record, audit::RESOLVED),
            id,
            record,
        })
    }

    /// Resolved if either the embedded token or the column says so.
    pub fn is_resolved(&self) -> bool {
        self.content.status == QueryStatus::Resolved || self.resolved_flag
    }

    pub fn parent(&self) -> Option<&str> {
        self.content.parent.as_deref()
    }
}

/// Fields of a new audit-log row.
#[derive(Debug, Clone)]
pub struct AuditDraft<'a> {
    pub file_id: &'a str,
    pub actor: &'a Actor,
    pub action: AuditAction,
    /// Message column contents, already encoded for query entries.
    pub message: String,
    pub target: Option<&'a str>,
    pub resolved: bool,
}

impl AuditDraft<'_> {
    /// Build the record to post; the store assigns the id.
    pub fn into_record(self, now: DateTime<Utc>) -> Record {
        let mut record = Record::new();
        records::set_text(&mut record, audit::FILE, self.file_id);
        records::set_text(&mut record, audit::TIMESTAMP, records::format_timestamp(now));
        records::set_text(
            &mut record,
            audit::ACTOR,
            format!("{} ({})", self.actor.id, self.actor.role),
        );
        records::set_text(&mut record, audit::ACTION, self.action.as_str());
        records::set_text(&mut record, audit::MESSAGE, self.message);
        records::set_text(&mut record, audit::TARGET, self.target.unwrap_or_default());
        record.insert(audit::RESOLVED.to_string(), records::flag_value(self.resolved));
        record
    }
}
