//! Error taxonomy for workflow operations.
//!
//! Pure engines only produce logical variants (`InvalidTransition`,
//! `UnknownStatus`, `UnknownRole`, `EmptyMessage`). I/O failures and
//! `PartialWrite` originate in the orchestrator.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::core::types::{Role, Status};

/// Failure reported by a record-store gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store request to {table} failed: {message}")]
    Transport { table: String, message: String },
    #[error("record store returned HTTP {status} for {table}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },
    #[error("record store payload for {table} could not be decoded: {message}")]
    Decode { table: String, message: String },
    #[error("record store post to {table} returned no id")]
    MissingId { table: String },
}

/// Which half of a two-write flow completed before the other failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    StatusUpdate,
    AuditAppend,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStep::StatusUpdate => f.write_str("status update"),
            WriteStep::AuditAppend => f.write_str("audit log append"),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("{role} may not move {from} -> {to} (allowed: {})", format_allowed(.allowed))]
    InvalidTransition {
        from: Status,
        to: Status,
        role: Role,
        allowed: BTreeSet<Status>,
    },

    #[error("unknown status '{value}'")]
    UnknownStatus { value: String },

    #[error("unknown role '{value}'")]
    UnknownRole { value: String },

    #[error("form configuration unavailable for client={client_id} product={product_id}: {message}")]
    ConfigUnavailable {
        client_id: String,
        product_id: String,
        message: String,
    },

    #[error(
        "partial write on application {application_id} (attempted status {attempted_status:?}): \
         {completed} succeeded, {failed} failed: {source}"
    )]
    PartialWrite {
        application_id: String,
        attempted_status: Option<Status>,
        completed: WriteStep,
        failed: WriteStep,
        #[source]
        source: Box<WorkflowError>,
    },

    #[error("application {application_id} changed concurrently: expected {expected}, found {found}")]
    Conflict {
        application_id: String,
        expected: Status,
        found: Status,
    },

    #[error("application {application_id} is missing mandatory fields: {}", .missing.join(", "))]
    Incomplete {
        application_id: String,
        missing: Vec<String>,
    },

    #[error("query message must not be blank")]
    EmptyMessage,

    #[error("{table} record '{id}' not found")]
    NotFound { table: String, id: String },

    #[error("malformed {table} record '{id}': {message}")]
    MalformedRecord {
        table: String,
        id: String,
        message: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        WorkflowError::Forbidden {
            reason: reason.into(),
        }
    }
}

impl WorkflowError {
    /// Wrap the failure of the second write of a two-write flow.
    pub fn partial(
        application_id: impl Into<String>,
        attempted_status: Option<Status>,
        completed: WriteStep,
        source: impl Into<WorkflowError>,
    ) -> Self {
        let failed = match completed {
            WriteStep::StatusUpdate => WriteStep::AuditAppend,
            WriteStep::AuditAppend => WriteStep::StatusUpdate,
        };
        WorkflowError::PartialWrite {
            application_id: application_id.into(),
            attempted_status,
            completed,
            failed,
            source: Box::new(source.into()),
        }
    }
}

fn format_allowed(allowed: &BTreeSet<Status>) -> String {
    if allowed.is_empty() {
        return "none".to_string();
    }
    allowed
        .iter()
        .map(|status| status.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
