//! The workflow orchestrator: the only component that writes to the store.
//!
//! Operations are split across [`crate::submit`], [`crate::query`] and
//! [`crate::status`]; this module holds the shared state and the read and
//! write helpers they compose.
//!
//! The store offers no optimistic locking. Status writes re-read the
//! application immediately before posting and merge onto the fresh record,
//! which narrows the read-modify-write window without closing it: two
//! concurrent writers to the same application can still race.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::core::model::{AuditDraft, LoanApplication, QueryEntry, apply_status};
use crate::core::policy::WorkflowPolicy;
use crate::core::records::Record;
use crate::core::transitions::validate_transition;
use crate::core::types::{Actor, AuditAction, Role, Status};
use crate::error::{StoreError, WorkflowError, WriteStep};
use crate::io::config::TableNames;
use crate::io::forms::FormConfigResolver;
use crate::io::store::{PostedRecord, RecordStore, fetch_by_id};

pub struct Workflow<S, F> {
    pub(crate) store: Arc<S>,
    pub(crate) forms: Arc<F>,
    pub(crate) policy: Arc<WorkflowPolicy>,
    pub(crate) tables: TableNames,
}

/// A committed status change and the audit entry recording it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub application: LoanApplication,
    pub from: Status,
    pub to: Status,
    pub audit_entry_id: String,
}

impl<S: RecordStore, F: FormConfigResolver> Workflow<S, F> {
    pub fn new(
        store: Arc<S>,
        forms: Arc<F>,
        policy: Arc<WorkflowPolicy>,
        tables: TableNames,
    ) -> Self {
        Self {
            store,
            forms,
            policy,
            tables,
        }
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub(crate) async fn load_application(&self, id: &str) -> Result<LoanApplication, WorkflowError> {
        let record = fetch_by_id(self.store.as_ref(), &self.tables.applications, id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound {
                table: self.tables.applications.clone(),
                id: id.to_string(),
            })?;
        LoanApplication::from_record(&self.policy, &self.tables.applications, record)
    }

    /// The application an audit entry's file reference points at, matched by
    /// record id or `File ID`.
    pub(crate) async fn application_for_file(
        &self,
        file: &str,
    ) -> Result<Option<LoanApplication>, WorkflowError> {
        let rows = self.store.fetch_table(&self.tables.applications).await?;
        for record in rows {
            let application =
                match LoanApplication::from_record(&self.policy, &self.tables.applications, record) {
                    Ok(application) => application,
                    Err(err) => {
                        debug!(error = %err, "skipping undecodable application row");
                        continue;
                    }
                };
            if application.id == file || application.file_id.as_deref() == Some(file) {
                return Ok(Some(application));
            }
        }
        Ok(None)
    }

    /// Every decodable audit-log entry, in store order. Rows without an id
    /// are skipped with a warning.
    pub(crate) async fn load_audit_entries(&self) -> Result<Vec<QueryEntry>, WorkflowError> {
        let rows = self.store.fetch_table(&self.tables.audit_log).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for record in rows {
            match QueryEntry::from_record(&self.tables.audit_log, record) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(error = %err, "skipping audit log row"),
            }
        }
        Ok(entries)
    }

    /// Application and its audit-log entries, fetched concurrently.
    pub(crate) async fn load_with_entries(
        &self,
        id: &str,
    ) -> Result<(LoanApplication, Vec<QueryEntry>), WorkflowError> {
        let (application, entries) =
            tokio::try_join!(self.load_application(id), self.load_audit_entries())?;
        let entries = entries
            .into_iter()
            .filter(|entry| belongs_to(entry, &application))
            .collect();
        Ok((application, entries))
    }

    /// Fail unless `actor` may act on `application`. Clients are limited to
    /// applications of their own client organization.
    pub(crate) fn authorize(
        &self,
        actor: &Actor,
        application: &LoanApplication,
    ) -> Result<(), WorkflowError> {
        if actor.role == Role::Client && !application.is_owned_by(actor) {
            return Err(WorkflowError::forbidden(format!(
                "{} does not own application {}",
                actor.id,
                application.display_id()
            )));
        }
        Ok(())
    }

    pub(crate) async fn append_audit(&self, draft: AuditDraft<'_>) -> Result<PostedRecord, StoreError> {
        let record = draft.into_record(Utc::now());
        self.store.post_record(&self.tables.audit_log, record).await
    }

    /// Move the application to `to`, re-reading it first.
    ///
    /// Fails with [`WorkflowError::Conflict`] when the fresh record no longer
    /// has status `expected`, and re-checks the transition against it.
    /// `mutate` may set extra columns on the merged record before it is posted.
    pub(crate) async fn write_status(
        &self,
        application_id: &str,
        expected: Status,
        to: Status,
        role: Role,
        mutate: impl FnOnce(&mut Record),
    ) -> Result<LoanApplication, WorkflowError> {
        let fresh = self.load_application(application_id).await?;
        if fresh.status != expected {
            return Err(WorkflowError::Conflict {
                application_id: application_id.to_string(),
                expected,
                found: fresh.status,
            });
        }
        validate_transition(&self.policy, fresh.status, to, role)?;

        let mut record = fresh.record;
        apply_status(&mut record, to, Utc::now());
        mutate(&mut record);
        self.store
            .post_record(&self.tables.applications, record.clone())
            .await?;
        debug!(application_id, from = %expected, to = %to, "status written");
        LoanApplication::from_record(&self.policy, &self.tables.applications, record)
    }

    /// Status write followed by the audit entry recording it. A failed
    /// append after the status write is reported as a partial write.
    pub(crate) async fn commit_status_change(
        &self,
        actor: &Actor,
        current: &LoanApplication,
        to: Status,
        action: AuditAction,
        detail: Option<&str>,
        mutate: impl FnOnce(&mut Record),
    ) -> Result<StatusChange, WorkflowError> {
        let from = current.status;
        let application = self
            .write_status(&current.id, from, to, actor.role, mutate)
            .await?;

        let mut message = format!("Status changed from {from} to {to}");
        if let Some(detail) = detail.map(str::trim).filter(|d| !d.is_empty()) {
            message.push_str(": ");
            message.push_str(detail);
        }
        let posted = self
            .append_audit(AuditDraft {
                file_id: application.display_id(),
                actor,
                action,
                message,
                target: None,
                resolved: false,
            })
            .await
            .map_err(|err| {
                WorkflowError::partial(&application.id, Some(to), WriteStep::StatusUpdate, err)
            })?;

        Ok(StatusChange {
            application,
            from,
            to,
            audit_entry_id: posted.id,
        })
    }
}

/// True when `entry`'s file reference names `application`.
pub(crate) fn belongs_to(entry: &QueryEntry, application: &LoanApplication) -> bool {
    match entry.file_id.as_deref() {
        Some(file) => file == application.id || Some(file) == application.file_id.as_deref(),
        None => false,
    }
}
