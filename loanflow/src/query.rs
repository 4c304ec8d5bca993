//! Query threads: raising, replying, resolving and reading.
//!
//! Query flows append the audit entry first and then move the application
//! status when the action implies a move. The engine decides the move before
//! either write, so an invalid raise writes nothing. If the status write fails
//! after the append succeeded the caller gets [`WorkflowError::PartialWrite`].

use tracing::{info, instrument, warn};

use crate::core::model::{AuditDraft, LoanApplication, QueryEntry};
use crate::core::query_content::{build_content, update_status};
use crate::core::records::{self, audit};
use crate::core::thread::{QueryThread, ThreadIndex, build_thread, build_thread_index, reply_anchor};
use crate::core::transitions::{QueryAction, query_transition};
use crate::core::types::{Actor, AuditAction, QueryStatus, Role, Status};
use crate::error::{WorkflowError, WriteStep};
use crate::io::forms::FormConfigResolver;
use crate::io::store::RecordStore;
use crate::workflow::{Workflow, belongs_to};

/// Result of posting a query or a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPosted {
    pub entry_id: String,
    pub application_id: String,
    /// Thread root a reply was attached to; `None` for a raise.
    pub parent_id: Option<String>,
    /// Status move applied alongside the entry, if any.
    pub status_change: Option<(Status, Status)>,
}

impl<S: RecordStore, F: FormConfigResolver> Workflow<S, F> {
    /// Open a new query thread on an application.
    ///
    /// A KAM raise moves `under_kam_review` to `query_with_client`; a credit
    /// raise moves `pending_credit_review` to `credit_query_with_kam`. When
    /// `target` is unset the entry is addressed to the role being queried.
    #[instrument(skip(self, actor, message), fields(actor = %actor.id, role = %actor.role))]
    pub async fn raise_query(
        &self,
        actor: &Actor,
        application_id: &str,
        message: &str,
        target: Option<&str>,
    ) -> Result<QueryPosted, WorkflowError> {
        let content = build_content(message, None, QueryStatus::Open)?;
        let current = self.load_application(application_id).await?;
        self.authorize(actor, &current)?;

        let next = query_transition(&self.policy, actor.role, QueryAction::Raise, current.status)?;
        let target = target.or(match actor.role {
            Role::Kam => Some(Role::Client.as_str()),
            Role::Credit => Some(Role::Kam.as_str()),
            _ => None,
        });

        let draft = AuditDraft {
            file_id: current.display_id(),
            actor,
            action: AuditAction::QueryRaised,
            message: content,
            target,
            resolved: false,
        };
        self.post_query(actor, &current.id, current.status, next, draft, None)
            .await
    }

    /// Reply under an existing query entry.
    ///
    /// Replying to a reply attaches to that reply's root. A client reply
    /// while the application is `query_with_client` moves it back to
    /// `under_kam_review`; a KAM reply to a credit query moves it back to
    /// `pending_credit_review`. Other replies leave the status alone.
    #[instrument(skip(self, actor, message), fields(actor = %actor.id, role = %actor.role))]
    pub async fn respond_to_query(
        &self,
        actor: &Actor,
        application_id: &str,
        parent_id: &str,
        message: &str,
    ) -> Result<QueryPosted, WorkflowError> {
        if message.trim().is_empty() {
            return Err(WorkflowError::EmptyMessage);
        }
        let (current, entries) = self.load_with_entries(application_id).await?;
        self.authorize(actor, &current)?;

        let root = reply_anchor(&entries, parent_id).ok_or_else(|| WorkflowError::NotFound {
            table: self.tables.audit_log.clone(),
            id: parent_id.to_string(),
        })?;
        if root.id != parent_id {
            info!(parent_id, root = %root.id, "reply to a reply attached to thread root");
        }
        let content = build_content(message, Some(&root.id), QueryStatus::Open)?;
        let next = query_transition(&self.policy, actor.role, QueryAction::Reply, current.status)?;

        let draft = AuditDraft {
            file_id: current.display_id(),
            actor,
            action: AuditAction::QueryReply,
            message: content,
            target: root.actor.as_deref(),
            resolved: false,
        };
        self.post_query(actor, &current.id, current.status, next, draft, Some(root.id.clone()))
            .await
    }

    async fn post_query(
        &self,
        actor: &Actor,
        application_id: &str,
        current: Status,
        next: Option<Status>,
        draft: AuditDraft<'_>,
        parent_id: Option<String>,
    ) -> Result<QueryPosted, WorkflowError> {
        let posted = self.append_audit(draft).await?;

        let status_change = match next {
            Some(to) => {
                self.write_status(application_id, current, to, actor.role, |_| {})
                    .await
                    .map_err(|err| {
                        WorkflowError::partial(application_id, Some(to), WriteStep::AuditAppend, err)
                    })?;
                Some((current, to))
            }
            None => None,
        };

        info!(entry_id = %posted.id, ?status_change, "query entry posted");
        Ok(QueryPosted {
            entry_id: posted.id,
            application_id: application_id.to_string(),
            parent_id,
            status_change,
        })
    }

    /// Mark a query entry resolved or open again.
    ///
    /// Rewrites the embedded status token and the `Resolved` column, then
    /// re-posts the full record. Application status is never touched.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn set_query_status(
        &self,
        actor: &Actor,
        entry_id: &str,
        status: QueryStatus,
    ) -> Result<QueryEntry, WorkflowError> {
        let entry = self
            .load_audit_entries()
            .await?
            .into_iter()
            .find(|entry| entry.id == entry_id && entry.action.is_query())
            .ok_or_else(|| WorkflowError::NotFound {
                table: self.tables.audit_log.clone(),
                id: entry_id.to_string(),
            })?;
        self.authorize_entry(actor, &entry).await?;

        let raw = records::text(&entry.record, audit::MESSAGE).unwrap_or_default();
        let mut record = entry.record;
        records::set_text(&mut record, audit::MESSAGE, update_status(&raw, status));
        record.insert(
            audit::RESOLVED.to_string(),
            records::flag_value(status == QueryStatus::Resolved),
        );
        self.store
            .post_record(&self.tables.audit_log, record.clone())
            .await?;
        info!(entry_id, %status, "query status updated");
        QueryEntry::from_record(&self.tables.audit_log, record)
    }

    pub async fn resolve_query(
        &self,
        actor: &Actor,
        entry_id: &str,
    ) -> Result<QueryEntry, WorkflowError> {
        self.set_query_status(actor, entry_id, QueryStatus::Resolved)
            .await
    }

    pub async fn reopen_query(&self, actor: &Actor, entry_id: &str) -> Result<QueryEntry, WorkflowError> {
        self.set_query_status(actor, entry_id, QueryStatus::Open).await
    }

    /// Every query thread of an application, oldest root first.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn query_threads(
        &self,
        actor: &Actor,
        application_id: &str,
    ) -> Result<ThreadIndex, WorkflowError> {
        let (current, entries) = self.load_with_entries(application_id).await?;
        self.authorize(actor, &current)?;
        let index = build_thread_index(&entries);
        if !index.orphans.is_empty() {
            warn!(
                application = current.display_id(),
                orphans = index.orphans.len(),
                "replies reference missing thread roots"
            );
        }
        Ok(index)
    }

    /// One thread by its root entry id.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn thread(&self, actor: &Actor, root_id: &str) -> Result<QueryThread, WorkflowError> {
        let entries = self.load_audit_entries().await?;
        let not_found = || WorkflowError::NotFound {
            table: self.tables.audit_log.clone(),
            id: root_id.to_string(),
        };
        let root = entries
            .iter()
            .find(|entry| entry.id == root_id && entry.action.is_query())
            .ok_or_else(not_found)?;
        let application = self.authorize_entry(actor, root).await?;

        let scoped: Vec<QueryEntry> = match &application {
            Some(application) => entries
                .into_iter()
                .filter(|entry| belongs_to(entry, application))
                .collect(),
            None => entries,
        };
        build_thread(&scoped, root_id).ok_or_else(not_found)
    }

    /// Check `actor` against the application an entry belongs to. Clients
    /// must own it; other roles may act on entries whose application is gone.
    async fn authorize_entry(
        &self,
        actor: &Actor,
        entry: &QueryEntry,
    ) -> Result<Option<LoanApplication>, WorkflowError> {
        let application = match entry.file_id.as_deref() {
            Some(file) => self.application_for_file(file).await?,
            None => None,
        };
        match &application {
            Some(application) => self.authorize(actor, application)?,
            None if actor.role == Role::Client => {
                return Err(WorkflowError::forbidden(format!(
                    "{} cannot act on query entry {} without an owned application",
                    actor.id, entry.id
                )));
            }
            None => {}
        }
        Ok(application)
    }
}
