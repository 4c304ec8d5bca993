//! Submission and creation of loan applications.
//!
//! Submitting runs the mandatory-field gate first. A failing verdict is a
//! normal outcome, not an error: nothing is written and the caller gets the
//! missing fields back.

use chrono::Utc;
use serde_json::{Map, Number, Value};
use tracing::{info, instrument};

use crate::core::model::{AuditDraft, LoanApplication, apply_status};
use crate::core::records::{self, Record, application};
use crate::core::transitions::{allowed_next_statuses, validate_transition};
use crate::core::types::{Actor, AuditAction, Role, Status};
use crate::core::validation::{DocumentLinks, ValidationVerdict, format_document_links};
use crate::error::{WorkflowError, WriteStep};
use crate::io::forms::{FormConfigResolver, validate};
use crate::io::store::RecordStore;
use crate::workflow::{StatusChange, Workflow};

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted {
        application: LoanApplication,
        audit_entry_id: String,
    },
    /// The gate failed; nothing was written.
    Incomplete(ValidationVerdict),
}

/// Fields a client supplies when opening an application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewApplication {
    pub file_id: Option<String>,
    pub applicant_name: Option<String>,
    pub product_id: String,
    pub requested_amount: Option<f64>,
    pub form_data: Map<String, Value>,
    pub documents: DocumentLinks,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created {
        application: LoanApplication,
        audit_entry_id: String,
    },
    /// Submission was requested but the gate failed; nothing was written.
    Incomplete(ValidationVerdict),
}

impl<S: RecordStore, F: FormConfigResolver> Workflow<S, F> {
    /// Submit a draft for KAM review on behalf of its owning client.
    ///
    /// Only drafts can be submitted; an application waiting on a query goes
    /// back to review through a reply, never through resubmission.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn submit_application(
        &self,
        actor: &Actor,
        application_id: &str,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let current = self.load_application(application_id).await?;
        if actor.role != Role::Client || !current.is_owned_by(actor) {
            return Err(WorkflowError::forbidden(format!(
                "only the owning client may submit application {}",
                current.display_id()
            )));
        }

        if current.status != Status::Draft {
            return Err(WorkflowError::InvalidTransition {
                from: current.status,
                to: Status::UnderKamReview,
                role: Role::Client,
                allowed: allowed_next_statuses(&self.policy, current.status, Role::Client),
            });
        }

        let verdict = self.check_mandatory_fields(&current).await?;
        if !verdict.passed {
            info!(missing = ?verdict.missing_ids(), "submission blocked by missing fields");
            return Ok(SubmitOutcome::Incomplete(verdict));
        }

        validate_transition(&self.policy, current.status, Status::UnderKamReview, Role::Client)?;
        let StatusChange {
            application,
            audit_entry_id,
            ..
        } = self
            .commit_status_change(
                actor,
                &current,
                Status::UnderKamReview,
                AuditAction::StatusChange,
                None,
                |_| {},
            )
            .await?;
        info!(application = application.display_id(), "application submitted");
        Ok(SubmitOutcome::Submitted {
            application,
            audit_entry_id,
        })
    }

    /// Open a new application for the actor's client, as a draft or, when
    /// `submit_now` is set and the gate passes, directly under KAM review.
    #[instrument(skip(self, actor, new), fields(actor = %actor.id, product = %new.product_id))]
    pub async fn create_application(
        &self,
        actor: &Actor,
        new: NewApplication,
        submit_now: bool,
    ) -> Result<CreateOutcome, WorkflowError> {
        let client_id = match (actor.role, actor.client_id.as_deref()) {
            (Role::Client, Some(client_id)) if !client_id.trim().is_empty() => client_id,
            _ => {
                return Err(WorkflowError::forbidden(
                    "only a client with a client id may create applications",
                ));
            }
        };

        let status = if submit_now {
            let verdict = validate(
                self.forms.as_ref(),
                &new.form_data,
                client_id,
                &new.product_id,
                &new.documents,
            )
            .await?;
            if !verdict.passed {
                info!(missing = ?verdict.missing_ids(), "creation with submission blocked");
                return Ok(CreateOutcome::Incomplete(verdict));
            }
            validate_transition(&self.policy, Status::Draft, Status::UnderKamReview, Role::Client)?;
            Status::UnderKamReview
        } else {
            Status::Draft
        };

        let now = Utc::now();
        let mut record = new_application_record(client_id, &new);
        records::set_text(
            &mut record,
            application::CREATION_DATE,
            records::format_timestamp(now),
        );
        apply_status(&mut record, status, now);

        let posted = self
            .store
            .post_record(&self.tables.applications, record.clone())
            .await?;
        record.insert(records::ID.to_string(), Value::String(posted.id));
        let application =
            LoanApplication::from_record(&self.policy, &self.tables.applications, record)?;

        let (action, message) = match status {
            Status::Draft => (AuditAction::ApplicationCreated, "Application created".to_string()),
            _ => (
                AuditAction::StatusChange,
                format!("Status changed from {} to {status}", Status::Draft),
            ),
        };
        let audit = self
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
                WorkflowError::partial(&application.id, Some(status), WriteStep::StatusUpdate, err)
            })?;

        info!(application = application.display_id(), %status, "application created");
        Ok(CreateOutcome::Created {
            application,
            audit_entry_id: audit.id,
        })
    }

    pub(crate) async fn check_mandatory_fields(
        &self,
        current: &LoanApplication,
    ) -> Result<ValidationVerdict, WorkflowError> {
        validate(
            self.forms.as_ref(),
            &current.form_data,
            &current.client_id,
            current.product_id.as_deref().unwrap_or_default(),
            &current.documents,
        )
        .await
    }
}

fn new_application_record(client_id: &str, new: &NewApplication) -> Record {
    let mut record = Record::new();
    if let Some(file_id) = new.file_id.as_deref().filter(|id| !id.trim().is_empty()) {
        records::set_text(&mut record, application::FILE_ID, file_id);
    }
    records::set_text(&mut record, application::CLIENT, client_id);
    if let Some(name) = &new.applicant_name {
        records::set_text(&mut record, application::APPLICANT_NAME, name.as_str());
    }
    records::set_text(&mut record, application::PRODUCT, new.product_id.as_str());
    if let Some(amount) = new.requested_amount.and_then(Number::from_f64) {
        record.insert(
            application::REQUESTED_AMOUNT.to_string(),
            Value::Number(amount),
        );
    }
    records::set_text(
        &mut record,
        application::FORM_DATA,
        Value::Object(new.form_data.clone()).to_string(),
    );
    if !new.documents.is_empty() {
        records::set_text(
            &mut record,
            application::DOCUMENTS,
            format_document_links(&new.documents),
        );
    }
    record
}
