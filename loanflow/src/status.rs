//! Engine-checked status changes outside submission and query flows.

use chrono::Utc;
use serde_json::{Number, Value};
use tracing::{info, instrument};

use crate::core::records::{self, Record, application};
use crate::core::transitions::validate_transition;
use crate::core::types::{Actor, AuditAction, Role, Status};
use crate::error::WorkflowError;
use crate::io::forms::FormConfigResolver;
use crate::io::store::RecordStore;
use crate::workflow::{StatusChange, Workflow};

/// A lending partner's decision, as relayed by the credit team.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LenderDecision {
    Approved { amount: Option<f64> },
    Rejected,
    Negotiation,
}

impl LenderDecision {
    pub fn target_status(self) -> Status {
        match self {
            LenderDecision::Approved { .. } => Status::Approved,
            LenderDecision::Rejected => Status::Rejected,
            LenderDecision::Negotiation => Status::InNegotiation,
        }
    }

    /// Value written to the `Lender Decision Status` column.
    pub fn label(self) -> &'static str {
        match self {
            LenderDecision::Approved { .. } => "Approved",
            LenderDecision::Rejected => "Rejected",
            LenderDecision::Negotiation => "Negotiation",
        }
    }
}

impl<S: RecordStore, F: FormConfigResolver> Workflow<S, F> {
    /// Move an application to `target` (any accepted status spelling).
    ///
    /// Leaving `draft` for `under_kam_review` is a submission: only the owning
    /// client may do it, and it goes through the mandatory-field gate; a
    /// failing gate is [`WorkflowError::Incomplete`].
    #[instrument(skip(self, actor, remarks), fields(actor = %actor.id, role = %actor.role))]
    pub async fn change_status(
        &self,
        actor: &Actor,
        application_id: &str,
        target: &str,
        remarks: Option<&str>,
    ) -> Result<StatusChange, WorkflowError> {
        let to = self.policy.normalize_status(target)?;
        let current = self.load_application(application_id).await?;
        self.authorize(actor, &current)?;
        validate_transition(&self.policy, current.status, to, actor.role)?;

        if current.status == Status::Draft && to == Status::UnderKamReview {
            if actor.role != Role::Client {
                return Err(WorkflowError::forbidden(format!(
                    "only the owning client may submit application {}",
                    current.display_id()
                )));
            }
            let verdict = self.check_mandatory_fields(&current).await?;
            if !verdict.passed {
                return Err(WorkflowError::Incomplete {
                    application_id: current.id.clone(),
                    missing: verdict
                        .missing_ids()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                });
            }
        }

        let change = self
            .commit_status_change(actor, &current, to, AuditAction::StatusChange, remarks, |_| {})
            .await?;
        info!(
            application = change.application.display_id(),
            from = %change.from,
            to = %change.to,
            "status changed"
        );
        Ok(change)
    }

    /// Translate a lender decision into a status change plus the
    /// lender-decision columns. Only the credit team and admins relay
    /// decisions; the lender role itself has no write access.
    #[instrument(skip(self, actor, remarks), fields(actor = %actor.id))]
    pub async fn record_lender_decision(
        &self,
        actor: &Actor,
        application_id: &str,
        decision: LenderDecision,
        remarks: Option<&str>,
    ) -> Result<StatusChange, WorkflowError> {
        if !matches!(actor.role, Role::Credit | Role::Admin) {
            return Err(WorkflowError::forbidden(format!(
                "{} may not record lender decisions",
                actor.role
            )));
        }
        let current = self.load_application(application_id).await?;
        let to = decision.target_status();
        validate_transition(&self.policy, current.status, to, actor.role)?;

        let decided_at = records::format_timestamp(Utc::now());
        let remarks_text = remarks.map(str::trim).filter(|r| !r.is_empty());
        let detail = match remarks_text {
            Some(text) => format!("lender decision {}: {text}", decision.label()),
            None => format!("lender decision {}", decision.label()),
        };

        let record_decision = |record: &mut Record| {
            records::set_text(record, application::LENDER_DECISION_STATUS, decision.label());
            records::set_text(record, application::LENDER_DECISION_DATE, decided_at);
            if let Some(text) = remarks_text {
                records::set_text(record, application::LENDER_DECISION_REMARKS, text);
            }
            let amount = match decision {
                LenderDecision::Approved { amount } => amount.and_then(Number::from_f64),
                LenderDecision::Rejected | LenderDecision::Negotiation => None,
            };
            if let Some(amount) = amount {
                record.insert(
                    application::APPROVED_AMOUNT.to_string(),
                    Value::Number(amount),
                );
            }
        };
        let change = self
            .commit_status_change(
                actor,
                &current,
                to,
                AuditAction::LenderDecision,
                Some(&detail),
                record_decision,
            )
            .await?;
        info!(
            application = change.application.display_id(),
            decision = decision.label(),
            "lender decision recorded"
        );
        Ok(change)
    }
}
