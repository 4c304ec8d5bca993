//! End-to-end workflow tests against the in-memory record store.
//!
//! Each test seeds applications, drives orchestrator operations as different
//! actors and inspects the rows left in the store.

use std::sync::Arc;

use serde_json::{Value, json};

use loanflow::core::query_content::parse_content;
use loanflow::core::records::{self, Record};
use loanflow::core::types::{Actor, QueryStatus, Role, Status};
use loanflow::core::validation::FieldType;
use loanflow::error::{WorkflowError, WriteStep};
use loanflow::io::store::RecordStore;
use loanflow::status::LenderDecision;
use loanflow::submit::{CreateOutcome, NewApplication, SubmitOutcome};
use loanflow::test_support::{MemoryStore, StaticForms, application_record, field, workflow};

const APPS: &str = "Loan Applications";
const AUDIT: &str = "File Auditing Log";

fn client() -> Actor {
    Actor::client("asha@client.test", "C1")
}

fn kam() -> Actor {
    Actor::new("kam@bank.test", Role::Kam)
}

fn credit() -> Actor {
    Actor::new("credit@bank.test", Role::Credit)
}

fn pan_forms() -> StaticForms {
    StaticForms::new(vec![
        field("PAN", "PAN Card", FieldType::Text, true),
        field("notes", "Notes", FieldType::Text, false),
    ])
}

fn seeded(status: Status, form_data: Value) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.seed(APPS, [application_record("app1", "C1", status, form_data)]);
    store
}

fn status_of(store: &MemoryStore) -> String {
    let row = store.row(APPS, "app1").expect("application row");
    records::text(&row, "Status").expect("status column")
}

fn audit_rows(store: &MemoryStore) -> Vec<Record> {
    store.rows(AUDIT)
}

fn action_of(row: &Record) -> String {
    records::text(row, "Action/Event Type").unwrap_or_default()
}

fn message_of(row: &Record) -> String {
    records::text(row, "Details/Message").unwrap_or_default()
}

/// A submission missing PAN is blocked without writes; resubmitting with PAN succeeds.
#[tokio::test]
async fn submit_blocked_by_missing_pan_then_succeeds() {
    let store = seeded(Status::Draft, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let outcome = flow
        .submit_application(&client(), "app1")
        .await
        .expect("submit");
    let SubmitOutcome::Incomplete(verdict) = outcome else {
        panic!("expected incomplete verdict, got {outcome:?}");
    };
    assert!(!verdict.passed);
    assert_eq!(verdict.missing.len(), 1);
    assert_eq!(verdict.missing[0].field_id, "PAN");
    assert_eq!(verdict.missing[0].label, "PAN Card");
    assert_eq!(status_of(&store), "draft");
    assert!(audit_rows(&store).is_empty());
    assert_eq!(store.post_count(APPS), 0);

    let mut record = store.row(APPS, "app1").expect("row");
    record.insert(
        "Form Data".to_string(),
        Value::String(json!({"PAN": "ABCDE1234F"}).to_string()),
    );
    store.post_record(APPS, record).await.expect("update form data");

    let outcome = flow
        .submit_application(&client(), "app1")
        .await
        .expect("resubmit");
    let SubmitOutcome::Submitted { application, .. } = outcome else {
        panic!("expected submission, got {outcome:?}");
    };
    assert_eq!(application.status, Status::UnderKamReview);
    assert!(application.submitted_at.is_some());
    assert_eq!(status_of(&store), "under_kam_review");

    let audit = audit_rows(&store);
    assert_eq!(audit.len(), 1);
    assert_eq!(action_of(&audit[0]), "status_change");
    assert_eq!(records::text(&audit[0], "File").as_deref(), Some("SF-app1"));
}

/// KAM raises a query, the client replies, and the status round-trips.
#[tokio::test]
async fn kam_query_and_client_reply_round_trip_status() {
    let store = seeded(Status::UnderKamReview, json!({"PAN": "ABCDE1234F"}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let raised = flow
        .raise_query(&kam(), "app1", "Please upload bank statements", None)
        .await
        .expect("raise");
    assert_eq!(
        raised.status_change,
        Some((Status::UnderKamReview, Status::QueryWithClient))
    );
    assert_eq!(status_of(&store), "query_with_client");

    let audit = audit_rows(&store);
    assert_eq!(audit.len(), 1);
    assert_eq!(action_of(&audit[0]), "query_raised");
    assert_eq!(records::text(&audit[0], "Target User/Role").as_deref(), Some("client"));
    let root = parse_content(&message_of(&audit[0]));
    assert_eq!(root.parent, None);
    assert_eq!(root.status, QueryStatus::Open);
    assert_eq!(root.message, "Please upload bank statements");

    let replied = flow
        .respond_to_query(&client(), "app1", &raised.entry_id, "Uploaded both statements")
        .await
        .expect("reply");
    assert_eq!(replied.parent_id.as_deref(), Some(raised.entry_id.as_str()));
    assert_eq!(
        replied.status_change,
        Some((Status::QueryWithClient, Status::UnderKamReview))
    );
    assert_eq!(status_of(&store), "under_kam_review");

    let audit = audit_rows(&store);
    assert_eq!(audit.len(), 2);
    let reply = parse_content(&message_of(&audit[1]));
    assert_eq!(reply.parent.as_deref(), Some(raised.entry_id.as_str()));
    assert_eq!(reply.status, QueryStatus::Open);
    assert_eq!(reply.message, "Uploaded both statements");

    let thread = flow.thread(&kam(), &raised.entry_id).await.expect("thread");
    assert_eq!(thread.replies.len(), 1);
    assert!(!thread.is_resolved);
}

/// Credit queries the KAM; the KAM's reply returns the file to credit review.
#[tokio::test]
async fn credit_query_answered_by_kam_returns_to_credit_review() {
    let store = seeded(Status::PendingCreditReview, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let raised = flow
        .raise_query(&credit(), "app1", "Confirm GST turnover", None)
        .await
        .expect("raise");
    assert_eq!(status_of(&store), "credit_query_with_kam");

    flow.respond_to_query(&kam(), "app1", &raised.entry_id, "Turnover confirmed")
        .await
        .expect("reply");
    assert_eq!(status_of(&store), "pending_credit_review");
}

#[tokio::test]
async fn reply_to_reply_attaches_to_thread_root() {
    let store = seeded(Status::UnderKamReview, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let raised = flow
        .raise_query(&kam(), "app1", "Need ITR", None)
        .await
        .expect("raise");
    let first = flow
        .respond_to_query(&client(), "app1", &raised.entry_id, "Which year?")
        .await
        .expect("reply");
    let second = flow
        .respond_to_query(&kam(), "app1", &first.entry_id, "FY24")
        .await
        .expect("nested reply");

    assert_eq!(second.parent_id.as_deref(), Some(raised.entry_id.as_str()));
    assert_eq!(second.status_change, None);
    let index = flow.query_threads(&kam(), "app1").await.expect("threads");
    assert_eq!(index.threads.len(), 1);
    assert_eq!(index.threads[0].replies.len(), 2);
    assert!(index.orphans.is_empty());
}

/// A client reply outside a client query is logged without moving status.
#[tokio::test]
async fn client_reply_outside_query_state_keeps_status() {
    let store = seeded(Status::UnderKamReview, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());
    store.seed(
        AUDIT,
        [json!({
            "id": "q1",
            "File": "SF-app1",
            "Action/Event Type": "query_raised",
            "Details/Message": "[[status:open]] Old question",
        })
        .as_object()
        .cloned()
        .expect("object")],
    );

    let posted = flow
        .respond_to_query(&client(), "app1", "q1", "Answering late")
        .await
        .expect("reply");
    assert_eq!(posted.status_change, None);
    assert_eq!(status_of(&store), "under_kam_review");
    assert_eq!(audit_rows(&store).len(), 2);
}

/// Status POST failing after the log append is reported as a partial write.
#[tokio::test]
async fn query_status_failure_after_append_is_partial_write() {
    let store = seeded(Status::UnderKamReview, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());
    store.fail_posts_to(APPS);

    let err = flow
        .raise_query(&kam(), "app1", "Missing KYC", None)
        .await
        .expect_err("partial write");
    let WorkflowError::PartialWrite {
        application_id,
        attempted_status,
        completed,
        failed,
        ..
    } = &err
    else {
        panic!("expected partial write, got {err:?}");
    };
    assert_eq!(application_id, "app1");
    assert_eq!(*attempted_status, Some(Status::QueryWithClient));
    assert_eq!(*completed, WriteStep::AuditAppend);
    assert_eq!(*failed, WriteStep::StatusUpdate);
    assert_eq!(audit_rows(&store).len(), 1);
    assert_eq!(status_of(&store), "under_kam_review");
}

/// Audit append failing after the status POST is reported as a partial write.
#[tokio::test]
async fn submit_audit_failure_after_status_write_is_partial_write() {
    let store = seeded(Status::Draft, json!({"PAN": "ABCDE1234F"}));
    let flow = workflow(Arc::clone(&store), pan_forms());
    store.fail_posts_to(AUDIT);

    let err = flow
        .submit_application(&client(), "app1")
        .await
        .expect_err("partial write");
    let WorkflowError::PartialWrite {
        completed, failed, ..
    } = &err
    else {
        panic!("expected partial write, got {err:?}");
    };
    assert_eq!(*completed, WriteStep::StatusUpdate);
    assert_eq!(*failed, WriteStep::AuditAppend);
    assert_eq!(status_of(&store), "under_kam_review");
    assert!(audit_rows(&store).is_empty());
}

/// A raise from a status with no query edge writes nothing.
#[tokio::test]
async fn invalid_raise_writes_nothing() {
    let store = seeded(Status::Draft, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let err = flow
        .raise_query(&kam(), "app1", "Too early", None)
        .await
        .expect_err("invalid");
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert!(audit_rows(&store).is_empty());
    assert_eq!(status_of(&store), "draft");
}

#[tokio::test]
async fn blank_query_message_is_rejected() {
    let store = seeded(Status::UnderKamReview, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let err = flow
        .raise_query(&kam(), "app1", "   ", None)
        .await
        .expect_err("blank");
    assert!(matches!(err, WorkflowError::EmptyMessage));
    assert!(audit_rows(&store).is_empty());
}

/// Resolving and reopening rewrite the entry in place without touching status.
#[tokio::test]
async fn resolve_and_reopen_rewrite_entry_in_place() {
    let store = seeded(Status::UnderKamReview, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());
    let raised = flow
        .raise_query(&kam(), "app1", "Need address proof", None)
        .await
        .expect("raise");

    let resolved = flow
        .resolve_query(&kam(), &raised.entry_id)
        .await
        .expect("resolve");
    assert!(resolved.is_resolved());
    assert_eq!(resolved.content.message, "Need address proof");
    let row = store.row(AUDIT, &raised.entry_id).expect("entry row");
    assert_eq!(records::text(&row, "Resolved").as_deref(), Some("True"));
    assert_eq!(parse_content(&message_of(&row)).status, QueryStatus::Resolved);
    assert_eq!(audit_rows(&store).len(), 1);
    assert_eq!(status_of(&store), "query_with_client");

    let thread = flow.thread(&kam(), &raised.entry_id).await.expect("thread");
    assert!(thread.is_resolved);

    let reopened = flow
        .reopen_query(&kam(), &raised.entry_id)
        .await
        .expect("reopen");
    assert!(!reopened.is_resolved());
    let row = store.row(AUDIT, &raised.entry_id).expect("entry row");
    assert_eq!(records::text(&row, "Resolved").as_deref(), Some("False"));
}

#[tokio::test]
async fn submit_rejects_other_clients_and_staff() {
    let store = seeded(Status::Draft, json!({"PAN": "ABCDE1234F"}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let stranger = Actor::client("ravi@other.test", "C2");
    let err = flow
        .submit_application(&stranger, "app1")
        .await
        .expect_err("forbidden");
    assert!(matches!(err, WorkflowError::Forbidden { .. }));

    let err = flow
        .submit_application(&kam(), "app1")
        .await
        .expect_err("forbidden");
    assert!(matches!(err, WorkflowError::Forbidden { .. }));
    assert_eq!(status_of(&store), "draft");
}

/// An unreachable form configuration is distinct from a failing verdict.
#[tokio::test]
async fn unavailable_form_configuration_fails_without_writes() {
    let store = seeded(Status::Draft, json!({"PAN": "ABCDE1234F"}));
    let flow = workflow(Arc::clone(&store), StaticForms::unavailable());

    let err = flow
        .submit_application(&client(), "app1")
        .await
        .expect_err("config unavailable");
    assert!(matches!(err, WorkflowError::ConfigUnavailable { .. }));
    assert_eq!(store.post_count(APPS), 0);
    assert_eq!(store.post_count(AUDIT), 0);
}

#[tokio::test]
async fn missing_application_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let flow = workflow(Arc::clone(&store), pan_forms());

    let err = flow
        .submit_application(&client(), "nope")
        .await
        .expect_err("not found");
    assert!(matches!(err, WorkflowError::NotFound { .. }));
}

#[tokio::test]
async fn kam_forwards_to_credit_with_remarks() {
    let store = seeded(Status::UnderKamReview, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let change = flow
        .change_status(&kam(), "app1", "FORWARDED_TO_CREDIT", Some("Docs verified"))
        .await
        .expect("forward");
    assert_eq!(change.from, Status::UnderKamReview);
    assert_eq!(change.to, Status::PendingCreditReview);
    assert_eq!(status_of(&store), "pending_credit_review");
    let audit = audit_rows(&store);
    assert_eq!(audit.len(), 1);
    assert_eq!(
        message_of(&audit[0]),
        "Status changed from under_kam_review to pending_credit_review: Docs verified"
    );
}

#[tokio::test]
async fn lender_role_cannot_change_status() {
    let store = seeded(Status::SentToNbfc, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());
    let lender = Actor::new("partner@nbfc.test", Role::Nbfc);

    let err = flow
        .change_status(&lender, "app1", "approved", None)
        .await
        .expect_err("invalid");
    let WorkflowError::InvalidTransition { allowed, .. } = &err else {
        panic!("expected invalid transition, got {err:?}");
    };
    assert!(allowed.is_empty());

    let err = flow
        .record_lender_decision(&lender, "app1", LenderDecision::Rejected, None)
        .await
        .expect_err("forbidden");
    assert!(matches!(err, WorkflowError::Forbidden { .. }));
    assert_eq!(status_of(&store), "sent_to_nbfc");
}

/// Administrative close leaves open query threads open.
#[tokio::test]
async fn administrative_close_keeps_threads_as_written() {
    let store = seeded(Status::UnderKamReview, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());
    let raised = flow
        .raise_query(&kam(), "app1", "Need collateral details", None)
        .await
        .expect("raise");

    let change = flow
        .change_status(&credit(), "app1", "closed", Some("Duplicate file"))
        .await
        .expect("close");
    assert_eq!(change.from, Status::QueryWithClient);
    assert_eq!(change.to, Status::Closed);

    let thread = flow.thread(&kam(), &raised.entry_id).await.expect("thread");
    assert!(!thread.is_resolved);

    let err = flow
        .change_status(&credit(), "app1", "closed", None)
        .await
        .expect_err("terminal");
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
}

#[tokio::test]
async fn lender_approval_records_decision_columns() {
    let store = seeded(Status::SentToNbfc, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let change = flow
        .record_lender_decision(
            &credit(),
            "app1",
            LenderDecision::Approved {
                amount: Some(450_000.0),
            },
            Some("Sanctioned at 11.5%"),
        )
        .await
        .expect("decision");
    assert_eq!(change.to, Status::Approved);
    assert_eq!(change.application.approved_amount, Some(450_000.0));
    assert_eq!(
        change.application.lender_decision_status.as_deref(),
        Some("Approved")
    );
    assert_eq!(
        change.application.lender_decision_remarks.as_deref(),
        Some("Sanctioned at 11.5%")
    );
    assert!(change.application.lender_decision_date.is_some());

    let audit = audit_rows(&store);
    assert_eq!(audit.len(), 1);
    assert_eq!(action_of(&audit[0]), "lender_decision");
}

#[tokio::test]
async fn lender_decision_requires_sent_to_lender() {
    let store = seeded(Status::PendingCreditReview, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let err = flow
        .record_lender_decision(
            &credit(),
            "app1",
            LenderDecision::Approved { amount: None },
            None,
        )
        .await
        .expect_err("invalid");
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert!(audit_rows(&store).is_empty());
}

/// Leaving draft through a generic status change still runs the field gate.
#[tokio::test]
async fn status_change_out_of_draft_runs_field_gate() {
    let store = seeded(Status::Draft, json!({}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let err = flow
        .change_status(&client(), "app1", "submitted", None)
        .await
        .expect_err("incomplete");
    let WorkflowError::Incomplete { missing, .. } = &err else {
        panic!("expected incomplete, got {err:?}");
    };
    assert_eq!(missing, &vec!["PAN".to_string()]);
    assert_eq!(status_of(&store), "draft");
}

/// An application waiting on a client query cannot be resubmitted back to review.
#[tokio::test]
async fn submit_outside_draft_is_invalid_and_writes_nothing() {
    let store = seeded(Status::QueryWithClient, json!({"PAN": "ABCDE1234F"}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    let err = flow
        .submit_application(&client(), "app1")
        .await
        .expect_err("invalid");
    let WorkflowError::InvalidTransition { from, to, .. } = &err else {
        panic!("expected invalid transition, got {err:?}");
    };
    assert_eq!(*from, Status::QueryWithClient);
    assert_eq!(*to, Status::UnderKamReview);
    assert_eq!(status_of(&store), "query_with_client");
    assert!(audit_rows(&store).is_empty());
    assert_eq!(store.post_count(APPS), 0);
}

/// Staff cannot submit a client's draft through a generic status change.
#[tokio::test]
async fn staff_cannot_move_draft_into_review() {
    let store = seeded(Status::Draft, json!({"PAN": "ABCDE1234F"}));
    let flow = workflow(Arc::clone(&store), pan_forms());

    for actor in [kam(), Actor::new("admin@bank.test", Role::Admin)] {
        let err = flow
            .change_status(&actor, "app1", "under_kam_review", None)
            .await
            .expect_err("forbidden");
        assert!(matches!(err, WorkflowError::Forbidden { .. }), "{err:?}");
    }
    assert_eq!(status_of(&store), "draft");
    assert!(audit_rows(&store).is_empty());

    let change = flow
        .change_status(&client(), "app1", "under_kam_review", None)
        .await
        .expect("owner submits");
    assert_eq!(change.to, Status::UnderKamReview);
}

#[tokio::test]
async fn create_application_as_draft_or_submitted() {
    let store = Arc::new(MemoryStore::new());
    let flow = workflow(Arc::clone(&store), pan_forms());

    let incomplete = NewApplication {
        file_id: Some("SF-900".to_string()),
        applicant_name: Some("Asha Rao".to_string()),
        product_id: "business_loan".to_string(),
        requested_amount: Some(250_000.0),
        ..NewApplication::default()
    };
    let outcome = flow
        .create_application(&client(), incomplete.clone(), true)
        .await
        .expect("create");
    assert!(matches!(outcome, CreateOutcome::Incomplete(_)));
    assert!(store.rows(APPS).is_empty());

    let outcome = flow
        .create_application(&client(), incomplete, false)
        .await
        .expect("create draft");
    let CreateOutcome::Created { application, .. } = outcome else {
        panic!("expected created, got {outcome:?}");
    };
    assert_eq!(application.status, Status::Draft);
    assert_eq!(application.client_id, "C1");
    assert!(application.submitted_at.is_none());
    assert_eq!(action_of(&audit_rows(&store)[0]), "application_created");

    let mut complete = NewApplication {
        product_id: "business_loan".to_string(),
        ..NewApplication::default()
    };
    complete
        .form_data
        .insert("PAN".to_string(), Value::String("ABCDE1234F".to_string()));
    let outcome = flow
        .create_application(&client(), complete, true)
        .await
        .expect("create submitted");
    let CreateOutcome::Created { application, .. } = outcome else {
        panic!("expected created, got {outcome:?}");
    };
    assert_eq!(application.status, Status::UnderKamReview);
    assert!(application.submitted_at.is_some());
    assert_eq!(store.rows(APPS).len(), 2);
}

#[tokio::test]
async fn staff_cannot_create_applications() {
    let store = Arc::new(MemoryStore::new());
    let flow = workflow(Arc::clone(&store), pan_forms());

    let err = flow
        .create_application(&kam(), NewApplication::default(), false)
        .await
        .expect_err("forbidden");
    assert!(matches!(err, WorkflowError::Forbidden { .. }));
}

/// Clients only see threads of their own applications.
#[tokio::test]
async fn threads_are_scoped_to_owning_client() {
    let store = seeded(Status::UnderKamReview, json!({}));
    store.seed(APPS, [application_record("app2", "C2", Status::UnderKamReview, json!({}))]);
    let flow = workflow(Arc::clone(&store), pan_forms());
    flow.raise_query(&kam(), "app1", "For C1", None)
        .await
        .expect("raise app1");
    let other = flow
        .raise_query(&kam(), "app2", "For C2", None)
        .await
        .expect("raise app2");

    let index = flow.query_threads(&client(), "app1").await.expect("threads");
    assert_eq!(index.threads.len(), 1);
    assert_eq!(index.threads[0].root.content.message, "For C1");

    let err = flow
        .query_threads(&client(), "app2")
        .await
        .expect_err("forbidden");
    assert!(matches!(err, WorkflowError::Forbidden { .. }));

    let err = flow
        .resolve_query(&client(), &other.entry_id)
        .await
        .expect_err("forbidden");
    assert!(matches!(err, WorkflowError::Forbidden { .. }));
}
