//! Shared deterministic types for the workflow engines.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O. String forms returned by `as_str` are the
//! values written to the record store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a loan application.
///
/// Declaration order is the display order used by ordered sets of statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    UnderKamReview,
    QueryWithClient,
    PendingCreditReview,
    CreditQueryWithKam,
    InNegotiation,
    SentToNbfc,
    Approved,
    Rejected,
    Disbursed,
    Withdrawn,
    Closed,
}

impl Status {
    pub const ALL: [Status; 12] = [
        Status::Draft,
        Status::UnderKamReview,
        Status::QueryWithClient,
        Status::PendingCreditReview,
        Status::CreditQueryWithKam,
        Status::InNegotiation,
        Status::SentToNbfc,
        Status::Approved,
        Status::Rejected,
        Status::Disbursed,
        Status::Withdrawn,
        Status::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::UnderKamReview => "under_kam_review",
            Status::QueryWithClient => "query_with_client",
            Status::PendingCreditReview => "pending_credit_review",
            Status::CreditQueryWithKam => "credit_query_with_kam",
            Status::InNegotiation => "in_negotiation",
            Status::SentToNbfc => "sent_to_nbfc",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
            Status::Disbursed => "disbursed",
            Status::Withdrawn => "withdrawn",
            Status::Closed => "closed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Status::Closed
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acting role of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Kam,
    Credit,
    Nbfc,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Client, Role::Kam, Role::Credit, Role::Nbfc, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Kam => "kam",
            Role::Credit => "credit",
            Role::Nbfc => "nbfc",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open/resolved state embedded in a query message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    #[default]
    Open,
    Resolved,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Open => "open",
            QueryStatus::Resolved => "resolved",
        }
    }

    /// Parse a token value; anything other than `open`/`resolved` is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(QueryStatus::Open),
            "resolved" => Some(QueryStatus::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Action/Event Type` tag of an audit log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditAction {
    StatusChange,
    QueryRaised,
    QueryReply,
    LenderDecision,
    ApplicationCreated,
    Other(String),
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            AuditAction::StatusChange => "status_change",
            AuditAction::QueryRaised => "query_raised",
            AuditAction::QueryReply => "query_reply",
            AuditAction::LenderDecision => "lender_decision",
            AuditAction::ApplicationCreated => "application_created",
            AuditAction::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "status_change" => AuditAction::StatusChange,
            "query_raised" | "query" => AuditAction::QueryRaised,
            "query_reply" | "query_response" => AuditAction::QueryReply,
            "lender_decision" => AuditAction::LenderDecision,
            "application_created" => AuditAction::ApplicationCreated,
            _ => AuditAction::Other(raw.to_string()),
        }
    }

    /// True for entries that participate in query threads.
    pub fn is_query(&self) -> bool {
        matches!(self, AuditAction::QueryRaised | AuditAction::QueryReply)
    }
}

/// Authenticated caller identity, as issued by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Display identity written to the audit log (usually an email).
    pub id: String,
    pub role: Role,
    /// Owning client organization; required for `Role::Client`.
    pub client_id: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            client_id: None,
        }
    }

    pub fn client(id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Client,
            client_id: Some(client_id.into()),
        }
    }

    /// True when the actor is a client belonging to `client_id`.
    pub fn owns(&self, client_id: &str) -> bool {
        self.role == Role::Client && self.client_id.as_deref() == Some(client_id)
    }
}
