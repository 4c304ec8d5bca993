//! Immutable workflow policy tables.
//!
//! A [`WorkflowPolicy`] is built once at startup and shared by reference. It
//! owns the status graph, the per-role target permissions, the roles allowed to
//! close administratively, and the alias tables used to normalize status and
//! role strings read from the store or supplied by callers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::types::{Role, Status};
use crate::error::WorkflowError;

/// Legacy status spellings still present in stored records.
const STATUS_ALIASES: &[(&str, Status)] = &[
    ("PENDING_KAM_REVIEW", Status::UnderKamReview),
    ("SUBMITTED", Status::UnderKamReview),
    ("KAM_REVIEW", Status::UnderKamReview),
    ("KAM_QUERY_RAISED", Status::QueryWithClient),
    ("QUERY_RAISED", Status::QueryWithClient),
    ("FORWARDED_TO_CREDIT", Status::PendingCreditReview),
    ("CREDIT_REVIEW", Status::PendingCreditReview),
    ("CREDIT_QUERY_RAISED", Status::CreditQueryWithKam),
    ("NEGOTIATION", Status::InNegotiation),
    ("SENT_TO_LENDER", Status::SentToNbfc),
    ("LENDER_APPROVED", Status::Approved),
    ("LENDER_REJECTED", Status::Rejected),
];

/// Role spellings seen in session payloads, after lowercasing and collapsing
/// separators to single spaces.
const ROLE_ALIASES: &[(&str, Role)] = &[
    ("client", Role::Client),
    ("customer", Role::Client),
    ("kam", Role::Kam),
    ("key account manager", Role::Kam),
    ("credit", Role::Credit),
    ("credit team", Role::Credit),
    ("credit officer", Role::Credit),
    ("nbfc", Role::Nbfc),
    ("lender", Role::Nbfc),
    ("nbfc partner", Role::Nbfc),
    ("admin", Role::Admin),
    ("administrator", Role::Admin),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowPolicy {
    edges: BTreeMap<Status, BTreeSet<Status>>,
    role_targets: BTreeMap<Role, BTreeSet<Status>>,
    close_override_roles: BTreeSet<Role>,
    status_aliases: HashMap<String, Status>,
    role_aliases: HashMap<String, Role>,
}

impl WorkflowPolicy {
    /// The production policy for the loan-origination workflow.
    pub fn standard() -> Self {
        use Status::{
            Approved, Closed, CreditQueryWithKam, Disbursed, Draft, InNegotiation,
            PendingCreditReview, QueryWithClient, Rejected, SentToNbfc, UnderKamReview, Withdrawn,
        };

        let edges = BTreeMap::from([
            (Draft, set([UnderKamReview, Withdrawn])),
            (
                UnderKamReview,
                set([QueryWithClient, PendingCreditReview, Withdrawn]),
            ),
            (
                QueryWithClient,
                set([UnderKamReview, PendingCreditReview, Withdrawn]),
            ),
            (
                PendingCreditReview,
                set([
                    CreditQueryWithKam,
                    InNegotiation,
                    SentToNbfc,
                    Rejected,
                    Withdrawn,
                ]),
            ),
            (CreditQueryWithKam, set([PendingCreditReview, Rejected])),
            (InNegotiation, set([SentToNbfc, Rejected, Withdrawn])),
            (SentToNbfc, set([Approved, Rejected, InNegotiation])),
            (Approved, set([Disbursed, Rejected])),
            (Rejected, set([Closed])),
            (Disbursed, set([Closed])),
            (Withdrawn, set([Closed])),
            (Closed, BTreeSet::new()),
        ]);

        let role_targets = BTreeMap::from([
            (Role::Client, set([UnderKamReview, Withdrawn])),
            (
                Role::Kam,
                set([UnderKamReview, QueryWithClient, PendingCreditReview, Withdrawn]),
            ),
            (
                Role::Credit,
                set([
                    PendingCreditReview,
                    CreditQueryWithKam,
                    InNegotiation,
                    SentToNbfc,
                    Approved,
                    Rejected,
                    Disbursed,
                    Withdrawn,
                    Closed,
                ]),
            ),
            (Role::Nbfc, BTreeSet::new()),
            (Role::Admin, Status::ALL.into_iter().collect()),
        ]);

        let mut status_aliases: HashMap<String, Status> = Status::ALL
            .into_iter()
            .map(|status| (status.as_str().to_ascii_uppercase(), status))
            .collect();
        for (alias, status) in STATUS_ALIASES {
            status_aliases.insert((*alias).to_string(), *status);
        }

        let role_aliases = ROLE_ALIASES
            .iter()
            .map(|(alias, role)| ((*alias).to_string(), *role))
            .collect();

        Self {
            edges,
            role_targets,
            close_override_roles: set([Role::Credit, Role::Admin]),
            status_aliases,
            role_aliases,
        }
    }

    /// Direct successors of `from` in the status graph.
    pub fn edges_from(&self, from: Status) -> &BTreeSet<Status> {
        static EMPTY: BTreeSet<Status> = BTreeSet::new();
        self.edges.get(&from).unwrap_or(&EMPTY)
    }

    /// Statuses `role` may ever write, independent of the current status.
    pub fn permitted_targets(&self, role: Role) -> &BTreeSet<Status> {
        static EMPTY: BTreeSet<Status> = BTreeSet::new();
        self.role_targets.get(&role).unwrap_or(&EMPTY)
    }

    /// True if `role` may close any non-terminal application.
    pub fn can_close_administratively(&self, role: Role) -> bool {
        self.close_override_roles.contains(&role)
    }

    /// Map a caller-supplied or stored status string to a [`Status`].
    ///
    /// Case, surrounding whitespace, spaces and hyphens are ignored; legacy
    /// spellings resolve through the alias table. Unrecognized values fail
    /// with [`WorkflowError::UnknownStatus`].
    pub fn normalize_status(&self, raw: &str) -> Result<Status, WorkflowError> {
        let key = canonical_status_key(raw);
        self.status_aliases
            .get(&key)
            .copied()
            .ok_or_else(|| WorkflowError::UnknownStatus {
                value: raw.to_string(),
            })
    }

    /// Map a role string (`"Credit Team"`, `"kam"`, `"KEY_ACCOUNT_MANAGER"`)
    /// to a [`Role`]. Unknown roles fail; nothing defaults to `Client`.
    pub fn normalize_role(&self, raw: &str) -> Result<Role, WorkflowError> {
        let key = canonical_role_key(raw);
        self.role_aliases
            .get(&key)
            .copied()
            .ok_or_else(|| WorkflowError::UnknownRole {
                value: raw.to_string(),
            })
    }
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

fn set<T: Ord, const N: usize>(items: [T; N]) -> BTreeSet<T> {
    items.into_iter().collect()
}

fn canonical_status_key(raw: &str) -> String {
    raw.trim()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_ascii_uppercase()
}

fn canonical_role_key(raw: &str) -> String {
    raw.trim()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}
