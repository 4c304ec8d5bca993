//! Status transition engine.
//!
//! A transition is legal only if the target is a graph edge from the current
//! status AND the target is in the acting role's permitted set. Roles with the
//! administrative-close override may move any non-closed status to `Closed`,
//! bypassing the graph but still subject to their permitted set.

use std::collections::BTreeSet;

use crate::core::policy::WorkflowPolicy;
use crate::core::types::{Role, Status};
use crate::error::WorkflowError;

/// True if `role` may move an application from `from` to `to`.
pub fn is_valid_transition(policy: &WorkflowPolicy, from: Status, to: Status, role: Role) -> bool {
    if !policy.permitted_targets(role).contains(&to) {
        return false;
    }
    if is_administrative_close(policy, from, to, role) {
        return true;
    }
    policy.edges_from(from).contains(&to)
}

/// Like [`is_valid_transition`], but reports the allowed set on failure.
pub fn validate_transition(
    policy: &WorkflowPolicy,
    from: Status,
    to: Status,
    role: Role,
) -> Result<(), WorkflowError> {
    if is_valid_transition(policy, from, to, role) {
        return Ok(());
    }
    Err(WorkflowError::InvalidTransition {
        from,
        to,
        role,
        allowed: allowed_next_statuses(policy, from, role),
    })
}

/// Every status `role` may move to from `from`, in declaration order.
pub fn allowed_next_statuses(policy: &WorkflowPolicy, from: Status, role: Role) -> BTreeSet<Status> {
    let permitted = policy.permitted_targets(role);
    let mut allowed: BTreeSet<Status> = policy
        .edges_from(from)
        .intersection(permitted)
        .copied()
        .collect();
    if is_administrative_close(policy, from, Status::Closed, role) && permitted.contains(&Status::Closed)
    {
        allowed.insert(Status::Closed);
    }
    allowed
}

fn is_administrative_close(policy: &WorkflowPolicy, from: Status, to: Status, role: Role) -> bool {
    to == Status::Closed && !from.is_terminal() && policy.can_close_administratively(role)
}

/// Kind of query action being posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryAction {
    /// A new thread root.
    Raise,
    /// A reply under an existing root.
    Reply,
}

/// Status move implied by a query action, if any.
///
/// Returns `Ok(None)` when the action leaves the status untouched (a reply
/// outside a query state, or a follow-up raise while the query is already
/// pending). A raise from a status with no query edge for the role fails with
/// [`WorkflowError::InvalidTransition`].
pub fn query_transition(
    policy: &WorkflowPolicy,
    role: Role,
    action: QueryAction,
    current: Status,
) -> Result<Option<Status>, WorkflowError> {
    let (from, to) = match (role, action) {
        (Role::Kam, QueryAction::Raise) => (Status::UnderKamReview, Status::QueryWithClient),
        (Role::Credit, QueryAction::Raise) => {
            (Status::PendingCreditReview, Status::CreditQueryWithKam)
        }
        (Role::Client, QueryAction::Reply) => (Status::QueryWithClient, Status::UnderKamReview),
        (Role::Kam, QueryAction::Reply) if current == Status::CreditQueryWithKam => {
            (Status::CreditQueryWithKam, Status::PendingCreditReview)
        }
        _ => return Ok(None),
    };

    match action {
        QueryAction::Raise if current == to => Ok(None),
        QueryAction::Raise => {
            validate_transition(policy, current, to, role)?;
            Ok(Some(to))
        }
        QueryAction::Reply if current == from => {
            validate_transition(policy, current, to, role)?;
            Ok(Some(to))
        }
        QueryAction::Reply => Ok(None),
    }
}
