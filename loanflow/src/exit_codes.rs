//! Stable exit codes for loanflow CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid transition, unknown status/role, bad config or any other failure.
pub const INVALID: i32 = 1;
/// Submission blocked by missing mandatory fields.
pub const INCOMPLETE: i32 = 2;
/// Caller's role or client ownership does not permit the operation.
pub const FORBIDDEN: i32 = 3;
/// One of two required writes succeeded; the record needs reconciliation.
pub const PARTIAL_WRITE: i32 = 4;
