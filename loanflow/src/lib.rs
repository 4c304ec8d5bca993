//! Loan-origination workflow engine.
//!
//! Applications move through a fixed status graph whose edges are gated by
//! role. Submissions pass a mandatory-field gate, and reviewers talk to
//! clients through query threads stored as audit-log entries. Everything is
//! persisted in a schemaless remote record store.
//!
//! - **[`core`]**: Pure, deterministic logic (transition engine, validation
//!   gate, query wire format, thread reconstruction). No I/O.
//! - **[`io`]**: The record store gateway, form configuration resolvers and
//!   config files. Isolated behind traits so tests run against memory.
//!
//! [`workflow::Workflow`] composes the two; its operations live in
//! [`submit`], [`query`] and [`status`].

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod query;
pub mod status;
pub mod submit;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
