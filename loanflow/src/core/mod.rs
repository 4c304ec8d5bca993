//! Deterministic, pure workflow engines.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod model;
pub mod policy;
pub mod query_content;
pub mod records;
pub mod thread;
pub mod transitions;
pub mod types;
pub mod validation;
