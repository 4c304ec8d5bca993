//! I/O adapters: the record store gateway, form configuration and config files.

pub mod config;
pub mod forms;
pub mod http_store;
pub mod store;
