//! Persistence for credential records.
//!
//! The rest of the dashboard (partners, sites, projects, time logs) lives in
//! the same SQLite database but is not touched from here.

pub mod models;
pub mod operations;

pub use models::{Credential, NewCredential};
pub use operations::{CredentialStore, DbOperations};
