//! # formbase-store
//!
//! SQLite persistence for the Formbase form-definition platform.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model.  Multi-row workflows (create/update a form with its field list,
//! publish a version, publish a draft) run inside a single transaction:
//! they either commit whole or leave no trace.
//!
//! Uniqueness rules (form titles, template names, field names per form)
//! are pre-checked for fast feedback and backed by unique indexes; a
//! constraint violation under race surfaces as the same typed conflict.

pub mod categories;
pub mod database;
pub mod drafts;
pub mod forms;
pub mod migrations;
pub mod models;
pub mod submissions;
pub mod templates;
pub mod versions;

mod error;

#[cfg(test)]
mod test_util;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
