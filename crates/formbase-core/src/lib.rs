//! # formbase-core
//!
//! Domain logic for the Formbase form-definition platform, free of any I/O.
//!
//! This crate owns the field type system, the sanitization/validation
//! pipeline that every incoming field list passes through before it is
//! persisted, and the typed identifiers (`form-XXXXXXXX` and friends) used
//! across the workspace.  The store and server crates build on top of it.

pub mod error;
pub mod field;
pub mod ids;
pub mod limits;
pub mod sanitize;

pub use error::{FieldError, ValidationErrors};
pub use field::{CleanField, FieldType, RawField};
pub use ids::{CategoryId, FormId, TemplateId};
pub use limits::FieldLimits;
pub use sanitize::{sanitize_and_validate, sanitize_fields, validate_fields};
